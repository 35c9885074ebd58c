use super::pool::{RawBootstrap, RawConstant};
use super::{BootstrapMethod, Constant, ConstantPool, DynamicRef, HandleKind, MemberRef, PoolEntry};
use crate::jvm::binary::{encode_modified_utf8, ByteWriter, Serialize};
use crate::jvm::errors::u16_count;
use crate::jvm::Error;
use crate::util::{fresh_id, Offset, OffsetVec, Width};
use std::collections::HashMap;
use std::sync::Arc;

/// Interning constant pool builder
///
/// The pool is append only: once a constant has an index, that index is stable. A builder can
/// either start out empty or _share_ the pool of a parsed class. A shared pool writes the parsed
/// pool out verbatim and appends any new entries after it, so that every index from the parsed
/// class stays valid (and untouched elements can be copied byte for byte).
pub struct ConstantPoolBuilder {
    id: u64,
    parent: Option<Arc<ConstantPool>>,

    /// Entries added on top of the parent pool
    constants: OffsetVec<RawConstant>,
    interned: HashMap<RawConstant, u16>,

    /// Whether the entries of the parent have been added to `interned` yet
    parent_interned: bool,

    bootstrap_methods: Vec<RawBootstrap>,
    bootstrap_interned: HashMap<RawBootstrap, u16>,
}

impl ConstantPoolBuilder {
    /// Make a fresh empty constant pool
    pub fn new() -> ConstantPoolBuilder {
        ConstantPoolBuilder {
            id: fresh_id(),
            parent: None,
            constants: OffsetVec::new_starting_at(Offset(1)),
            interned: HashMap::new(),
            parent_interned: true,
            bootstrap_methods: vec![],
            bootstrap_interned: HashMap::new(),
        }
    }

    /// Make a pool which extends the pool of a parsed class
    pub fn shared(parent: Arc<ConstantPool>) -> Result<ConstantPoolBuilder, Error> {
        let bootstrap_methods = parent.raw_bootstrap_methods()?;
        let mut bootstrap_interned = HashMap::new();
        for (index, method) in bootstrap_methods.iter().enumerate() {
            bootstrap_interned
                .entry(method.clone())
                .or_insert(index as u16);
        }
        Ok(ConstantPoolBuilder {
            id: fresh_id(),
            constants: OffsetVec::new_starting_at(Offset(parent.count() as usize)),
            parent: Some(parent),
            interned: HashMap::new(),
            parent_interned: false,
            bootstrap_methods,
            bootstrap_interned,
        })
    }

    /// Can elements of a parsed class be copied into this pool without renumbering?
    pub fn is_compatible_with(&self, pool: &ConstantPool) -> bool {
        self.parent
            .as_ref()
            .map_or(false, |parent| parent.id() == pool.id())
    }

    /// Pool this builder extends, if any
    pub fn parent(&self) -> Option<&Arc<ConstantPool>> {
        self.parent.as_ref()
    }

    /// Value of `constant_pool_count` if the pool were written out now
    pub fn count(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    pub fn bootstrap_method_count(&self) -> usize {
        self.bootstrap_methods.len()
    }

    /// Index of an entry in this pool
    ///
    /// Entries which were read from (or interned into) this pool or its parent keep their index.
    /// Everything else gets interned.
    pub fn index_of(&mut self, entry: &PoolEntry) -> Result<u16, Error> {
        if let Some((pool_id, index)) = entry.origin() {
            let parent_id = self.parent.as_ref().map(|parent| parent.id());
            if pool_id == self.id || Some(pool_id) == parent_id {
                return Ok(index);
            }
        }
        self.intern(entry.constant())
    }

    /// Like [`ConstantPoolBuilder::index_of`], but with `0` for a missing entry
    pub fn index_of_opt(&mut self, entry: Option<&PoolEntry>) -> Result<u16, Error> {
        entry.map_or(Ok(0), |entry| self.index_of(entry))
    }

    /// Get or insert a constant
    pub fn intern(&mut self, constant: &Constant) -> Result<u16, Error> {
        let raw = match constant {
            Constant::Utf8(string) => RawConstant::Utf8(encode_modified_utf8(string)),
            Constant::Integer(value) => RawConstant::Integer(*value),
            Constant::Float(bits) => RawConstant::Float(*bits),
            Constant::Long(value) => RawConstant::Long(*value),
            Constant::Double(bits) => RawConstant::Double(*bits),
            Constant::Class(name) => RawConstant::Class(self.intern_utf8(name)?),
            Constant::String(string) => RawConstant::String(self.intern_utf8(string)?),
            Constant::FieldRef(member) => {
                let (class, name_and_type) = self.intern_member(member)?;
                RawConstant::FieldRef(class, name_and_type)
            }
            Constant::MethodRef(member) => {
                let (class, name_and_type) = self.intern_member(member)?;
                RawConstant::MethodRef(class, name_and_type)
            }
            Constant::InterfaceMethodRef(member) => {
                let (class, name_and_type) = self.intern_member(member)?;
                RawConstant::InterfaceMethodRef(class, name_and_type)
            }
            Constant::NameAndType { name, descriptor } => {
                RawConstant::NameAndType(self.intern_utf8(name)?, self.intern_utf8(descriptor)?)
            }
            Constant::MethodHandle { kind, member } => {
                RawConstant::MethodHandle(*kind as u8, self.intern(member)?)
            }
            Constant::MethodType(descriptor) => RawConstant::MethodType(self.intern_utf8(descriptor)?),
            Constant::Dynamic(dynamic) => {
                let (bootstrap, name_and_type) = self.intern_dynamic(dynamic)?;
                RawConstant::Dynamic(bootstrap, name_and_type)
            }
            Constant::InvokeDynamic(dynamic) => {
                let (bootstrap, name_and_type) = self.intern_dynamic(dynamic)?;
                RawConstant::InvokeDynamic(bootstrap, name_and_type)
            }
            Constant::Module(name) => RawConstant::Module(self.intern_utf8(name)?),
            Constant::Package(name) => RawConstant::Package(self.intern_utf8(name)?),
        };
        self.push_constant(raw)
    }

    pub fn intern_utf8(&mut self, string: &str) -> Result<u16, Error> {
        self.push_constant(RawConstant::Utf8(encode_modified_utf8(string)))
    }

    fn intern_member(&mut self, member: &MemberRef) -> Result<(u16, u16), Error> {
        let class = self.intern(&Constant::Class(member.class.clone()))?;
        let name = self.intern_utf8(&member.name)?;
        let descriptor = self.intern_utf8(&member.descriptor)?;
        let name_and_type = self.push_constant(RawConstant::NameAndType(name, descriptor))?;
        Ok((class, name_and_type))
    }

    fn intern_dynamic(&mut self, dynamic: &DynamicRef) -> Result<(u16, u16), Error> {
        let bootstrap = self.intern_bootstrap_method(&dynamic.bootstrap)?;
        let name = self.intern_utf8(&dynamic.name)?;
        let descriptor = self.intern_utf8(&dynamic.descriptor)?;
        let name_and_type = self.push_constant(RawConstant::NameAndType(name, descriptor))?;
        Ok((bootstrap, name_and_type))
    }

    /// Get or insert an entry in the `BootstrapMethods` table
    pub fn intern_bootstrap_method(&mut self, method: &BootstrapMethod) -> Result<u16, Error> {
        let raw = RawBootstrap {
            handle: self.intern(&method.handle)?,
            arguments: method
                .arguments
                .iter()
                .map(|argument| self.intern(argument))
                .collect::<Result<Vec<u16>, Error>>()?,
        };
        if let Some(index) = self.bootstrap_interned.get(&raw) {
            return Ok(*index);
        }
        let index = u16_count("bootstrap methods", self.bootstrap_methods.len())?;
        self.bootstrap_methods.push(raw.clone());
        self.bootstrap_interned.insert(raw, index);
        Ok(index)
    }

    /// Push a constant into the pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65534, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: RawConstant) -> Result<u16, Error> {
        self.intern_parent()?;
        if let Some(index) = self.interned.get(&constant) {
            return Ok(*index);
        }

        let offset = self.constants.offset_len().0;
        if offset + constant.width() > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow);
        }
        self.constants.push(constant.clone());
        self.interned.insert(constant, offset as u16);
        Ok(offset as u16)
    }

    /// Make the entries of the parent pool available for interning
    ///
    /// The first occurrence of a duplicated entry wins.
    fn intern_parent(&mut self) -> Result<(), Error> {
        if self.parent_interned {
            return Ok(());
        }
        self.parent_interned = true;
        if let Some(parent) = &self.parent {
            for index in parent.indices() {
                let raw = parent.raw_entry(index)?;
                self.interned.entry(raw).or_insert(index);
            }
        }
        Ok(())
    }

    /// Convenience helpers which intern a constant and remember its index
    fn entry(&mut self, constant: Constant) -> Result<PoolEntry, Error> {
        let index = self.intern(&constant)?;
        Ok(PoolEntry::with_origin(constant, self.id, index))
    }

    pub fn utf8_entry(&mut self, string: impl Into<String>) -> Result<PoolEntry, Error> {
        self.entry(Constant::Utf8(string.into()))
    }

    pub fn class_entry(&mut self, name: impl Into<String>) -> Result<PoolEntry, Error> {
        self.entry(Constant::Class(name.into()))
    }

    pub fn string_entry(&mut self, string: impl Into<String>) -> Result<PoolEntry, Error> {
        self.entry(Constant::String(string.into()))
    }

    pub fn field_ref_entry(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<PoolEntry, Error> {
        self.entry(Constant::FieldRef(MemberRef::new(class, name, descriptor)))
    }

    pub fn method_ref_entry(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<PoolEntry, Error> {
        self.entry(Constant::MethodRef(MemberRef::new(class, name, descriptor)))
    }

    pub fn interface_method_ref_entry(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<PoolEntry, Error> {
        self.entry(Constant::InterfaceMethodRef(MemberRef::new(
            class, name, descriptor,
        )))
    }

    pub fn name_and_type_entry(&mut self, name: &str, descriptor: &str) -> Result<PoolEntry, Error> {
        self.entry(Constant::NameAndType {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
        })
    }

    pub fn method_type_entry(&mut self, descriptor: &str) -> Result<PoolEntry, Error> {
        self.entry(Constant::MethodType(descriptor.to_owned()))
    }

    pub fn method_handle_entry(
        &mut self,
        kind: HandleKind,
        member: Constant,
    ) -> Result<PoolEntry, Error> {
        self.entry(Constant::MethodHandle {
            kind,
            member: Box::new(member),
        })
    }

    pub fn invoke_dynamic_entry(&mut self, dynamic: DynamicRef) -> Result<PoolEntry, Error> {
        self.entry(Constant::InvokeDynamic(dynamic))
    }

    pub fn constant_entry(&mut self, constant: Constant) -> Result<PoolEntry, Error> {
        self.entry(constant)
    }

    /// Write `constant_pool_count` and the pool entries
    pub fn write(&self, writer: &mut ByteWriter) {
        self.count().serialize(writer);
        if let Some(parent) = &self.parent {
            writer.write_bytes(parent.raw_bytes());
        }
        for (_, constant) in self.constants.iter() {
            constant.serialize(writer);
        }
    }

    /// Name index and body of the `BootstrapMethods` attribute, if there are any bootstrap methods
    ///
    /// This interns the attribute name, so it must be called before the pool is written.
    pub(crate) fn bootstrap_methods_attribute(&mut self) -> Result<Option<(u16, Vec<u8>)>, Error> {
        if self.bootstrap_methods.is_empty() {
            return Ok(None);
        }
        let shared_name = self
            .parent
            .as_ref()
            .and_then(|parent| parent.bootstrap_table().map(|table| table.name_index));
        let name_index = match shared_name {
            Some(index) => index,
            None => self.intern_utf8("BootstrapMethods")?,
        };
        let mut body = ByteWriter::new();
        u16_count("bootstrap methods", self.bootstrap_methods.len())?.serialize(&mut body);
        for method in &self.bootstrap_methods {
            method.serialize(&mut body);
        }
        Ok(Some((name_index, body.into_bytes())))
    }

    /// Position the parent class had its `BootstrapMethods` attribute at, if any
    pub(crate) fn bootstrap_methods_position(&self) -> Option<usize> {
        self.parent
            .as_ref()
            .and_then(|parent| parent.bootstrap_table().map(|table| table.position))
    }
}

impl Default for ConstantPoolBuilder {
    fn default() -> Self {
        ConstantPoolBuilder::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut pool = ConstantPoolBuilder::new();
        let object = pool.class_entry("java/lang/Object").unwrap();
        let init = pool
            .method_ref_entry("java/lang/Object", "<init>", "()V")
            .unwrap();
        assert_eq!(object.origin().map(|(_, index)| index), Some(2));
        assert_eq!(pool.index_of(&object).unwrap(), 2);
        assert_eq!(pool.intern(&Constant::Class("java/lang/Object".into())).unwrap(), 2);

        // utf8 "java/lang/Object", class, utf8 "<init>", utf8 "()V", name and type, method ref
        assert_eq!(init.origin().map(|(_, index)| index), Some(6));
        assert_eq!(pool.count(), 7);
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let mut pool = ConstantPoolBuilder::new();
        assert_eq!(pool.intern(&Constant::Long(1)).unwrap(), 1);
        assert_eq!(pool.intern(&Constant::double(2.0)).unwrap(), 3);
        assert_eq!(pool.intern(&Constant::Integer(3)).unwrap(), 5);
        assert_eq!(pool.intern(&Constant::Long(1)).unwrap(), 1);

        let mut writer = ByteWriter::new();
        pool.write(&mut writer);
        assert_eq!(&writer.as_bytes()[..2], &[0, 6]);
        assert_eq!(writer.as_bytes().len(), 2 + 9 + 9 + 5);
    }

    #[test]
    fn foreign_entries_are_converted() {
        let mut first = ConstantPoolBuilder::new();
        let mut second = ConstantPoolBuilder::new();
        second.intern_utf8("padding").unwrap();

        let entry = first.string_entry("hello").unwrap();
        assert_eq!(first.index_of(&entry).unwrap(), 2);
        assert_eq!(second.index_of(&entry).unwrap(), 3, "re-interned in the other pool");
    }

    #[test]
    fn overflow_is_detected() {
        let mut pool = ConstantPoolBuilder::new();
        for i in 0..65534 {
            pool.intern(&Constant::Integer(i)).unwrap();
        }
        assert_eq!(pool.count(), 65535);
        assert!(matches!(
            pool.intern(&Constant::Integer(-1)),
            Err(Error::ConstantPoolOverflow)
        ));
        assert_eq!(pool.intern(&Constant::Integer(7)).unwrap(), 8, "existing entries still resolve");
    }

    #[test]
    fn bootstrap_methods_are_interned() {
        let mut pool = ConstantPoolBuilder::new();
        let handle = Constant::MethodHandle {
            kind: HandleKind::InvokeStatic,
            member: Box::new(Constant::MethodRef(MemberRef::new(
                "java/lang/invoke/StringConcatFactory",
                "makeConcatWithConstants",
                "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;",
            ))),
        };
        let dynamic = |name: &str| DynamicRef {
            bootstrap: BootstrapMethod {
                handle: Box::new(handle.clone()),
                arguments: vec![Constant::String("\u{1}!".into())],
            },
            name: name.into(),
            descriptor: "(I)Ljava/lang/String;".into(),
        };
        pool.invoke_dynamic_entry(dynamic("a")).unwrap();
        pool.invoke_dynamic_entry(dynamic("b")).unwrap();
        assert_eq!(pool.bootstrap_method_count(), 1);

        let (_, body) = pool.bootstrap_methods_attribute().unwrap().unwrap();
        assert_eq!(body.len(), 2 + 2 + 2 + 2, "one method with one argument");
    }
}
