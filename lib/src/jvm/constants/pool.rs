use super::{BootstrapMethod, Constant, DynamicRef, HandleKind, MemberRef, PoolEntry};
use crate::jvm::binary::{decode_modified_utf8, ByteReader, ByteWriter, Serialize};
use crate::jvm::Error;
use crate::util::Width;
use elsa::sync::FrozenMap;
use std::sync::Arc;

/// Maximum depth of constants referring to constants (eg. a dynamic constant whose bootstrap
/// arguments are dynamic constants)
const MAX_NESTING: u16 = 16;

/// Offset of the first pool entry in a class file (right after magic, version, and count)
pub(crate) const POOL_START: usize = 10;

/// Pool entry as it is encoded: other entries are referred to by index
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum RawConstant {
    /// Modified UTF-8 bytes
    Utf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
}

/// Almost all constants have width 1, except for `Long` and `Double`. Quoting the JVMS:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
/// >
/// > In retrospect, making 8-byte constants take two constant pool entries was a poor choice.
impl Width for RawConstant {
    fn width(&self) -> usize {
        match self {
            RawConstant::Long(_) | RawConstant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Serialize for RawConstant {
    fn serialize(&self, writer: &mut ByteWriter) {
        match self {
            RawConstant::Utf8(bytes) => {
                Constant::UTF8.serialize(writer);
                writer.write_u2(bytes.len() as u32);
                writer.write_bytes(bytes);
            }
            RawConstant::Integer(value) => {
                Constant::INTEGER.serialize(writer);
                value.serialize(writer);
            }
            RawConstant::Float(bits) => {
                Constant::FLOAT.serialize(writer);
                bits.serialize(writer);
            }
            RawConstant::Long(value) => {
                Constant::LONG.serialize(writer);
                value.serialize(writer);
            }
            RawConstant::Double(bits) => {
                Constant::DOUBLE.serialize(writer);
                (*bits as i64).serialize(writer);
            }
            RawConstant::Class(name) => {
                Constant::CLASS.serialize(writer);
                name.serialize(writer);
            }
            RawConstant::String(utf8) => {
                Constant::STRING.serialize(writer);
                utf8.serialize(writer);
            }
            RawConstant::FieldRef(class, name_and_type) => {
                Constant::FIELD_REF.serialize(writer);
                class.serialize(writer);
                name_and_type.serialize(writer);
            }
            RawConstant::MethodRef(class, name_and_type) => {
                Constant::METHOD_REF.serialize(writer);
                class.serialize(writer);
                name_and_type.serialize(writer);
            }
            RawConstant::InterfaceMethodRef(class, name_and_type) => {
                Constant::INTERFACE_METHOD_REF.serialize(writer);
                class.serialize(writer);
                name_and_type.serialize(writer);
            }
            RawConstant::NameAndType(name, descriptor) => {
                Constant::NAME_AND_TYPE.serialize(writer);
                name.serialize(writer);
                descriptor.serialize(writer);
            }
            RawConstant::MethodHandle(kind, member) => {
                Constant::METHOD_HANDLE.serialize(writer);
                kind.serialize(writer);
                member.serialize(writer);
            }
            RawConstant::MethodType(descriptor) => {
                Constant::METHOD_TYPE.serialize(writer);
                descriptor.serialize(writer);
            }
            RawConstant::Dynamic(bootstrap, name_and_type) => {
                Constant::DYNAMIC.serialize(writer);
                bootstrap.serialize(writer);
                name_and_type.serialize(writer);
            }
            RawConstant::InvokeDynamic(bootstrap, name_and_type) => {
                Constant::INVOKE_DYNAMIC.serialize(writer);
                bootstrap.serialize(writer);
                name_and_type.serialize(writer);
            }
            RawConstant::Module(name) => {
                Constant::MODULE.serialize(writer);
                name.serialize(writer);
            }
            RawConstant::Package(name) => {
                Constant::PACKAGE.serialize(writer);
                name.serialize(writer);
            }
        }
    }
}

/// Bootstrap method entry as it is encoded
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct RawBootstrap {
    pub handle: u16,
    pub arguments: Vec<u16>,
}

impl Serialize for RawBootstrap {
    fn serialize(&self, writer: &mut ByteWriter) {
        self.handle.serialize(writer);
        writer.write_u2(self.arguments.len() as u32);
        for argument in &self.arguments {
            argument.serialize(writer);
        }
    }
}

/// Location of the `BootstrapMethods` attribute of the class a pool belongs to
#[derive(Clone, Debug)]
pub(crate) struct BootstrapTable {
    /// Position of the attribute among the class attributes
    pub position: usize,

    /// Index of the attribute name in the pool
    pub name_index: u16,

    /// Start offset of each entry
    pub entries: Vec<usize>,
}

/// Read-only view of the constant pool of a parsed class
///
/// The offset of every entry is found eagerly (the pool has to be walked anyway to find out where
/// it ends), but entries are only decoded the first time they are accessed. Decoded entries are
/// cached, so repeated accesses are cheap and return the same reference.
pub struct ConstantPool {
    id: u64,
    bytes: Arc<[u8]>,

    /// Value of `constant_pool_count` (one more than the largest index)
    count: u16,

    /// Offset of the tag of each entry, indexed by pool index (`None` for unusable slots)
    offsets: Vec<Option<usize>>,

    /// Offset right after the last pool entry
    end: usize,

    cache: FrozenMap<u16, Box<Constant>>,
    bootstrap: Option<BootstrapTable>,
}

impl ConstantPool {
    /// Scan the pool of a class file
    pub(crate) fn parse(bytes: Arc<[u8]>, id: u64) -> Result<ConstantPool, Error> {
        let reader = ByteReader::new(&bytes);
        let count = reader.u2(POOL_START - 2)?;
        let mut offsets = Vec::with_capacity(count as usize);
        offsets.push(None);

        let mut offset = POOL_START;
        let mut index: u16 = 1;
        while index < count {
            let tag = reader.u1(offset)?;
            let size = match tag {
                Constant::UTF8 => 3 + reader.u2(offset + 1)? as usize,
                Constant::INTEGER | Constant::FLOAT => 5,
                Constant::LONG | Constant::DOUBLE => 9,
                Constant::CLASS
                | Constant::STRING
                | Constant::METHOD_TYPE
                | Constant::MODULE
                | Constant::PACKAGE => 3,
                Constant::FIELD_REF
                | Constant::METHOD_REF
                | Constant::INTERFACE_METHOD_REF
                | Constant::NAME_AND_TYPE
                | Constant::DYNAMIC
                | Constant::INVOKE_DYNAMIC => 5,
                Constant::METHOD_HANDLE => 4,
                _ => return Err(Error::BadConstantTag { index, tag }),
            };
            offsets.push(Some(offset));
            if tag == Constant::LONG || tag == Constant::DOUBLE {
                if index + 1 >= count {
                    return Err(Error::BadConstantIndex(index));
                }
                offsets.push(None);
                index += 1;
            }
            index += 1;
            offset += size;
        }
        reader.bytes(POOL_START, offset - POOL_START)?;

        Ok(ConstantPool {
            id,
            bytes,
            count,
            offsets,
            end: offset,
            cache: FrozenMap::new(),
            bootstrap: None,
        })
    }

    pub(crate) fn set_bootstrap_table(&mut self, table: BootstrapTable) {
        self.bootstrap = Some(table);
    }

    pub(crate) fn bootstrap_table(&self) -> Option<&BootstrapTable> {
        self.bootstrap.as_ref()
    }

    /// Identifier shared with the class reader that owns the pool
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Value of `constant_pool_count` (valid indices are `1..count`)
    pub fn count(&self) -> u16 {
        self.count
    }

    /// Offset in the class file right after the pool
    pub(crate) fn end_offset(&self) -> usize {
        self.end
    }

    /// Encoded pool entries (without the leading count)
    pub(crate) fn raw_bytes(&self) -> &[u8] {
        &self.bytes[POOL_START..self.end]
    }

    fn offset(&self, index: u16) -> Result<usize, Error> {
        self.offsets
            .get(index as usize)
            .copied()
            .flatten()
            .ok_or(Error::BadConstantIndex(index))
    }

    fn reader(&self) -> ByteReader<'_> {
        ByteReader::new(&self.bytes)
    }

    /// Tag of the entry at an index
    pub fn tag(&self, index: u16) -> Result<u8, Error> {
        self.reader().u1(self.offset(index)?)
    }

    /// Decoded entry at an index
    pub fn entry(&self, index: u16) -> Result<&Constant, Error> {
        self.entry_at_depth(index, 0)
    }

    /// Decoded entry at an index, where index `0` means "no entry"
    pub fn entry_opt(&self, index: u16) -> Result<Option<&Constant>, Error> {
        if index == 0 {
            Ok(None)
        } else {
            self.entry(index).map(Some)
        }
    }

    /// Entry at an index, remembering where it came from
    pub fn pool_entry(&self, index: u16) -> Result<PoolEntry, Error> {
        let constant = self.entry(index)?.clone();
        Ok(PoolEntry::with_origin(constant, self.id, index))
    }

    /// Like [`ConstantPool::pool_entry`], but index `0` means "no entry"
    pub fn pool_entry_opt(&self, index: u16) -> Result<Option<PoolEntry>, Error> {
        if index == 0 {
            Ok(None)
        } else {
            self.pool_entry(index).map(Some)
        }
    }

    /// Entry at an index, which must have a particular tag
    pub fn typed_entry(&self, index: u16, tag: u8) -> Result<PoolEntry, Error> {
        let entry = self.pool_entry(index)?;
        if entry.constant().tag() != tag {
            return Err(Error::UnexpectedConstant {
                index,
                expected: Constant::tag_name(tag),
                found: Constant::tag_name(entry.constant().tag()),
            });
        }
        Ok(entry)
    }

    pub fn utf8(&self, index: u16) -> Result<&str, Error> {
        match self.entry(index)? {
            Constant::Utf8(string) => Ok(string),
            other => Err(unexpected(index, Constant::UTF8, other)),
        }
    }

    /// Internal name of the class constant at an index
    pub fn class_name(&self, index: u16) -> Result<&str, Error> {
        match self.entry(index)? {
            Constant::Class(name) => Ok(name),
            other => Err(unexpected(index, Constant::CLASS, other)),
        }
    }

    fn entry_at_depth(&self, index: u16, depth: u16) -> Result<&Constant, Error> {
        if let Some(constant) = self.cache.get(&index) {
            return Ok(constant);
        }
        if depth > MAX_NESTING {
            return Err(Error::ConstantNestingTooDeep(index));
        }
        let constant = self.decode(index, depth)?;
        Ok(self.cache.insert(index, Box::new(constant)))
    }

    fn utf8_at_depth(&self, index: u16, depth: u16) -> Result<String, Error> {
        match self.entry_at_depth(index, depth)? {
            Constant::Utf8(string) => Ok(string.clone()),
            other => Err(unexpected(index, Constant::UTF8, other)),
        }
    }

    fn name_and_type(&self, index: u16, depth: u16) -> Result<(String, String), Error> {
        match self.entry_at_depth(index, depth)? {
            Constant::NameAndType { name, descriptor } => Ok((name.clone(), descriptor.clone())),
            other => Err(unexpected(index, Constant::NAME_AND_TYPE, other)),
        }
    }

    fn member(&self, offset: usize, depth: u16) -> Result<MemberRef, Error> {
        let reader = self.reader();
        let class_index = reader.u2(offset + 1)?;
        let class = match self.entry_at_depth(class_index, depth + 1)? {
            Constant::Class(name) => name.clone(),
            other => return Err(unexpected(class_index, Constant::CLASS, other)),
        };
        let (name, descriptor) = self.name_and_type(reader.u2(offset + 3)?, depth + 1)?;
        Ok(MemberRef {
            class,
            name,
            descriptor,
        })
    }

    fn dynamic(&self, offset: usize, depth: u16) -> Result<DynamicRef, Error> {
        let reader = self.reader();
        let bootstrap = self.bootstrap_method_at_depth(reader.u2(offset + 1)?, depth + 1)?;
        let (name, descriptor) = self.name_and_type(reader.u2(offset + 3)?, depth + 1)?;
        Ok(DynamicRef {
            bootstrap,
            name,
            descriptor,
        })
    }

    fn decode(&self, index: u16, depth: u16) -> Result<Constant, Error> {
        let offset = self.offset(index)?;
        let reader = self.reader();
        let next = depth + 1;
        Ok(match reader.u1(offset)? {
            Constant::UTF8 => {
                let len = reader.u2(offset + 1)? as usize;
                Constant::Utf8(decode_modified_utf8(
                    reader.bytes(offset + 3, len)?,
                    offset + 3,
                )?)
            }
            Constant::INTEGER => Constant::Integer(reader.i32(offset + 1)?),
            Constant::FLOAT => Constant::Float(reader.u4(offset + 1)?),
            Constant::LONG => Constant::Long(reader.i64(offset + 1)?),
            Constant::DOUBLE => Constant::Double(reader.i64(offset + 1)? as u64),
            Constant::CLASS => Constant::Class(self.utf8_at_depth(reader.u2(offset + 1)?, next)?),
            Constant::STRING => {
                Constant::String(self.utf8_at_depth(reader.u2(offset + 1)?, next)?)
            }
            Constant::FIELD_REF => Constant::FieldRef(self.member(offset, depth)?),
            Constant::METHOD_REF => Constant::MethodRef(self.member(offset, depth)?),
            Constant::INTERFACE_METHOD_REF => {
                Constant::InterfaceMethodRef(self.member(offset, depth)?)
            }
            Constant::NAME_AND_TYPE => Constant::NameAndType {
                name: self.utf8_at_depth(reader.u2(offset + 1)?, next)?,
                descriptor: self.utf8_at_depth(reader.u2(offset + 3)?, next)?,
            },
            Constant::METHOD_HANDLE => {
                let kind = HandleKind::from_byte(reader.u1(offset + 1)?)
                    .ok_or(Error::BadConstantIndex(index))?;
                let member_index = reader.u2(offset + 2)?;
                let member = self.entry_at_depth(member_index, next)?;
                if member.as_member().is_err() {
                    return Err(unexpected(member_index, Constant::METHOD_REF, member));
                }
                Constant::MethodHandle {
                    kind,
                    member: Box::new(member.clone()),
                }
            }
            Constant::METHOD_TYPE => {
                Constant::MethodType(self.utf8_at_depth(reader.u2(offset + 1)?, next)?)
            }
            Constant::DYNAMIC => Constant::Dynamic(self.dynamic(offset, depth)?),
            Constant::INVOKE_DYNAMIC => Constant::InvokeDynamic(self.dynamic(offset, depth)?),
            Constant::MODULE => Constant::Module(self.utf8_at_depth(reader.u2(offset + 1)?, next)?),
            Constant::PACKAGE => {
                Constant::Package(self.utf8_at_depth(reader.u2(offset + 1)?, next)?)
            }
            tag => return Err(Error::BadConstantTag { index, tag }),
        })
    }

    /// Decoded entry of the class' `BootstrapMethods` table
    pub fn bootstrap_method(&self, index: u16) -> Result<BootstrapMethod, Error> {
        self.bootstrap_method_at_depth(index, 0)
    }

    fn bootstrap_method_at_depth(&self, index: u16, depth: u16) -> Result<BootstrapMethod, Error> {
        let raw = self.raw_bootstrap_method(index)?;
        let handle = self.entry_at_depth(raw.handle, depth + 1)?;
        if !matches!(handle, Constant::MethodHandle { .. }) {
            return Err(unexpected(raw.handle, Constant::METHOD_HANDLE, handle));
        }
        let arguments = raw
            .arguments
            .iter()
            .map(|argument| self.entry_at_depth(*argument, depth + 1).cloned())
            .collect::<Result<Vec<Constant>, Error>>()?;
        Ok(BootstrapMethod {
            handle: Box::new(handle.clone()),
            arguments,
        })
    }

    fn raw_bootstrap_method(&self, index: u16) -> Result<RawBootstrap, Error> {
        let offset = self
            .bootstrap
            .as_ref()
            .and_then(|table| table.entries.get(index as usize))
            .copied()
            .ok_or_else(|| {
                Error::malformed(
                    "BootstrapMethods",
                    format!("no bootstrap method at index {}", index),
                )
            })?;
        let reader = self.reader();
        let handle = reader.u2(offset)?;
        let count = reader.u2(offset + 2)? as usize;
        let arguments = (0..count)
            .map(|i| reader.u2(offset + 4 + 2 * i))
            .collect::<Result<Vec<u16>, Error>>()?;
        Ok(RawBootstrap { handle, arguments })
    }

    /// Every entry of the `BootstrapMethods` table, still in encoded form
    pub(crate) fn raw_bootstrap_methods(&self) -> Result<Vec<RawBootstrap>, Error> {
        let count = self.bootstrap.as_ref().map_or(0, |table| table.entries.len());
        (0..count)
            .map(|i| self.raw_bootstrap_method(i as u16))
            .collect()
    }

    /// Entry at an index, still in encoded form
    pub(crate) fn raw_entry(&self, index: u16) -> Result<RawConstant, Error> {
        let offset = self.offset(index)?;
        let reader = self.reader();
        let u2 = |at: usize| reader.u2(offset + at);
        Ok(match reader.u1(offset)? {
            Constant::UTF8 => RawConstant::Utf8(reader.copy_bytes(offset + 3, u2(1)? as usize)?),
            Constant::INTEGER => RawConstant::Integer(reader.i32(offset + 1)?),
            Constant::FLOAT => RawConstant::Float(reader.u4(offset + 1)?),
            Constant::LONG => RawConstant::Long(reader.i64(offset + 1)?),
            Constant::DOUBLE => RawConstant::Double(reader.i64(offset + 1)? as u64),
            Constant::CLASS => RawConstant::Class(u2(1)?),
            Constant::STRING => RawConstant::String(u2(1)?),
            Constant::FIELD_REF => RawConstant::FieldRef(u2(1)?, u2(3)?),
            Constant::METHOD_REF => RawConstant::MethodRef(u2(1)?, u2(3)?),
            Constant::INTERFACE_METHOD_REF => RawConstant::InterfaceMethodRef(u2(1)?, u2(3)?),
            Constant::NAME_AND_TYPE => RawConstant::NameAndType(u2(1)?, u2(3)?),
            Constant::METHOD_HANDLE => RawConstant::MethodHandle(reader.u1(offset + 1)?, u2(2)?),
            Constant::METHOD_TYPE => RawConstant::MethodType(u2(1)?),
            Constant::DYNAMIC => RawConstant::Dynamic(u2(1)?, u2(3)?),
            Constant::INVOKE_DYNAMIC => RawConstant::InvokeDynamic(u2(1)?, u2(3)?),
            Constant::MODULE => RawConstant::Module(u2(1)?),
            Constant::PACKAGE => RawConstant::Package(u2(1)?),
            tag => return Err(Error::BadConstantTag { index, tag }),
        })
    }

    /// Usable indices, in order
    pub fn indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.offsets
            .iter()
            .enumerate()
            .filter_map(|(index, offset)| offset.map(|_| index as u16))
    }
}

fn unexpected(index: u16, expected: u8, found: &Constant) -> Error {
    Error::UnexpectedConstant {
        index,
        expected: Constant::tag_name(expected),
        found: Constant::tag_name(found.tag()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Class file prefix (magic and version) followed by a pool
    fn pool_bytes(count: u16, entries: &[u8]) -> Arc<[u8]> {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
        bytes.extend_from_slice(&count.to_be_bytes());
        bytes.extend_from_slice(entries);
        bytes.into()
    }

    #[test]
    fn decode_lazily() {
        #[rustfmt::skip]
        let bytes = pool_bytes(6, &[
            7, 0, 2,                       // #1 Class #2
            1, 0, 3, b'F', b'o', b'o',     // #2 Utf8 "Foo"
            5, 0, 0, 0, 0, 0, 0, 0, 42,    // #3 Long 42 (and unusable #4)
            8, 0, 9,                       // #5 String #9 (out of range)
        ]);
        let pool = ConstantPool::parse(bytes, 1).unwrap();
        assert_eq!(pool.count(), 6);
        assert_eq!(pool.end_offset(), POOL_START + 21);
        assert_eq!(pool.class_name(1).unwrap(), "Foo");
        assert_eq!(pool.entry(3).unwrap(), &Constant::Long(42));
        assert!(matches!(pool.entry(4), Err(Error::BadConstantIndex(4))));
        assert!(matches!(pool.entry(5), Err(Error::BadConstantIndex(9))));
        assert!(pool.entry_opt(0).unwrap().is_none());
        assert_eq!(pool.indices().collect::<Vec<_>>(), vec![1, 2, 3, 5]);
        assert!(matches!(
            pool.utf8(1),
            Err(Error::UnexpectedConstant { index: 1, .. })
        ));
    }

    #[test]
    fn reject_bad_tags() {
        let bytes = pool_bytes(2, &[2, 0, 0]);
        assert!(matches!(
            ConstantPool::parse(bytes, 1),
            Err(Error::BadConstantTag { index: 1, tag: 2 })
        ));
    }

    #[test]
    fn self_referencing_entries_are_bounded() {
        // #1 MethodHandle pointing at itself
        let bytes = pool_bytes(2, &[15, 1, 0, 1]);
        let pool = ConstantPool::parse(bytes, 1).unwrap();
        assert!(matches!(
            pool.entry(1),
            Err(Error::ConstantNestingTooDeep(1))
        ));
    }
}
