use crate::jvm::Error;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl HandleKind {
    pub fn from_byte(byte: u8) -> Option<HandleKind> {
        Some(match byte {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        })
    }
}

/// Symbolic reference to a field or method
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Internal name of the owning class (or an array descriptor)
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> MemberRef {
        MemberRef {
            class: class.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// Entry in the `BootstrapMethods` table
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    /// Always a [`Constant::MethodHandle`]
    pub handle: Box<Constant>,

    /// Loadable constants passed as static arguments
    pub arguments: Vec<Constant>,
}

/// Dynamically-computed constant or call site
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DynamicRef {
    pub bootstrap: BootstrapMethod,
    pub name: String,
    pub descriptor: String,
}

/// Constant pool entry, in symbolic form
///
/// Unlike the class file encoding, there are no indices in here: a constant is meaningful without
/// the pool it came from. Floating point values are stored as their raw bits, so that every
/// constant can be hashed and compared exactly (`NaN` payloads included).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.4
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(String),
    String(String),
    FieldRef(MemberRef),
    MethodRef(MemberRef),
    InterfaceMethodRef(MemberRef),
    NameAndType { name: String, descriptor: String },
    MethodHandle { kind: HandleKind, member: Box<Constant> },
    MethodType(String),
    Dynamic(DynamicRef),
    InvokeDynamic(DynamicRef),
    Module(String),
    Package(String),
}

impl Constant {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;

    pub fn float(value: f32) -> Constant {
        Constant::Float(value.to_bits())
    }

    pub fn double(value: f64) -> Constant {
        Constant::Double(value.to_bits())
    }

    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => Constant::UTF8,
            Constant::Integer(_) => Constant::INTEGER,
            Constant::Float(_) => Constant::FLOAT,
            Constant::Long(_) => Constant::LONG,
            Constant::Double(_) => Constant::DOUBLE,
            Constant::Class(_) => Constant::CLASS,
            Constant::String(_) => Constant::STRING,
            Constant::FieldRef(_) => Constant::FIELD_REF,
            Constant::MethodRef(_) => Constant::METHOD_REF,
            Constant::InterfaceMethodRef(_) => Constant::INTERFACE_METHOD_REF,
            Constant::NameAndType { .. } => Constant::NAME_AND_TYPE,
            Constant::MethodHandle { .. } => Constant::METHOD_HANDLE,
            Constant::MethodType(_) => Constant::METHOD_TYPE,
            Constant::Dynamic(_) => Constant::DYNAMIC,
            Constant::InvokeDynamic(_) => Constant::INVOKE_DYNAMIC,
            Constant::Module(_) => Constant::MODULE,
            Constant::Package(_) => Constant::PACKAGE,
        }
    }

    /// Human readable name of a tag, used in error messages
    pub fn tag_name(tag: u8) -> &'static str {
        match tag {
            Constant::UTF8 => "Utf8",
            Constant::INTEGER => "Integer",
            Constant::FLOAT => "Float",
            Constant::LONG => "Long",
            Constant::DOUBLE => "Double",
            Constant::CLASS => "Class",
            Constant::STRING => "String",
            Constant::FIELD_REF => "Fieldref",
            Constant::METHOD_REF => "Methodref",
            Constant::INTERFACE_METHOD_REF => "InterfaceMethodref",
            Constant::NAME_AND_TYPE => "NameAndType",
            Constant::METHOD_HANDLE => "MethodHandle",
            Constant::METHOD_TYPE => "MethodType",
            Constant::DYNAMIC => "Dynamic",
            Constant::INVOKE_DYNAMIC => "InvokeDynamic",
            Constant::MODULE => "Module",
            Constant::PACKAGE => "Package",
            _ => "unknown constant",
        }
    }

    /// Can this be the operand of `ldc`/`ldc_w`/`ldc2_w` (or a bootstrap argument)?
    pub fn is_loadable(&self) -> bool {
        matches!(
            self,
            Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
                | Constant::Class(_)
                | Constant::String(_)
                | Constant::MethodHandle { .. }
                | Constant::MethodType(_)
                | Constant::Dynamic(_)
        )
    }

    /// Does the constant take up two stack slots (and two pool slots)?
    pub fn is_wide(&self) -> bool {
        match self {
            Constant::Long(_) | Constant::Double(_) => true,
            Constant::Dynamic(dynamic) => matches!(dynamic.descriptor.as_str(), "J" | "D"),
            _ => false,
        }
    }

    pub fn as_utf8(&self) -> Result<&str, Error> {
        match self {
            Constant::Utf8(s) => Ok(s),
            other => Err(other.unexpected(Constant::UTF8)),
        }
    }

    /// Internal name of a class constant
    pub fn as_class(&self) -> Result<&str, Error> {
        match self {
            Constant::Class(s) => Ok(s),
            other => Err(other.unexpected(Constant::CLASS)),
        }
    }

    /// Member reference of a field, method, or interface method constant
    pub fn as_member(&self) -> Result<&MemberRef, Error> {
        match self {
            Constant::FieldRef(m) | Constant::MethodRef(m) | Constant::InterfaceMethodRef(m) => {
                Ok(m)
            }
            other => Err(other.unexpected(Constant::METHOD_REF)),
        }
    }

    fn unexpected(&self, expected: u8) -> Error {
        Error::UnexpectedConstant {
            index: 0,
            expected: Constant::tag_name(expected),
            found: Constant::tag_name(self.tag()),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Utf8(s) => write!(f, "{:?}", s),
            Constant::Integer(i) => write!(f, "{}", i),
            Constant::Float(bits) => write!(f, "{}f", f32::from_bits(*bits)),
            Constant::Long(l) => write!(f, "{}L", l),
            Constant::Double(bits) => write!(f, "{}d", f64::from_bits(*bits)),
            Constant::Class(name) => write!(f, "class {}", name),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::FieldRef(m) | Constant::MethodRef(m) | Constant::InterfaceMethodRef(m) => {
                write!(f, "{}.{}:{}", m.class, m.name, m.descriptor)
            }
            Constant::NameAndType { name, descriptor } => write!(f, "{}:{}", name, descriptor),
            Constant::MethodHandle { kind, member } => write!(f, "{:?} {}", kind, member),
            Constant::MethodType(descriptor) => write!(f, "{}", descriptor),
            Constant::Dynamic(d) | Constant::InvokeDynamic(d) => {
                write!(f, "{}:{} (bootstrap {})", d.name, d.descriptor, d.bootstrap.handle)
            }
            Constant::Module(name) => write!(f, "module {}", name),
            Constant::Package(name) => write!(f, "package {}", name),
        }
    }
}

/// Constant along with where it came from
///
/// When an entry read from a class file is written back into a pool which shares the original
/// pool, its original index is reused as is. That keeps output byte-identical even when the input
/// pool contains duplicate entries. Equality and hashing only look at the constant.
#[derive(Clone)]
pub struct PoolEntry {
    constant: Constant,
    origin: Option<(u64, u16)>,
}

impl PoolEntry {
    /// Entry that isn't yet in any pool
    pub fn new(constant: Constant) -> PoolEntry {
        PoolEntry {
            constant,
            origin: None,
        }
    }

    pub(crate) fn with_origin(constant: Constant, pool_id: u64, index: u16) -> PoolEntry {
        PoolEntry {
            constant,
            origin: Some((pool_id, index)),
        }
    }

    pub fn constant(&self) -> &Constant {
        &self.constant
    }

    pub fn into_constant(self) -> Constant {
        self.constant
    }

    /// Pool id and index the entry was read from (or interned at)
    pub fn origin(&self) -> Option<(u64, u16)> {
        self.origin
    }

    pub fn as_utf8(&self) -> Result<&str, Error> {
        self.constant.as_utf8()
    }

    pub fn as_class(&self) -> Result<&str, Error> {
        self.constant.as_class()
    }

    pub fn as_member(&self) -> Result<&MemberRef, Error> {
        self.constant.as_member()
    }
}

impl From<Constant> for PoolEntry {
    fn from(constant: Constant) -> PoolEntry {
        PoolEntry::new(constant)
    }
}

impl PartialEq for PoolEntry {
    fn eq(&self, other: &Self) -> bool {
        self.constant == other.constant
    }
}

impl Eq for PoolEntry {}

impl Hash for PoolEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.constant.hash(state)
    }
}

impl fmt::Debug for PoolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Some((_, index)) => write!(f, "#{} {}", index, self.constant),
            None => write!(f, "{}", self.constant),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entries_compare_by_constant() {
        let read = PoolEntry::with_origin(Constant::Class("java/lang/Object".into()), 3, 7);
        let made = PoolEntry::new(Constant::Class("java/lang/Object".into()));
        assert_eq!(read, made, "origin should not affect equality");
        assert_eq!(format!("{:?}", read), "#7 class java/lang/Object");
    }

    #[test]
    fn floats_compare_bitwise() {
        assert_eq!(Constant::float(f32::NAN), Constant::float(f32::NAN));
        assert_ne!(Constant::double(0.0), Constant::double(-0.0));
        assert!(Constant::double(1.5).is_wide());
        assert!(!Constant::Integer(1).is_wide());
    }
}
