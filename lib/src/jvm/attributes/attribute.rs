use super::AttributeMapper;
use crate::jvm::binary::ByteReader;
use crate::jvm::constants::PoolEntry;
use crate::jvm::model::ClassReader;
use crate::jvm::{Error, InnerClassAccessFlags, Settings};
use std::any::Any;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// An attribute, either still sitting in the bytes it was parsed from or as a value
#[derive(Clone, Debug)]
pub enum Attribute {
    Bound(BoundAttribute),
    Value(AttributeValue),
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::Bound(bound) => bound.name(),
            Attribute::Value(value) => value.name(),
        }
    }

    /// Decode the attribute (a no-op clone for values)
    ///
    /// Mappers from the settings of the class the attribute was parsed from are used. Attributes
    /// no mapper knows about come back as [`AttributeValue::Unknown`].
    pub fn value(&self) -> Result<AttributeValue, Error> {
        match self {
            Attribute::Bound(bound) => bound.decode(bound.reader.settings()),
            Attribute::Value(value) => Ok(value.clone()),
        }
    }
}

impl From<AttributeValue> for Attribute {
    fn from(value: AttributeValue) -> Attribute {
        Attribute::Value(value)
    }
}

/// Attribute that has not been decoded from its class file
#[derive(Clone)]
pub struct BoundAttribute {
    pub(crate) reader: Arc<ClassReader>,
    pub(crate) name: String,

    /// Range of the payload (after the name and length) in the class file
    pub(crate) payload: Range<usize>,
}

impl BoundAttribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.reader.bytes()[self.payload.clone()]
    }

    /// Full attribute bytes, including the name index and length
    pub(crate) fn raw_bytes(&self) -> &[u8] {
        &self.reader.bytes()[self.payload.start - 6..self.payload.end]
    }

    pub(crate) fn decode(&self, settings: &Settings) -> Result<AttributeValue, Error> {
        match settings.mapper_for(&self.name) {
            Some(mapper) => mapper.read(self.reader.pool(), ByteReader::new(self.payload())),
            None => Ok(AttributeValue::Unknown {
                name: self.name.clone(),
                payload: self.payload().to_vec(),
            }),
        }
    }
}

impl fmt::Debug for BoundAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}..{}", self.name, self.payload.start, self.payload.end)
    }
}

/// Decoded attribute
#[derive(Clone, Debug)]
pub enum AttributeValue {
    /// Value of a constant field (an `Integer`, `Long`, `Float`, `Double`, or `String` constant)
    ConstantValue(PoolEntry),

    /// Checked exceptions declared by a method
    Exceptions(Vec<PoolEntry>),
    InnerClasses(Vec<InnerClass>),
    EnclosingMethod {
        class: PoolEntry,

        /// `NameAndType` of the enclosing method, if the class is enclosed by one
        method: Option<PoolEntry>,
    },
    Synthetic,

    /// Utf8 entry holding a generic signature
    Signature(PoolEntry),

    /// Utf8 entry holding the source file name
    SourceFile(PoolEntry),
    SourceDebugExtension(Vec<u8>),
    Deprecated,
    NestHost(PoolEntry),
    NestMembers(Vec<PoolEntry>),
    PermittedSubclasses(Vec<PoolEntry>),
    MethodParameters(Vec<MethodParameter>),

    /// Attribute no mapper knows about, kept as opaque bytes
    Unknown { name: String, payload: Vec<u8> },

    /// Attribute produced by a user-supplied mapper
    Custom(CustomAttribute),
}

impl AttributeValue {
    pub fn name(&self) -> &str {
        match self {
            AttributeValue::ConstantValue(_) => "ConstantValue",
            AttributeValue::Exceptions(_) => "Exceptions",
            AttributeValue::InnerClasses(_) => "InnerClasses",
            AttributeValue::EnclosingMethod { .. } => "EnclosingMethod",
            AttributeValue::Synthetic => "Synthetic",
            AttributeValue::Signature(_) => "Signature",
            AttributeValue::SourceFile(_) => "SourceFile",
            AttributeValue::SourceDebugExtension(_) => "SourceDebugExtension",
            AttributeValue::Deprecated => "Deprecated",
            AttributeValue::NestHost(_) => "NestHost",
            AttributeValue::NestMembers(_) => "NestMembers",
            AttributeValue::PermittedSubclasses(_) => "PermittedSubclasses",
            AttributeValue::MethodParameters(_) => "MethodParameters",
            AttributeValue::Unknown { name, .. } => name,
            AttributeValue::Custom(custom) => custom.mapper.name(),
        }
    }
}

/// Entry in the `InnerClasses` attribute
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InnerClass {
    pub inner_class: PoolEntry,
    pub outer_class: Option<PoolEntry>,

    /// Simple name (`None` for anonymous classes)
    pub inner_name: Option<PoolEntry>,
    pub flags: InnerClassAccessFlags,
}

/// Entry in the `MethodParameters` attribute
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodParameter {
    pub name: Option<PoolEntry>,

    /// `final`, `synthetic`, or `mandated` (`0x0010`, `0x1000`, `0x8000`)
    pub flags: u16,
}

/// Value of an attribute read by a user-supplied mapper
///
/// The mapper that produced the value is also the one that writes it back out, so `data` can be
/// anything that mapper knows how to downcast.
#[derive(Clone)]
pub struct CustomAttribute {
    pub mapper: Arc<dyn AttributeMapper>,
    pub data: Arc<dyn Any + Send + Sync>,
}

impl CustomAttribute {
    pub fn new<T: Any + Send + Sync>(mapper: Arc<dyn AttributeMapper>, data: T) -> CustomAttribute {
        CustomAttribute {
            mapper,
            data: Arc::new(data),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref()
    }
}

impl fmt::Debug for CustomAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Custom({})", self.mapper.name())
    }
}
