use super::AttributeValue;
use crate::jvm::binary::{ByteReader, ByteWriter};
use crate::jvm::constants::{ConstantPool, ConstantPoolBuilder};
use crate::jvm::Error;

/// How far the contents of an attribute can be trusted once the class around it changes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AttributeStability {
    /// Pure data: bytes can always be copied verbatim
    Stateless,

    /// Refers to the constant pool: bytes can be copied into a compatible pool, otherwise the
    /// attribute is decoded and re-encoded
    CpRefs,

    /// Refers to bytecode offsets: decoded and re-encoded whenever the code is
    Labels,

    /// Known, but with contents that depend on other parts of the class
    Unstable,

    /// No mapper is registered for the attribute
    Unknown,
}

/// Reads and writes one kind of attribute
///
/// The standard attributes have built-in mappers (see [`super::standard_mapper`]). Extra mappers
/// go in [`crate::jvm::Settings::attribute_mappers`], and are consulted first. A user mapper
/// typically produces [`AttributeValue::Custom`] values.
pub trait AttributeMapper: Send + Sync {
    /// Attribute name, as found in the class file
    fn name(&self) -> &str;

    fn stability(&self) -> AttributeStability;

    /// Can the attribute appear several times on the same structure?
    fn allow_multiple(&self) -> bool {
        false
    }

    /// Decode a payload (the bytes after the name index and length)
    fn read(&self, pool: &ConstantPool, payload: ByteReader<'_>) -> Result<AttributeValue, Error>;

    /// Encode a payload (the caller writes the name index and length)
    fn write(
        &self,
        value: &AttributeValue,
        pool: &mut ConstantPoolBuilder,
        writer: &mut ByteWriter,
    ) -> Result<(), Error>;
}
