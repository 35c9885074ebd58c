use super::Label;
use crate::jvm::constants::PoolEntry;

/// Range of code covered by an exception handler
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.7.3
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionCatch {
    /// Start of the handler
    pub handler: Label,

    /// Start (inclusive) of the protected range
    pub start: Label,

    /// End (exclusive) of the protected range
    pub end: Label,

    /// Class of exceptions caught (`None` catches everything)
    pub catch_type: Option<PoolEntry>,
}

/// Debug information about a local variable (from `LocalVariableTable`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub slot: u16,

    /// Utf8 entry holding the name
    pub name: PoolEntry,

    /// Utf8 entry holding the field descriptor
    pub descriptor: PoolEntry,
    pub start: Label,
    pub end: Label,
}

/// Debug information about the generic type of a local variable (from `LocalVariableTypeTable`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableType {
    pub slot: u16,

    /// Utf8 entry holding the name
    pub name: PoolEntry,

    /// Utf8 entry holding the field signature
    pub signature: PoolEntry,
    pub start: Label,
    pub end: Label,
}
