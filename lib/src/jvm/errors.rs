use crate::jvm::code::{Label, Opcode, TypeKind};
use thiserror::Error;

/// Broad classification of an [`Error`]
///
/// All errors are fail-fast: nothing is retried, and partial output is never returned. The kind
/// is mostly useful for deciding whether re-running with different [`crate::jvm::Settings`] could
/// help (it can for some representation errors, it never can for format errors).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input bytes, detected at the first access to the offending region
    Format,

    /// A builder invariant was violated by the caller
    Usage,

    /// Something valid could not be encoded under the current settings
    Representation,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of input: {needed} bytes needed at offset {offset}, {available} available")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("invalid constant pool tag {tag} at index {index}")]
    BadConstantTag { index: u16, tag: u8 },

    #[error("constant pool index {0} is out of range or unusable")]
    BadConstantIndex(u16),

    #[error("constant pool entry {index} is a {found}, expected {expected}")]
    UnexpectedConstant {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },

    #[error("constant pool entry {0} is nested too deeply")]
    ConstantNestingTooDeep(u16),

    #[error("malformed modified UTF-8 at offset {0}")]
    BadUtf8(usize),

    #[error("invalid opcode {opcode:#04x} at bytecode offset {offset}")]
    BadOpcode { opcode: u8, offset: usize },

    #[error("branch at bytecode offset {offset} targets {target}, which is outside the code")]
    BadBranchTarget { offset: usize, target: i64 },

    #[error("malformed {attribute} attribute: {reason}")]
    MalformedAttribute {
        attribute: String,
        reason: String,
    },

    #[error("invalid descriptor {0:?}")]
    BadDescriptor(String),

    #[error("opcode {0:?} is not a conditional branch on a value")]
    NotConditionalBranch(Opcode),

    #[error("opcode {opcode:?} cannot be used as {shape}")]
    WrongOpcode { opcode: Opcode, shape: &'static str },

    #[error("the body of the try block is empty")]
    EmptyTryBlock,

    #[error("a catch block already catches exceptions of type {0}")]
    DuplicateCatchType(String),

    #[error("a catch-all block has already been registered")]
    DuplicateCatchAll,

    #[error("label {0:?} is referenced but never bound")]
    UnboundLabel(Label),

    #[error("label {0:?} is already bound")]
    LabelAlreadyBound(Label),

    #[error("cannot change whether method {0} is static")]
    StaticFlagMutation(String),

    #[error("{0} is a primitive type, but a class or interface type is required")]
    PrimitiveWhereClassRequired(String),

    #[error("no conversion from {from:?} to {to:?}")]
    IllegalConversion { from: TypeKind, to: TypeKind },

    #[error("parameter {index} is out of range for a method with {count} parameters")]
    ParameterOutOfRange { index: usize, count: usize },

    #[error("static methods have no receiver slot")]
    NoReceiver,

    #[error("no attribute mapper knows how to write {0}")]
    MissingAttributeMapper(String),

    #[error("constant pool cannot hold more than 65535 entries")]
    ConstantPoolOverflow,

    #[error("method code is {0} bytes long, which exceeds the 65535 byte limit")]
    CodeTooLarge(usize),

    #[error("branch at bytecode offset {offset} jumps {distance} bytes, which does not fit in 16 bits")]
    ShortJumpOverflow { offset: usize, distance: i64 },

    #[error("{count} {what} do not fit in a u16 count")]
    TooMany { what: &'static str, count: usize },

    #[error("operand {value} does not fit in {what}")]
    OperandOverflow { what: &'static str, value: i64 },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnexpectedEof { .. }
            | Error::BadMagic(_)
            | Error::UnsupportedVersion { .. }
            | Error::BadConstantTag { .. }
            | Error::BadConstantIndex(_)
            | Error::UnexpectedConstant { .. }
            | Error::ConstantNestingTooDeep(_)
            | Error::BadUtf8(_)
            | Error::BadOpcode { .. }
            | Error::BadBranchTarget { .. }
            | Error::MalformedAttribute { .. }
            | Error::BadDescriptor(_) => ErrorKind::Format,

            Error::NotConditionalBranch(_)
            | Error::WrongOpcode { .. }
            | Error::EmptyTryBlock
            | Error::DuplicateCatchType(_)
            | Error::DuplicateCatchAll
            | Error::UnboundLabel(_)
            | Error::LabelAlreadyBound(_)
            | Error::StaticFlagMutation(_)
            | Error::PrimitiveWhereClassRequired(_)
            | Error::IllegalConversion { .. }
            | Error::ParameterOutOfRange { .. }
            | Error::NoReceiver
            | Error::MissingAttributeMapper(_)
            | Error::ShortJumpOverflow { .. } => ErrorKind::Usage,

            Error::ConstantPoolOverflow
            | Error::CodeTooLarge(_)
            | Error::TooMany { .. }
            | Error::OperandOverflow { .. } => ErrorKind::Representation,
        }
    }

    pub(crate) fn malformed(attribute: &str, reason: impl Into<String>) -> Error {
        Error::MalformedAttribute {
            attribute: attribute.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Convert a length into a `u16` count, as used all over the class file format
pub(crate) fn u16_count(what: &'static str, count: usize) -> Result<u16, Error> {
    u16::try_from(count).map_err(|_| Error::TooMany { what, count })
}
