//! Bytecode: instructions, labels, and the machinery to lay out method bodies
//!
//! ### Structure
//!
//! A method body is a sequence of [`crate::jvm::elements::CodeElement`]s: instructions, label
//! bindings, and pseudo-instructions (line numbers, local variable ranges, exception ranges).
//! Branches never hold offsets. They hold [`Label`]s, and it is only when the body is written out
//! that labels get resolved to offsets and branch encodings get picked.
//!
//! Every [`Instruction`] carries the exact [`Opcode`] it is encoded with, including the `wide`
//! forms. Re-encoding an unmodified body reproduces its bytes.
//!
//! ### Code generation
//!
//! [`CodeBuilder`] builds method bodies from top to bottom. On top of emitting instructions, it
//! has structured scaffolding (blocks, conditionals, try/catch) and allocates local variables.
//! The convenience operations live in [`CodeBuilderExts`].
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-6.html#jvms-6.5

mod catch_builder;
mod code_builder;
mod code_builder_exts;
mod code_writer;
mod instruction;
pub mod jump_encoding;
mod label;
mod opcode;
mod pseudo;
mod stack_depth;
mod stack_map;

pub use catch_builder::*;
pub use code_builder::*;
pub use code_builder_exts::*;
pub(crate) use code_writer::{CodeHints, CodeWriter};
pub use instruction::*;
pub use label::*;
pub use opcode::*;
pub use pseudo::*;
pub(crate) use stack_map::decode_frames;
pub use stack_map::{FrameShape, StackMapFrame, VerificationType};
