//! Builders: write-only accumulators of elements
//!
//! There is one builder per kind of structure: [`ClassBuilder`], [`FieldBuilder`],
//! [`MethodBuilder`], and [`crate::jvm::code::CodeBuilder`]. Each takes elements through `with`
//! (plus convenience methods) and hands them to a _sink_:
//!
//!   - for a class, the sink writes members straight into the output bytes
//!   - for fields, methods, and code, the sink buffers the elements until the builder is done,
//!     at which point they are handed to the enclosing builder as a model
//!   - inside a chained transform, the sink feeds every element to the next transform
//!
//! All nested builders of a `build` or `transform` call share the same constant pool builder and
//! the same settings.

mod buffered;
mod class_builder;
mod direct;
mod field_builder;
mod method_builder;

pub(crate) use buffered::*;
pub use class_builder::*;
pub(crate) use direct::DirectClassWriter;
pub use field_builder::*;
pub use method_builder::*;

use crate::jvm::code::Label;
use crate::jvm::constants::ConstantPoolBuilder;
use crate::jvm::elements::{ClassElement, CodeElement, FieldElement, MethodElement};
use crate::jvm::model::MethodInfo;
use crate::jvm::{Error, Settings};
use std::sync::Arc;

/// Receives the elements of a class
pub(crate) trait ClassSink {
    fn accept(&mut self, element: ClassElement) -> Result<(), Error>;
    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder;
    fn settings(&self) -> &Arc<Settings>;

    /// Internal name of the class being built
    fn this_class(&self) -> &str;
}

/// Receives the elements of a field
pub(crate) trait FieldSink {
    fn accept(&mut self, element: FieldElement) -> Result<(), Error>;
    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder;
    fn settings(&self) -> &Arc<Settings>;
}

/// Receives the elements of a method
pub(crate) trait MethodSink {
    fn accept(&mut self, element: MethodElement) -> Result<(), Error>;
    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder;
    fn settings(&self) -> &Arc<Settings>;
    fn method(&self) -> &Arc<MethodInfo>;
}

/// Receives the elements of a method body
pub(crate) trait CodeSink {
    fn accept(&mut self, element: CodeElement) -> Result<(), Error>;
    fn new_label(&mut self) -> Label;
    fn constant_pool(&mut self) -> &mut ConstantPoolBuilder;
    fn settings(&self) -> &Arc<Settings>;
    fn method(&self) -> &Arc<MethodInfo>;

    /// Hand out the next `size` local slots
    fn allocate_local(&mut self, size: u16) -> Result<u16, Error>;

    /// Next slot [`CodeSink::allocate_local`] would hand out
    fn next_local(&self) -> u16;

    /// Rewind local allocation (slots of an exited block become free again)
    fn restore_next_local(&mut self, slot: u16);

    /// Can control reach the position after the last element?
    fn is_reachable(&self) -> bool;
}
