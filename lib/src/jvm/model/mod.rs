//! Models: read views over class file structures
//!
//! A model is either _bound_ to the bytes of a parsed class (and then decodes its elements each
//! time it is traversed) or _buffered_, holding elements that a builder collected. Both kinds
//! behave the same when traversed, and both can be handed to a builder.
//!
//!   - __Class__ is represented using [`ClassModel`] (always bound)
//!   - __Field__ is represented using [`FieldModel`]
//!   - __Method__ is represented using [`MethodModel`]
//!   - __Method body__ is represented using [`CodeModel`]
//!
//! Models are cheap to clone: bound models share the underlying [`ClassReader`].

mod class;
mod class_reader;
mod code;
mod field;
mod method;

pub use class::*;
pub use class_reader::{ClassReader, MAGIC};
pub(crate) use class_reader::{scan_attributes, AttributeRange, MemberRange};
pub use code::*;
pub use field::*;
pub use method::*;

use std::sync::Arc;

/// Where the elements of a field or method come from
#[derive(Clone)]
pub(crate) enum MemberSource<E> {
    /// Member `index` of the fields or methods of a parsed class
    Bound {
        reader: Arc<ClassReader>,
        index: usize,
    },
    Buffered(Vec<E>),
}
