//! Attributes and the mappers which read and write them
//!
//! Attributes come in two forms. An [`Attribute::Bound`] attribute is a window into the bytes of
//! a parsed class, and is only decoded on request. An [`Attribute::Value`] holds a decoded (or
//! freshly built) [`AttributeValue`]. When an attribute gets written, its mapper's
//! [`AttributeStability`] decides whether the original bytes can be copied verbatim:
//!
//!   - stateless attributes are always copied
//!   - attributes referring to the constant pool are copied only into a compatible pool, and
//!     re-encoded otherwise
//!   - attributes referring to bytecode offsets are always re-encoded
//!   - unstable and unknown attributes are copied or dropped, depending on
//!     [`crate::jvm::AttributesPolicy`]

mod attribute;
mod mapper;
mod standard;
mod writer;

pub use attribute::*;
pub use mapper::*;
pub use standard::standard_mapper;
pub(crate) use writer::*;
