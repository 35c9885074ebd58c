//! Big-endian cursors over class file bytes
//!
//! [`ByteReader`] does bounds-checked random access reads over an immutable buffer, and
//! [`ByteWriter`] appends to a growable buffer (with the ability to go back and patch in lengths
//! and counts once they are known).

mod reader;
mod utf8;
mod writer;

pub use reader::*;
pub use utf8::*;
pub use writer::*;

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`): tags are always `u8`, counts are almost always `u16`, and the lengths of
/// attributes get patched in after their bodies are written.
pub trait Serialize {
    /// Serialize construct into the output buffer
    fn serialize(&self, writer: &mut ByteWriter);
}

impl Serialize for u8 {
    fn serialize(&self, writer: &mut ByteWriter) {
        writer.write_u1(u32::from(*self))
    }
}

impl Serialize for u16 {
    fn serialize(&self, writer: &mut ByteWriter) {
        writer.write_u2(u32::from(*self))
    }
}

impl Serialize for u32 {
    fn serialize(&self, writer: &mut ByteWriter) {
        writer.write_u4(*self)
    }
}

impl Serialize for i32 {
    fn serialize(&self, writer: &mut ByteWriter) {
        writer.write_u4(*self as u32)
    }
}

impl Serialize for i64 {
    fn serialize(&self, writer: &mut ByteWriter) {
        writer.write_i64(*self)
    }
}
