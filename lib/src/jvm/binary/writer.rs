use byteorder::{BigEndian, ByteOrder};

/// Append-only output buffer, with support for patching fixed-width values at recorded offsets
///
/// Writes of narrower widths than the value passed in are truncating: only the least significant
/// bytes are kept. This is what makes it possible to write, say, a `u16` count field as a
/// placeholder and patch it once the real count is known without any intermediate conversions.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> ByteWriter {
        ByteWriter { buffer: vec![] }
    }

    pub fn with_capacity(capacity: usize) -> ByteWriter {
        ByteWriter {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Offset at which the next byte will be written
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    /// Hint that this many extra bytes are about to be written
    pub fn reserve(&mut self, additional: usize) {
        self.buffer.reserve(additional);
    }

    fn append(&mut self, width: usize, write: impl FnOnce(&mut [u8])) {
        let start = self.buffer.len();
        self.buffer.resize(start + width, 0);
        write(&mut self.buffer[start..]);
    }

    pub fn write_u1(&mut self, value: u32) {
        self.buffer.push(value as u8);
    }

    pub fn write_u2(&mut self, value: u32) {
        self.append(2, |bytes| BigEndian::write_u16(bytes, value as u16));
    }

    pub fn write_u4(&mut self, value: u32) {
        self.append(4, |bytes| BigEndian::write_u32(bytes, value));
    }

    pub fn write_i64(&mut self, value: i64) {
        self.append(8, |bytes| BigEndian::write_i64(bytes, value));
    }

    pub fn write_f32(&mut self, value: f32) {
        self.append(4, |bytes| BigEndian::write_f32(bytes, value));
    }

    pub fn write_f64(&mut self, value: f64) {
        self.append(8, |bytes| BigEndian::write_f64(bytes, value));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Overwrite a `u2` that was previously written at `offset`
    ///
    /// Panics if `offset` does not point inside what has already been written.
    pub fn patch_u2(&mut self, offset: usize, value: u32) {
        BigEndian::write_u16(&mut self.buffer[offset..offset + 2], value as u16);
    }

    /// Overwrite a `u4` that was previously written at `offset`
    pub fn patch_u4(&mut self, offset: usize, value: u32) {
        BigEndian::write_u32(&mut self.buffer[offset..offset + 4], value);
    }

    /// Write a `u4` length placeholder, returning a handle to patch it with once the body is done
    pub fn begin_length(&mut self) -> usize {
        let offset = self.position();
        self.write_u4(0);
        offset
    }

    /// Patch the length placeholder with the number of bytes written since it
    pub fn end_length(&mut self, placeholder: usize) {
        let length = self.position() - placeholder - 4;
        self.patch_u4(placeholder, length as u32);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn big_endian_appends() {
        let mut writer = ByteWriter::new();
        writer.write_u1(0xCA);
        writer.write_u2(0xFEBA);
        writer.write_u4(0xBE00_0001);
        writer.write_i64(-2);
        assert_eq!(
            writer.as_bytes(),
            &[
                0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
                0xFF, 0xFE
            ]
        );
    }

    #[test]
    fn narrow_writes_truncate() {
        let mut writer = ByteWriter::new();
        writer.write_u1(0x1234);
        writer.write_u2(0x0012_3456);
        assert_eq!(writer.as_bytes(), &[0x34, 0x34, 0x56]);
    }

    #[test]
    fn patching_leaves_later_bytes_alone() {
        let mut writer = ByteWriter::new();
        let count_at = writer.position();
        writer.write_u2(0);
        let length_at = writer.begin_length();
        writer.write_bytes(&[1, 2, 3]);
        writer.end_length(length_at);
        writer.write_u1(9);
        writer.patch_u2(count_at, 7);
        assert_eq!(writer.as_bytes(), &[0, 7, 0, 0, 0, 3, 1, 2, 3, 9]);
    }

    #[test]
    fn floats() {
        let mut writer = ByteWriter::new();
        writer.write_f32(1.0);
        writer.write_f64(-0.0);
        assert_eq!(
            writer.as_bytes(),
            &[0x3F, 0x80, 0, 0, 0x80, 0, 0, 0, 0, 0, 0, 0]
        );
    }
}
