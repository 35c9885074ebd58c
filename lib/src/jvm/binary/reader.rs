use crate::jvm::Error;
use byteorder::{BigEndian, ByteOrder};

/// Bounds-checked, big-endian, random access reads over an immutable buffer
///
/// Every read takes an absolute offset: nothing here tracks a position. Going past the end of the
/// buffer is always a format error.
#[derive(Copy, Clone, Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> ByteReader<'a> {
        ByteReader { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow `len` bytes starting at `offset`
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], Error> {
        offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or(Error::UnexpectedEof {
                offset,
                needed: len,
                available: self.bytes.len().saturating_sub(offset),
            })
    }

    /// Copy `len` bytes starting at `offset`
    pub fn copy_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, Error> {
        self.bytes(offset, len).map(<[u8]>::to_vec)
    }

    pub fn u1(&self, offset: usize) -> Result<u8, Error> {
        Ok(self.bytes(offset, 1)?[0])
    }

    pub fn s1(&self, offset: usize) -> Result<i8, Error> {
        Ok(self.u1(offset)? as i8)
    }

    pub fn u2(&self, offset: usize) -> Result<u16, Error> {
        Ok(BigEndian::read_u16(self.bytes(offset, 2)?))
    }

    pub fn s2(&self, offset: usize) -> Result<i16, Error> {
        Ok(BigEndian::read_i16(self.bytes(offset, 2)?))
    }

    pub fn u4(&self, offset: usize) -> Result<u32, Error> {
        Ok(BigEndian::read_u32(self.bytes(offset, 4)?))
    }

    pub fn i32(&self, offset: usize) -> Result<i32, Error> {
        Ok(BigEndian::read_i32(self.bytes(offset, 4)?))
    }

    pub fn i64(&self, offset: usize) -> Result<i64, Error> {
        Ok(BigEndian::read_i64(self.bytes(offset, 8)?))
    }

    pub fn f32(&self, offset: usize) -> Result<f32, Error> {
        Ok(BigEndian::read_f32(self.bytes(offset, 4)?))
    }

    pub fn f64(&self, offset: usize) -> Result<f64, Error> {
        Ok(BigEndian::read_f64(self.bytes(offset, 8)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_big_endian() {
        let reader = ByteReader::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0xFF, 0xFE]);
        assert_eq!(reader.u4(0).unwrap(), 0xCAFE_BABE);
        assert_eq!(reader.u2(2).unwrap(), 0xBABE);
        assert_eq!(reader.s2(4).unwrap(), -2);
        assert_eq!(reader.s1(5).unwrap(), -2);
        assert_eq!(reader.i32(2).unwrap(), 0xBABE_FFFEu32 as i32);
    }

    #[test]
    fn out_of_range_is_an_error() {
        let reader = ByteReader::new(&[1, 2, 3]);
        match reader.u4(1) {
            Err(Error::UnexpectedEof {
                offset: 1,
                needed: 4,
                available: 2,
            }) => (),
            other => panic!("expected end of input error, got {:?}", other),
        }
        assert!(reader.u1(3).is_err(), "reading one past the end");
        assert!(reader.bytes(usize::MAX, 2).is_err(), "offset overflow");
        assert_eq!(reader.bytes(3, 0).unwrap(), &[] as &[u8]);
    }
}
