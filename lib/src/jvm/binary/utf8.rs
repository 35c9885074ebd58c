use crate::jvm::Error;

/// Encode a string into modified UTF-8 format
///
/// The JVM uses its own special [_modified_ UTF-8][0] for encoding strings in class files. Quoting
/// the `java.io.DataInput` docs:
///
/// >  * The null byte `'\u0000'` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    for unit in string.encode_utf16() {
        let code = u32::from(unit);
        match code {
            0x0001..=0x007F => buffer.push(code as u8),
            0x0000 | 0x0080..=0x07FF => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            _ => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Decode modified UTF-8 bytes (see [`encode_modified_utf8`])
///
/// Unpaired surrogates cannot be represented in a Rust `String`, so they are reported as an error.
/// The `offset` is only used for the error.
pub fn decode_modified_utf8(bytes: &[u8], offset: usize) -> Result<String, Error> {
    // Fast path: plain ASCII (without nulls) is the same in both encodings
    if bytes.iter().all(|b| (0x01..0x80).contains(b)) {
        return String::from_utf8(bytes.to_vec()).map_err(|_| Error::BadUtf8(offset));
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let continuation = |i: usize| match bytes.get(i) {
        Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok(u16::from(b & 0x3F)),
        _ => Err(Error::BadUtf8(offset + i)),
    };
    while i < bytes.len() {
        let first = bytes[i];
        if first & 0b1000_0000 == 0 {
            if first == 0 {
                return Err(Error::BadUtf8(offset + i));
            }
            units.push(u16::from(first));
            i += 1;
        } else if first & 0b1110_0000 == 0b1100_0000 {
            units.push(u16::from(first & 0x1F) << 6 | continuation(i + 1)?);
            i += 2;
        } else if first & 0b1111_0000 == 0b1110_0000 {
            units.push(
                u16::from(first & 0x0F) << 12 | continuation(i + 1)? << 6 | continuation(i + 2)?,
            );
            i += 3;
        } else {
            return Err(Error::BadUtf8(offset + i));
        }
    }
    String::from_utf16(&units).map_err(|_| Error::BadUtf8(offset))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97], 0).unwrap(), "a\x00a");
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(
            encode_modified_utf8("hel10_World"),
            vec![104, 101, 108, 49, 48, 95, 87, 111, 114, 108, 100]
        );
    }

    #[test]
    fn two_and_three_byte_encodings() {
        let encoded = vec![
            196, 132, 199, 141, 199, 158, 199, 160, 199, 186, 200, 128, 200, 130, 200, 166, 200,
            186, 211, 144, 211, 146,
        ];
        assert_eq!(encode_modified_utf8("ĄǍǞǠǺȀȂȦȺӐӒ"), encoded);
        assert_eq!(decode_modified_utf8(&encoded, 0).unwrap(), "ĄǍǞǠǺȀȂȦȺӐӒ");
        assert_eq!(
            encode_modified_utf8("ऄअॲ"),
            vec![224, 164, 132, 224, 164, 133, 224, 165, 178]
        );
    }

    #[test]
    fn supplementary_characters_use_surrogate_pairs() {
        let encoded = encode_modified_utf8("\u{10000}");
        assert_eq!(encoded, vec![237, 160, 128, 237, 176, 128]);
        assert_eq!(decode_modified_utf8(&encoded, 0).unwrap(), "\u{10000}");
        assert_eq!(
            decode_modified_utf8(&encode_modified_utf8("x\u{10FFFF}y"), 0).unwrap(),
            "x\u{10FFFF}y"
        );
    }

    #[test]
    fn malformed_input() {
        assert!(decode_modified_utf8(&[0], 0).is_err(), "raw null");
        assert!(decode_modified_utf8(&[0xC0], 0).is_err(), "truncated pair");
        assert!(decode_modified_utf8(&[0xF0, 0x90, 0x80, 0x80], 0).is_err(), "4-byte form");
        assert!(decode_modified_utf8(&[237, 160, 128], 0).is_err(), "lone surrogate");
    }
}
