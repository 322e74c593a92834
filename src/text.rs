//! String encodings for `string` fields.
//!
//! Modified UTF-8 is the 1/2/3-byte scheme of Java's `DataInput`: U+0000 is
//! written as `C0 80` and code points above U+FFFF as two 3-byte surrogates.

use crate::error::DecodeError;

/// Character encoding of a string field. Latin-1 unless the schema says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Latin1,
    Ascii,
    Utf8,
    Utf16Be,
    ModifiedUtf8,
}

impl Encoding {
    /// Look up an encoding by charset name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().replace('_', "-").as_str() {
            "ISO-8859-1" | "ISO8859-1" | "LATIN1" | "LATIN-1" => Some(Encoding::Latin1),
            "US-ASCII" | "ASCII" => Some(Encoding::Ascii),
            "UTF-8" | "UTF8" => Some(Encoding::Utf8),
            "UTF-16BE" | "UTF16BE" => Some(Encoding::Utf16Be),
            "MUTF-8" | "MUTF8" | "MODIFIED-UTF-8" | "MODIFIED-UTF8" => Some(Encoding::ModifiedUtf8),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Latin1 => "ISO-8859-1",
            Encoding::Ascii => "US-ASCII",
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::ModifiedUtf8 => "MUTF-8",
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        match self {
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Encoding::Ascii => {
                if let Some(pos) = bytes.iter().position(|b| !b.is_ascii()) {
                    return Err(DecodeError::malformed(
                        self.name(),
                        format!("non-ASCII byte 0x{:02x} at {}", bytes[pos], pos),
                    ));
                }
                Ok(bytes.iter().map(|&b| char::from(b)).collect())
            }
            Encoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| DecodeError::malformed(self.name(), e.to_string())),
            Encoding::Utf16Be => {
                if bytes.len() % 2 != 0 {
                    return Err(DecodeError::malformed(self.name(), "odd byte length"));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&units).map_err(|e| DecodeError::malformed(self.name(), e.to_string()))
            }
            Encoding::ModifiedUtf8 => decode_modified_utf8(bytes),
        }
    }
}

/// Decode modified UTF-8.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, DecodeError> {
    const NAME: &str = "MUTF-8";
    let len = bytes.len();
    let mut units: Vec<u16> = Vec::with_capacity(len);
    let mut i = 0;
    while i < len {
        let b = bytes[i];
        match b >> 4 {
            0..=7 => {
                units.push(b as u16);
                i += 1;
            }
            12 | 13 => {
                if i + 1 >= len {
                    return Err(DecodeError::malformed(NAME, "partial character at end"));
                }
                let b2 = bytes[i + 1];
                if b2 & 0xC0 != 0x80 {
                    return Err(DecodeError::malformed(NAME, format!("malformed input around byte {}", i + 1)));
                }
                units.push(((b as u16 & 0x1F) << 6) | (b2 as u16 & 0x3F));
                i += 2;
            }
            14 => {
                if i + 2 >= len {
                    return Err(DecodeError::malformed(NAME, "partial character at end"));
                }
                let (b2, b3) = (bytes[i + 1], bytes[i + 2]);
                if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                    return Err(DecodeError::malformed(NAME, format!("malformed input around byte {}", i + 1)));
                }
                units.push(((b as u16 & 0x0F) << 12) | ((b2 as u16 & 0x3F) << 6) | (b3 as u16 & 0x3F));
                i += 3;
            }
            _ => {
                return Err(DecodeError::malformed(NAME, format!("malformed input around byte {}", i)));
            }
        }
    }
    String::from_utf16(&units).map_err(|_| DecodeError::malformed(NAME, "unpaired surrogate"))
}

/// Encode `s` as modified UTF-8.
pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mutf8_ascii_and_two_byte() {
        let bytes = [b'A', 0xC3, 0xA9, b'z'];
        assert_eq!(decode_modified_utf8(&bytes).unwrap(), "Aéz");
    }

    #[test]
    fn mutf8_nul_is_two_bytes() {
        assert_eq!(encode_modified_utf8("\0"), vec![0xC0, 0x80]);
        assert_eq!(decode_modified_utf8(&[0xC0, 0x80]).unwrap(), "\0");
    }

    #[test]
    fn mutf8_supplementary_uses_surrogate_pair() {
        let encoded = encode_modified_utf8("\u{1F600}");
        assert_eq!(encoded.len(), 6);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), "\u{1F600}");
    }

    #[test]
    fn mutf8_rejects_bad_continuation() {
        let err = decode_modified_utf8(&[0xC3, 0x41]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEncoding { .. }));
    }

    #[test]
    fn mutf8_rejects_truncated_sequence() {
        assert!(decode_modified_utf8(&[0xE2, 0x82]).is_err());
        assert!(decode_modified_utf8(&[b'a', 0xC3]).is_err());
    }

    #[test]
    fn mutf8_rejects_four_byte_lead() {
        assert!(decode_modified_utf8(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
    }

    #[test]
    fn latin1_maps_every_byte() {
        assert_eq!(Encoding::Latin1.decode(&[0x41, 0xE9, 0xFF]).unwrap(), "A\u{e9}\u{ff}");
    }

    #[test]
    fn ascii_rejects_high_bytes() {
        assert!(Encoding::Ascii.decode(b"ok").is_ok());
        assert!(Encoding::Ascii.decode(&[0x80]).is_err());
    }

    #[test]
    fn utf16be_decodes_and_rejects_odd_length() {
        assert_eq!(Encoding::Utf16Be.decode(&[0x00, 0x48, 0x00, 0x69]).unwrap(), "Hi");
        assert!(Encoding::Utf16Be.decode(&[0x00]).is_err());
    }

    #[test]
    fn encoding_names() {
        assert_eq!(Encoding::from_name("utf-8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_name("ISO-8859-1"), Some(Encoding::Latin1));
        assert_eq!(Encoding::from_name("mutf-8"), Some(Encoding::ModifiedUtf8));
        assert_eq!(Encoding::from_name("EBCDIC"), None);
    }

    proptest! {
        #[test]
        fn mutf8_round_trip_bmp(
            chars in prop::collection::vec((0u32..0x10000).prop_filter_map("surrogate", char::from_u32), 0..64)
        ) {
            let s: String = chars.into_iter().collect();
            let encoded = encode_modified_utf8(&s);
            prop_assert_eq!(decode_modified_utf8(&encoded).unwrap(), s);
        }
    }
}
