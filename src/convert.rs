//! Decode primitives and the conversion catalog
//!
//! Controller memory is transferred as raw big-endian byte buffers. Each
//! primitive here interprets a handful of bytes at an offset as one typed
//! value and has no side effects. The catalog maps decode-function names from
//! the tag table to these primitives.

use dashmap::DashMap;

use crate::error::{PlcPollError, Result};

/// Widest value any catalog primitive reads, in bytes.
pub const MAX_DECODE_WIDTH: usize = 4;

/// A scalar value produced by a decode primitive
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bit(bool),
    Byte(u8),
    Word(u16),
    DWord(u32),
    Int(i16),
    DInt(i32),
    Real(f32),
    Text(String),
}

impl TagValue {
    /// Coerce into a bool. Numeric values map to `!= 0`.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            TagValue::Bit(b) => Ok(*b),
            TagValue::Byte(v) => Ok(*v != 0),
            TagValue::Word(v) => Ok(*v != 0),
            TagValue::DWord(v) => Ok(*v != 0),
            TagValue::Int(v) => Ok(*v != 0),
            TagValue::DInt(v) => Ok(*v != 0),
            other => Err(PlcPollError::decode(format!(
                "cannot coerce {other:?} into bool"
            ))),
        }
    }

    /// Coerce into an unsigned 32-bit counter value.
    pub fn as_u32(&self) -> Result<u32> {
        match self {
            TagValue::Bit(b) => Ok(u32::from(*b)),
            TagValue::Byte(v) => Ok(u32::from(*v)),
            TagValue::Word(v) => Ok(u32::from(*v)),
            TagValue::DWord(v) => Ok(*v),
            TagValue::Int(v) if *v >= 0 => Ok(*v as u32),
            TagValue::DInt(v) if *v >= 0 => Ok(*v as u32),
            other => Err(PlcPollError::decode(format!(
                "cannot coerce {other:?} into u32"
            ))),
        }
    }

    /// Coerce into an unsigned 16-bit value.
    pub fn as_u16(&self) -> Result<u16> {
        match self {
            TagValue::Bit(b) => Ok(u16::from(*b)),
            TagValue::Byte(v) => Ok(u16::from(*v)),
            TagValue::Word(v) => Ok(*v),
            TagValue::DWord(v) if *v <= u32::from(u16::MAX) => Ok(*v as u16),
            TagValue::Int(v) if *v >= 0 => Ok(*v as u16),
            TagValue::DInt(v) if (0..=i32::from(u16::MAX)).contains(v) => Ok(*v as u16),
            other => Err(PlcPollError::decode(format!(
                "cannot coerce {other:?} into u16"
            ))),
        }
    }

    /// Coerce into a 32-bit float.
    pub fn as_f32(&self) -> Result<f32> {
        match self {
            TagValue::Bit(b) => Ok(f32::from(u8::from(*b))),
            TagValue::Byte(v) => Ok(f32::from(*v)),
            TagValue::Word(v) => Ok(f32::from(*v)),
            TagValue::DWord(v) => Ok(*v as f32),
            TagValue::Int(v) => Ok(f32::from(*v)),
            TagValue::DInt(v) => Ok(*v as f32),
            TagValue::Real(v) => Ok(*v),
            other => Err(PlcPollError::decode(format!(
                "cannot coerce {other:?} into f32"
            ))),
        }
    }

    /// Coerce into a text value. Only `Text` qualifies.
    pub fn into_text(self) -> Result<String> {
        match self {
            TagValue::Text(s) => Ok(s),
            other => Err(PlcPollError::decode(format!(
                "cannot coerce {other:?} into text"
            ))),
        }
    }
}

/// Signature shared by all decode primitives
pub type DecodeFn = fn(&[u8], usize, Option<u8>) -> Result<TagValue>;

fn take(buf: &[u8], start: usize, width: usize) -> Result<&[u8]> {
    buf.get(start..start + width).ok_or_else(|| {
        PlcPollError::decode(format!(
            "read of {width} byte(s) at offset {start} exceeds buffer of {} byte(s)",
            buf.len()
        ))
    })
}

/// Decode a single bit out of one byte.
pub fn decode_bit(buf: &[u8], start: usize, bit: Option<u8>) -> Result<TagValue> {
    let bit = bit.ok_or_else(|| PlcPollError::decode("bit decode requires a bit index"))?;
    if bit > 7 {
        return Err(PlcPollError::decode(format!("bit index {bit} out of range 0..=7")));
    }
    let byte = take(buf, start, 1)?[0];
    Ok(TagValue::Bit(byte & (1 << bit) != 0))
}

/// Decode an unsigned byte.
pub fn decode_byte(buf: &[u8], start: usize, _bit: Option<u8>) -> Result<TagValue> {
    Ok(TagValue::Byte(take(buf, start, 1)?[0]))
}

/// Decode an unsigned 16-bit word.
pub fn decode_word(buf: &[u8], start: usize, _bit: Option<u8>) -> Result<TagValue> {
    let b = take(buf, start, 2)?;
    Ok(TagValue::Word(u16::from_be_bytes([b[0], b[1]])))
}

/// Decode an unsigned 32-bit double word.
pub fn decode_dword(buf: &[u8], start: usize, _bit: Option<u8>) -> Result<TagValue> {
    let b = take(buf, start, 4)?;
    Ok(TagValue::DWord(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
}

/// Decode a signed 16-bit integer.
pub fn decode_int(buf: &[u8], start: usize, _bit: Option<u8>) -> Result<TagValue> {
    let b = take(buf, start, 2)?;
    Ok(TagValue::Int(i16::from_be_bytes([b[0], b[1]])))
}

/// Decode a signed 32-bit integer.
pub fn decode_dint(buf: &[u8], start: usize, _bit: Option<u8>) -> Result<TagValue> {
    let b = take(buf, start, 4)?;
    Ok(TagValue::DInt(i32::from_be_bytes([b[0], b[1], b[2], b[3]])))
}

/// Decode an IEEE-754 32-bit float.
pub fn decode_real(buf: &[u8], start: usize, _bit: Option<u8>) -> Result<TagValue> {
    let b = take(buf, start, 4)?;
    Ok(TagValue::Real(f32::from_be_bytes([b[0], b[1], b[2], b[3]])))
}

/// Decode four ASCII bytes, trimmed at the first NUL and of trailing spaces.
pub fn decode_string(buf: &[u8], start: usize, _bit: Option<u8>) -> Result<TagValue> {
    let b = take(buf, start, 4)?;
    let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
    let text = String::from_utf8_lossy(&b[..end]).trim_end().to_string();
    Ok(TagValue::Text(text))
}

// ============================================================================
// Conversion Catalog
// ============================================================================

/// Name-keyed registry of decode primitives
///
/// Registering a name twice keeps the first entry; later registrations are
/// ignored silently.
pub struct ConversionCatalog {
    funcs: DashMap<String, DecodeFn>,
}

impl ConversionCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self { funcs: DashMap::new() }
    }

    /// Create a catalog with all built-in primitives registered
    pub fn with_defaults() -> Self {
        let catalog = Self::new();
        catalog.register("bit", decode_bit);
        catalog.register("byte", decode_byte);
        catalog.register("word", decode_word);
        catalog.register("dword", decode_dword);
        catalog.register("int", decode_int);
        catalog.register("dint", decode_dint);
        catalog.register("real", decode_real);
        catalog.register("string", decode_string);
        catalog
    }

    /// Register a decode primitive under a name. First registration wins.
    pub fn register(&self, name: &str, func: DecodeFn) {
        self.funcs.entry(name.to_string()).or_insert(func);
    }

    /// Look up a decode primitive by name
    pub fn get(&self, name: &str) -> Option<DecodeFn> {
        self.funcs.get(name).map(|entry| *entry.value())
    }

    /// Check whether a decode-function name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    /// Registered decode-function names
    pub fn names(&self) -> Vec<String> {
        self.funcs.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for ConversionCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bit() {
        let buf = [0b0000_0101u8, 0x00];
        assert_eq!(decode_bit(&buf, 0, Some(0)).unwrap(), TagValue::Bit(true));
        assert_eq!(decode_bit(&buf, 0, Some(1)).unwrap(), TagValue::Bit(false));
        assert_eq!(decode_bit(&buf, 0, Some(2)).unwrap(), TagValue::Bit(true));
        assert!(decode_bit(&buf, 0, None).is_err());
        assert!(decode_bit(&buf, 0, Some(8)).is_err());
    }

    #[test]
    fn test_decode_word_big_endian() {
        let buf = [0x12, 0x34];
        assert_eq!(decode_word(&buf, 0, None).unwrap(), TagValue::Word(0x1234));
    }

    #[test]
    fn test_decode_dword_and_dint() {
        let buf = [0x00, 0x01, 0x00, 0x00];
        assert_eq!(
            decode_dword(&buf, 0, None).unwrap(),
            TagValue::DWord(0x0001_0000)
        );
        let buf = (-5i32).to_be_bytes();
        assert_eq!(decode_dint(&buf, 0, None).unwrap(), TagValue::DInt(-5));
    }

    #[test]
    fn test_decode_int_negative() {
        let buf = (-123i16).to_be_bytes();
        assert_eq!(decode_int(&buf, 0, None).unwrap(), TagValue::Int(-123));
    }

    #[test]
    fn test_decode_real() {
        let buf = 3.5f32.to_be_bytes();
        assert_eq!(decode_real(&buf, 0, None).unwrap(), TagValue::Real(3.5));
    }

    #[test]
    fn test_decode_string_trims() {
        let buf = [b'S', b'C', 0, 0];
        assert_eq!(
            decode_string(&buf, 0, None).unwrap(),
            TagValue::Text("SC".to_string())
        );
        let buf = [b'A', b' ', b' ', b' '];
        assert_eq!(
            decode_string(&buf, 0, None).unwrap(),
            TagValue::Text("A".to_string())
        );
    }

    #[test]
    fn test_decode_is_deterministic() {
        let buf = [0xAB, 0xCD, 0xEF, 0x01];
        let first = decode_dword(&buf, 0, None).unwrap();
        let second = decode_dword(&buf, 0, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_short_buffer_is_an_error() {
        let buf = [0x00u8; 3];
        assert!(decode_dword(&buf, 0, None).is_err());
        assert!(decode_word(&buf, 2, None).is_err());
    }

    #[test]
    fn test_catalog_defaults() {
        let catalog = ConversionCatalog::with_defaults();
        for name in ["bit", "byte", "word", "dword", "int", "dint", "real", "string"] {
            assert!(catalog.contains(name), "missing primitive {name}");
        }
        assert!(catalog.get("float64").is_none());
    }

    #[test]
    fn test_first_registration_wins() {
        fn always_zero(_: &[u8], _: usize, _: Option<u8>) -> Result<TagValue> {
            Ok(TagValue::Byte(0))
        }

        let catalog = ConversionCatalog::with_defaults();
        catalog.register("word", always_zero);

        let buf = [0x12, 0x34];
        let func = catalog.get("word").unwrap();
        assert_eq!(func(&buf, 0, None).unwrap(), TagValue::Word(0x1234));
    }

    #[test]
    fn test_coercions() {
        assert!(TagValue::Word(1).as_bool().unwrap());
        assert!(!TagValue::Word(0).as_bool().unwrap());
        assert_eq!(TagValue::Word(42).as_u32().unwrap(), 42);
        assert_eq!(TagValue::Int(7).as_f32().unwrap(), 7.0);
        assert!(TagValue::Int(-1).as_u32().is_err());
        assert!(TagValue::Text("x".into()).as_f32().is_err());
        assert_eq!(TagValue::Text("SC".into()).into_text().unwrap(), "SC");
    }
}
