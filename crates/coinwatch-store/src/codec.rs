//! Conversion between stored payloads and typed values.
//!
//! Payloads are opaque bytes in the backing table. The set of types that can
//! be stored is closed: raw bytes pass through untouched and integers use a
//! fixed-width big-endian layout, so a row written as `u32` by one component
//! reads back identically in another.

use std::fmt;

/// Kind of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bytes,
    UInt32,
    UInt64,
}

impl ValueKind {
    /// Encoded width in bytes, `None` for variable-length payloads.
    pub fn width(&self) -> Option<usize> {
        match self {
            Self::Bytes => None,
            Self::UInt32 => Some(4),
            Self::UInt64 => Some(8),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes => write!(f, "bytes"),
            Self::UInt32 => write!(f, "u32"),
            Self::UInt64 => write!(f, "u64"),
        }
    }
}

/// Decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Cannot decode {kind} from a {actual}-byte payload, expected {expected} bytes")]
    WidthMismatch {
        kind: ValueKind,
        expected: usize,
        actual: usize,
    },
}

/// A stored value tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    UInt32(u32),
    UInt64(u64),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bytes(_) => ValueKind::Bytes,
            Self::UInt32(_) => ValueKind::UInt32,
            Self::UInt64(_) => ValueKind::UInt64,
        }
    }

    /// Encodes the value into its stored payload.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Bytes(bytes) => bytes.clone(),
            Self::UInt32(v) => v.to_be_bytes().to_vec(),
            Self::UInt64(v) => v.to_be_bytes().to_vec(),
        }
    }

    /// Decodes a payload as a value of the given kind.
    pub fn decode(kind: ValueKind, bytes: &[u8]) -> Result<Self, CodecError> {
        match kind {
            ValueKind::Bytes => Ok(Self::Bytes(bytes.to_vec())),
            ValueKind::UInt32 => Ok(Self::UInt32(u32::from_be_bytes(fixed(kind, bytes)?))),
            ValueKind::UInt64 => Ok(Self::UInt64(u64::from_be_bytes(fixed(kind, bytes)?))),
        }
    }
}

fn fixed<const N: usize>(kind: ValueKind, bytes: &[u8]) -> Result<[u8; N], CodecError> {
    bytes.try_into().map_err(|_| CodecError::WidthMismatch {
        kind,
        expected: N,
        actual: bytes.len(),
    })
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for Vec<u8> {}
    impl Sealed for u32 {}
    impl Sealed for i32 {}
    impl Sealed for u64 {}
}

/// Types that can be written to and read from the store.
///
/// This trait is sealed, only the built-in kinds of [`Value`] are supported.
pub trait StoreValue: sealed::Sealed + Sized {
    const KIND: ValueKind;

    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;
}

impl StoreValue for Vec<u8> {
    const KIND: ValueKind = ValueKind::Bytes;

    fn encode(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bytes.to_vec())
    }
}

impl StoreValue for u32 {
    const KIND: ValueKind = ValueKind::UInt32;

    fn encode(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        fixed(Self::KIND, bytes).map(u32::from_be_bytes)
    }
}

/// Signed integers share the `u32` layout, the bit pattern is reinterpreted.
impl StoreValue for i32 {
    const KIND: ValueKind = ValueKind::UInt32;

    fn encode(&self) -> Vec<u8> {
        (*self as u32).encode()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        u32::decode(bytes).map(|v| v as i32)
    }
}

impl StoreValue for u64 {
    const KIND: ValueKind = ValueKind::UInt64;

    fn encode(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        fixed(Self::KIND, bytes).map(u64::from_be_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        assert_eq!(7u32.encode(), vec![0, 0, 0, 7]);
        assert_eq!(0x0102_0304u32.encode(), vec![1, 2, 3, 4]);
        assert_eq!(1u64.encode(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!((-1i32).encode(), vec![0xff; 4]);
        assert_eq!(i32::decode(&[0xff, 0xff, 0xff, 0xfe]).unwrap(), -2);
    }

    #[test]
    fn test_bytes_pass_through() {
        let payload = vec![0xde, 0xad, 0xbe, 0xef, 0x00];
        assert_eq!(payload.encode(), payload);
        assert_eq!(Vec::<u8>::decode(&payload).unwrap(), payload);
        assert_eq!(Vec::<u8>::decode(&[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_wrong_width_is_an_error() {
        assert_eq!(
            u32::decode(&[1, 2, 3]),
            Err(CodecError::WidthMismatch {
                kind: ValueKind::UInt32,
                expected: 4,
                actual: 3
            })
        );
        assert!(u64::decode(&[0; 4]).is_err());
        assert!(Value::decode(ValueKind::UInt64, &[0; 9]).is_err());
    }

    #[test]
    fn test_tagged_value_matches_typed_codec() {
        let value = Value::decode(ValueKind::UInt32, &42u32.encode()).unwrap();
        assert_eq!(value, Value::UInt32(42));
        assert_eq!(value.kind(), ValueKind::UInt32);
        assert_eq!(value.encode(), 42u32.encode());
        assert_eq!(ValueKind::UInt64.width(), Some(8));
        assert_eq!(ValueKind::Bytes.width(), None);
    }
}
