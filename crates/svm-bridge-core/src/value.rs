//! Host import values and their wire format.
//!
//! Arguments and results of host imports cross the native boundary as
//! buffers. Signatures are one tag byte per type. A value sequence is a
//! one-byte count followed by `tag, payload` pairs with big-endian payloads.

use std::fmt;

use crate::error::{ValueError, ValueResult};

/// A WebAssembly value type accepted by host imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
}

impl ValueType {
    const I32_TAG: u8 = 0x00;
    const I64_TAG: u8 = 0x01;

    /// Wire tag for this type.
    pub fn tag(self) -> u8 {
        match self {
            Self::I32 => Self::I32_TAG,
            Self::I64 => Self::I64_TAG,
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> ValueResult<Self> {
        match tag {
            Self::I32_TAG => Ok(Self::I32),
            Self::I64_TAG => Ok(Self::I64),
            other => Err(ValueError::UnknownType(other)),
        }
    }

    fn payload_len(self) -> usize {
        match self {
            Self::I32 => 4,
            Self::I64 => 8,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
        }
    }
}

/// A host import argument or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
}

impl Value {
    /// The type of this value.
    pub fn ty(&self) -> ValueType {
        match self {
            Self::I32(_) => ValueType::I32,
            Self::I64(_) => ValueType::I64,
        }
    }

    /// The value as an `i32`, if it is one.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            Self::I64(_) => None,
        }
    }

    /// The value as an `i64`, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            Self::I32(_) => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "i32:{v}"),
            Self::I64(v) => write!(f, "i64:{v}"),
        }
    }
}

/// Encode a signature.
pub fn encode_types(types: &[ValueType]) -> Vec<u8> {
    types.iter().map(|ty| ty.tag()).collect()
}

/// Decode a signature.
pub fn decode_types(bytes: &[u8]) -> ValueResult<Vec<ValueType>> {
    bytes.iter().map(|tag| ValueType::from_tag(*tag)).collect()
}

/// Encode a value sequence.
///
/// # Errors
///
/// Returns [`ValueError::TooMany`] for more than 255 values.
pub fn encode_values(values: &[Value]) -> ValueResult<Vec<u8>> {
    let count = u8::try_from(values.len()).map_err(|_| ValueError::TooMany(values.len()))?;

    let mut out = Vec::with_capacity(1 + values.len() * 9);
    out.push(count);
    for value in values {
        out.push(value.ty().tag());
        match value {
            Value::I32(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::I64(v) => out.extend_from_slice(&v.to_be_bytes()),
        }
    }
    Ok(out)
}

/// Decode a value sequence.
pub fn decode_values(bytes: &[u8]) -> ValueResult<Vec<Value>> {
    let (&count, mut rest) = bytes
        .split_first()
        .ok_or(ValueError::Truncated { needed: 1 })?;

    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (&tag, tail) = rest
            .split_first()
            .ok_or(ValueError::Truncated { needed: 1 })?;
        let ty = ValueType::from_tag(tag)?;
        let len = ty.payload_len();
        if tail.len() < len {
            return Err(ValueError::Truncated {
                needed: len - tail.len(),
            });
        }
        let (payload, tail) = tail.split_at(len);

        let value = match ty {
            ValueType::I32 => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(payload);
                Value::I32(i32::from_be_bytes(buf))
            }
            ValueType::I64 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(payload);
                Value::I64(i64::from_be_bytes(buf))
            }
        };
        values.push(value);
        rest = tail;
    }

    if !rest.is_empty() {
        return Err(ValueError::TrailingBytes(rest.len()));
    }
    Ok(values)
}

/// Check that `values` match `signature` exactly.
pub fn matches_signature(values: &[Value], signature: &[ValueType]) -> bool {
    values.len() == signature.len() && values.iter().zip(signature).all(|(v, ty)| v.ty() == *ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_types_encoding() {
        let types = vec![ValueType::I32, ValueType::I64, ValueType::I32];
        let encoded = encode_types(&types);
        assert_eq!(encoded, vec![0, 1, 0]);
        assert_eq!(decode_types(&encoded).unwrap(), types);
        assert_eq!(decode_types(&[7]), Err(ValueError::UnknownType(7)));
    }

    #[test]
    fn test_values_layout() {
        let encoded = encode_values(&[Value::I32(3), Value::I64(-1)]).unwrap();
        assert_eq!(
            encoded,
            vec![2, 0, 0, 0, 0, 3, 1, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(
            decode_values(&encoded).unwrap(),
            vec![Value::I32(3), Value::I64(-1)]
        );
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(encode_values(&[]).unwrap(), vec![0]);
        assert!(decode_values(&[0]).unwrap().is_empty());
        assert_eq!(decode_values(&[]), Err(ValueError::Truncated { needed: 1 }));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(
            decode_values(&[1, 0, 0, 0]),
            Err(ValueError::Truncated { needed: 2 })
        );
        assert_eq!(decode_values(&[1, 9, 0, 0, 0, 0]), Err(ValueError::UnknownType(9)));
        assert_eq!(
            decode_values(&[1, 0, 0, 0, 0, 1, 0xaa]),
            Err(ValueError::TrailingBytes(1))
        );
        assert_eq!(decode_values(&[2, 0, 0, 0, 0, 1]), Err(ValueError::Truncated { needed: 1 }));
    }

    #[test]
    fn test_too_many_values() {
        let values = vec![Value::I32(0); 256];
        assert_eq!(encode_values(&values), Err(ValueError::TooMany(256)));
    }

    #[test]
    fn test_matches_signature() {
        let sig = [ValueType::I32, ValueType::I32];
        assert!(matches_signature(&[Value::I32(1), Value::I32(2)], &sig));
        assert!(!matches_signature(&[Value::I32(1)], &sig));
        assert!(!matches_signature(&[Value::I32(1), Value::I64(2)], &sig));
    }
}
