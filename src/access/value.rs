use crate::storage::error::{StorageError, StorageResult};
use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of bytes a `Varchar` value may occupy.
pub const STRING_LEN: usize = 128;

/// Data types supported by the database. Every type has a fixed on-page width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Varchar,
}

impl DataType {
    /// Number of bytes a value of this type occupies in a slot.
    pub fn width(&self) -> usize {
        match self {
            DataType::Boolean => 1,
            DataType::Int32 => 4,
            // Length prefix followed by the zero-padded bytes.
            DataType::Varchar => 4 + STRING_LEN,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Int32 => write!(f, "INT"),
            DataType::Varchar => write!(f, "VARCHAR({})", STRING_LEN),
        }
    }
}

/// Values that can be stored in the database
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Boolean(bool),
    Int32(i32),
    String(String),
}

impl Value {
    /// Get the data type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Int32(_) => DataType::Int32,
            Value::String(_) => DataType::Varchar,
        }
    }

    /// Check if this value is compatible with the given data type
    pub fn is_compatible_with(&self, data_type: DataType) -> bool {
        self.data_type() == data_type
    }

    /// Writes this value into `buf`, which must be exactly
    /// `self.data_type().width()` bytes long.
    pub fn encode_into(&self, buf: &mut [u8]) -> StorageResult<()> {
        debug_assert_eq!(buf.len(), self.data_type().width());
        match self {
            Value::Boolean(b) => buf[0] = u8::from(*b),
            Value::Int32(i) => BigEndian::write_i32(buf, *i),
            Value::String(s) => {
                let bytes = s.as_bytes();
                if bytes.len() > STRING_LEN {
                    return Err(StorageError::SchemaMismatch(format!(
                        "string of {} bytes exceeds the {}-byte limit",
                        bytes.len(),
                        STRING_LEN
                    )));
                }
                BigEndian::write_u32(&mut buf[..4], bytes.len() as u32);
                buf[4..4 + bytes.len()].copy_from_slice(bytes);
                buf[4 + bytes.len()..].fill(0);
            }
        }
        Ok(())
    }

    /// Reads a value of type `data_type` from `buf`.
    pub fn decode(data_type: DataType, buf: &[u8]) -> StorageResult<Self> {
        debug_assert_eq!(buf.len(), data_type.width());
        match data_type {
            DataType::Boolean => Ok(Value::Boolean(buf[0] != 0)),
            DataType::Int32 => Ok(Value::Int32(BigEndian::read_i32(buf))),
            DataType::Varchar => {
                let len = BigEndian::read_u32(&buf[..4]) as usize;
                if len > STRING_LEN {
                    return Err(StorageError::SchemaMismatch(format!(
                        "stored string length {} exceeds the {}-byte limit",
                        len, STRING_LEN
                    )));
                }
                let s = String::from_utf8(buf[4..4 + len].to_vec())
                    .map_err(|e| StorageError::SchemaMismatch(e.to_string()))?;
                Ok(Value::String(s))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int32(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        assert_eq!(DataType::Boolean.width(), 1);
        assert_eq!(DataType::Int32.width(), 4);
        assert_eq!(DataType::Varchar.width(), 132);
    }

    #[test]
    fn test_value_compatibility() {
        assert!(Value::Boolean(true).is_compatible_with(DataType::Boolean));
        assert!(Value::Int32(42).is_compatible_with(DataType::Int32));
        assert!(Value::String("hello".to_string()).is_compatible_with(DataType::Varchar));

        assert!(!Value::Boolean(true).is_compatible_with(DataType::Int32));
        assert!(!Value::Int32(42).is_compatible_with(DataType::Varchar));
    }

    #[test]
    fn test_int_is_big_endian() -> StorageResult<()> {
        let mut buf = [0u8; 4];
        Value::Int32(0x0A0B_0C0D).encode_into(&mut buf)?;
        assert_eq!(buf, [0x0A, 0x0B, 0x0C, 0x0D]);
        assert_eq!(Value::decode(DataType::Int32, &buf)?, Value::Int32(0x0A0B_0C0D));
        Ok(())
    }

    #[test]
    fn test_string_is_padded() -> StorageResult<()> {
        let mut buf = vec![0xEEu8; DataType::Varchar.width()];
        Value::String("abc".to_string()).encode_into(&mut buf)?;
        assert_eq!(&buf[..7], &[0, 0, 0, 3, b'a', b'b', b'c']);
        assert!(buf[7..].iter().all(|&b| b == 0));
        assert_eq!(
            Value::decode(DataType::Varchar, &buf)?,
            Value::String("abc".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_string_too_long() {
        let mut buf = vec![0u8; DataType::Varchar.width()];
        let long = Value::String("x".repeat(STRING_LEN + 1));
        assert!(matches!(
            long.encode_into(&mut buf),
            Err(StorageError::SchemaMismatch(_))
        ));

        let exact = Value::String("x".repeat(STRING_LEN));
        assert!(exact.encode_into(&mut buf).is_ok());
    }

    #[test]
    fn test_corrupt_string_length() {
        let mut buf = vec![0u8; DataType::Varchar.width()];
        BigEndian::write_u32(&mut buf[..4], 500);
        assert!(Value::decode(DataType::Varchar, &buf).is_err());
    }
}
