//! Table schemas: ordered, named, fixed-width fields.

use crate::access::value::{DataType, Value, STRING_LEN};
use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// The ordered field list of a table. Two schemas are equal when their field
/// types match position by position; names do not take part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// A schema of anonymous fields.
    pub fn from_types(types: &[DataType]) -> Self {
        Self::new(types.iter().map(|&t| Field::new("", t)).collect())
    }

    /// Concatenates the fields of `left` and `right`.
    pub fn merge(left: &Schema, right: &Schema) -> Self {
        let mut fields = left.fields.clone();
        fields.extend(right.fields.iter().cloned());
        Self::new(fields)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Index of the first field named `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Byte width of one encoded tuple.
    pub fn width(&self) -> usize {
        self.fields.iter().map(|f| f.data_type.width()).sum()
    }

    /// Encodes `values` field by field into `buf` (exactly `width()` bytes).
    pub fn encode(&self, values: &[Value], buf: &mut [u8]) -> StorageResult<()> {
        self.check(values)?;
        debug_assert_eq!(buf.len(), self.width());

        let mut offset = 0;
        for (value, field) in values.iter().zip(&self.fields) {
            let width = field.data_type.width();
            value.encode_into(&mut buf[offset..offset + width])?;
            offset += width;
        }
        Ok(())
    }

    pub fn decode(&self, buf: &[u8]) -> StorageResult<Vec<Value>> {
        if buf.len() != self.width() {
            return Err(StorageError::SchemaMismatch(format!(
                "expected {} bytes, got {}",
                self.width(),
                buf.len()
            )));
        }

        let mut offset = 0;
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let width = field.data_type.width();
            values.push(Value::decode(field.data_type, &buf[offset..offset + width])?);
            offset += width;
        }
        Ok(values)
    }

    /// Validates arity and per-field types of `values`.
    pub fn check(&self, values: &[Value]) -> StorageResult<()> {
        if values.len() != self.fields.len() {
            return Err(StorageError::SchemaMismatch(format!(
                "value count {} doesn't match schema length {}",
                values.len(),
                self.fields.len()
            )));
        }
        for (value, field) in values.iter().zip(&self.fields) {
            if !value.is_compatible_with(field.data_type) {
                return Err(StorageError::SchemaMismatch(format!(
                    "value {:?} is not compatible with type {}",
                    value, field.data_type
                )));
            }
            if let Value::String(s) = value {
                if s.len() > STRING_LEN {
                    return Err(StorageError::SchemaMismatch(format!(
                        "field '{}' holds {} bytes, more than {}",
                        field.name,
                        s.len(),
                        STRING_LEN
                    )));
                }
            }
        }
        Ok(())
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.data_type == b.data_type)
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("{}({})", field.name, field.data_type))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}
