//! Row encoding.
//!
//! Rows are stored as JSON objects so that cascades and the unique index can
//! work on field names without knowing the row type.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

/// Encode a typed row into a JSON object.
pub fn encode_row<T: Serialize>(row: &T) -> Result<Value, Error> {
    let value = serde_json::to_value(row).map_err(|e| Error::Serialization(e.to_string()))?;
    if !value.is_object() {
        return Err(Error::Serialization("row must encode to an object".to_string()));
    }
    Ok(value)
}

/// Decode a JSON object into a typed row.
pub fn decode_row<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Read a field as a string for indexing and reference checks.
///
/// Null and missing fields yield `None`; non-string scalars use their JSON text.
pub fn field_str(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub(crate) fn to_bytes(value: &Value) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Value, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}
