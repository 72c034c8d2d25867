//! Typed data values stored in user and global key records.
//!
//! The server stores every value next to a `data_type` tag. `DataValue` pairs
//! the two so callers never juggle an untyped JSON value and a tag separately.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire tag describing how a stored value should be interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Null,
    Boolean,
    Number,
    String,
    Json,
    Xml,
    DateTime,
    Bytes,
    Object,
}

impl DataType {
    /// Wire string for this tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::DateTime => "datetime",
            Self::Bytes => "bytes",
            Self::Object => "object",
        }
    }
}

/// Error returned when a wire value does not match its tag.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("expected {expected} value, found {found}")]
    Mismatch { expected: &'static str, found: Value },
    #[error("invalid base64 bytes: {0}")]
    Bytes(#[from] base64::DecodeError),
}

/// A stored value together with its type tag.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Json(Value),
    Xml(String),
    /// Milliseconds since the Unix epoch.
    DateTime(f64),
    Bytes(Vec<u8>),
    Object(Map<String, Value>),
}

impl DataValue {
    /// Tag for this value.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean(_) => DataType::Boolean,
            Self::Number(_) => DataType::Number,
            Self::String(_) => DataType::String,
            Self::Json(_) => DataType::Json,
            Self::Xml(_) => DataType::Xml,
            Self::DateTime(_) => DataType::DateTime,
            Self::Bytes(_) => DataType::Bytes,
            Self::Object(_) => DataType::Object,
        }
    }

    /// Split into the untyped wire value and its tag.
    #[must_use]
    pub fn to_wire(&self) -> (Value, DataType) {
        let value = match self {
            Self::Null => Value::Null,
            Self::Boolean(v) => Value::Bool(*v),
            Self::Number(v) | Self::DateTime(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
            Self::String(v) | Self::Xml(v) => Value::String(v.clone()),
            Self::Json(v) => v.clone(),
            Self::Bytes(v) => Value::String(BASE64.encode(v)),
            Self::Object(v) => Value::Object(v.clone()),
        };
        (value, self.data_type())
    }

    /// Rebuild a typed value from a wire value and its tag.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Mismatch`] when the JSON shape does not fit the
    /// tag, and [`ValueError::Bytes`] for malformed base64.
    pub fn from_wire(value: Value, data_type: DataType) -> Result<Self, ValueError> {
        match (data_type, value) {
            (DataType::Null, _) => Ok(Self::Null),
            (DataType::Json, v) => Ok(Self::Json(v)),
            (DataType::Boolean, Value::Bool(v)) => Ok(Self::Boolean(v)),
            (DataType::Number, Value::Number(n)) => Ok(Self::Number(n.as_f64().unwrap_or(0.0))),
            (DataType::DateTime, Value::Number(n)) => Ok(Self::DateTime(n.as_f64().unwrap_or(0.0))),
            (DataType::String, Value::String(s)) => Ok(Self::String(s)),
            (DataType::Xml, Value::String(s)) => Ok(Self::Xml(s)),
            (DataType::Bytes, Value::String(s)) => Ok(Self::Bytes(BASE64.decode(s)?)),
            (DataType::Object, Value::Object(m)) => Ok(Self::Object(m)),
            (expected, found) => Err(ValueError::Mismatch { expected: expected.as_str(), found }),
        }
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

#[cfg(test)]
#[path = "value_test.rs"]
mod tests;
