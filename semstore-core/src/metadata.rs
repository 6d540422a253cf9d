//! Document metadata.
//!
//! Metadata is an open string-keyed map of scalar values. The store treats it
//! as opaque apart from encoding it into a single JSON string column on write
//! and decoding it again on read. Predicates can address individual keys via
//! `metadata.<key>`.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Key written by the store on every insert.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// A scalar metadata value.
///
/// Serialized untagged, so a stored metadata column reads as a plain JSON
/// object: `{"symbol":"AAPL","year":2024,"active":true,"note":null}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    /// Returns the value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as f64 if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the value as i64 if it is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as bool if it is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }

    /// Converts a JSON value, rejecting arrays, objects and numbers that do
    /// not fit the scalar model.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(MetadataValue::Null),
            Value::Bool(b) => Ok(MetadataValue::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(MetadataValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(MetadataValue::Float(f))
                } else {
                    Err(Error::InvalidInput(format!("unsupported number: {}", n)))
                }
            }
            Value::String(s) => Ok(MetadataValue::String(s)),
            other => Err(Error::InvalidInput(format!(
                "metadata values must be scalar or null, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Null => write!(f, "null"),
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        MetadataValue::Int(v as i64)
    }
}

impl From<u32> for MetadataValue {
    fn from(v: u32) -> Self {
        MetadataValue::Int(v as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(MetadataValue::Null)
    }
}

/// Metadata attached to a document.
///
/// # Example
///
/// ```
/// use semstore_core::Metadata;
///
/// let metadata = Metadata::new()
///     .with_field("symbol", "AAPL")
///     .with_field("data_type", "profile")
///     .with_field("year", 2024);
///
/// let encoded = metadata.encode().unwrap();
/// assert_eq!(Metadata::decode(&encoded).unwrap(), metadata);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    data: HashMap<String, MetadataValue>,
}

impl Metadata {
    /// Creates empty metadata.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Creates metadata from a HashMap.
    #[inline]
    pub fn from_map(data: HashMap<String, MetadataValue>) -> Self {
        Self { data }
    }

    /// Converts a JSON object into metadata. Anything but an object of
    /// scalars is an input error.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let mut data = HashMap::with_capacity(map.len());
                for (key, value) in map {
                    data.insert(key, MetadataValue::from_json(value)?);
                }
                let metadata = Self { data };
                metadata.validate()?;
                Ok(metadata)
            }
            other => Err(Error::InvalidInput(format!(
                "metadata must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Adds a field. Chainable.
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<MetadataValue>,
    {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Sets a field value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<MetadataValue>,
    {
        self.data.insert(key.into(), value.into());
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.data.get(key)
    }

    #[inline]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    #[inline]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_i64())
    }

    #[inline]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(|v| v.as_f64())
    }

    #[inline]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_bool())
    }

    /// Removes a field and returns its value if present.
    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<MetadataValue> {
        self.data.remove(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.data.iter()
    }

    #[inline]
    pub fn into_inner(self) -> HashMap<String, MetadataValue> {
        self.data
    }

    /// Rejects values that cannot survive an encode/decode cycle.
    ///
    /// JSON has no representation for NaN or infinities; serde_json would
    /// silently write them as `null`.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in &self.data {
            if let MetadataValue::Float(f) = value {
                if !f.is_finite() {
                    return Err(Error::InvalidInput(format!(
                        "metadata field '{}' is not a finite number",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    /// Encodes the metadata into its stored string form.
    pub fn encode(&self) -> Result<String> {
        self.validate()?;
        serde_json::to_string(self)
            .map_err(|e| Error::InvalidInput(format!("metadata serialization failed: {}", e)))
    }

    /// Decodes the stored string form.
    pub fn decode(encoded: &str) -> Result<Self> {
        serde_json::from_str(encoded)
            .map_err(|e| Error::IoError(format!("metadata deserialization failed: {}", e)))
    }
}

impl FromIterator<(String, MetadataValue)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, MetadataValue)>>(iter: T) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_with_field() {
        let m = Metadata::new()
            .with_field("name", "test")
            .with_field("count", 42);

        assert_eq!(m.len(), 2);
        assert_eq!(m.get_str("name"), Some("test"));
        assert_eq!(m.get_i64("count"), Some(42));
    }

    #[test]
    fn test_metadata_get_typed() {
        let m = Metadata::new()
            .with_field("str_field", "hello")
            .with_field("int_field", 123)
            .with_field("float_field", 3.14)
            .with_field("bool_field", true)
            .with_field("null_field", Option::<i64>::None);

        assert_eq!(m.get_str("str_field"), Some("hello"));
        assert_eq!(m.get_i64("int_field"), Some(123));
        assert!((m.get_f64("float_field").unwrap() - 3.14).abs() < 1e-10);
        assert_eq!(m.get_bool("bool_field"), Some(true));
        assert!(m.get("null_field").unwrap().is_null());
    }

    #[test]
    fn test_encode_is_plain_json_object() {
        let m = Metadata::new().with_field("symbol", "AAPL");
        assert_eq!(m.encode().unwrap(), r#"{"symbol":"AAPL"}"#);
    }

    #[test]
    fn test_roundtrip_keeps_int_and_float_apart() {
        let m = Metadata::new()
            .with_field("int", 2024)
            .with_field("whole_float", 2024.0)
            .with_field("frac", 0.25)
            .with_field("none", MetadataValue::Null);

        let decoded = Metadata::decode(&m.encode().unwrap()).unwrap();
        assert_eq!(decoded, m);
        assert_eq!(decoded.get("int"), Some(&MetadataValue::Int(2024)));
        assert_eq!(
            decoded.get("whole_float"),
            Some(&MetadataValue::Float(2024.0))
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        let m = Metadata::new().with_field("bad", f64::NAN);
        assert!(m.encode().is_err());
    }

    #[test]
    fn test_from_json_rejects_nested() {
        let err = Metadata::from_json(serde_json::json!({"tags": ["a", "b"]})).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = Metadata::from_json(serde_json::json!("not an object")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let ok = Metadata::from_json(serde_json::json!({"a": 1, "b": null})).unwrap();
        assert_eq!(ok.get_i64("a"), Some(1));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Metadata::decode("{not json").is_err());
        assert!(Metadata::decode(r#"{"nested":{"x":1}}"#).is_err());
    }
}
