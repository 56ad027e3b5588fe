//! Write payloads.

use serde_json::{Map, Value};

/// Value of one top-level field in a write.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// Store this value as-is (replaces the previous field value).
    Value(Value),
    /// Replaced by the backend's commit time.
    ServerTimestamp,
    /// Append the elements not already present in the stored array.
    ArrayUnion(Vec<Value>),
}

/// An ordered set of top-level field writes.
///
/// Merging is shallow: a field listed here replaces (or unions into) the
/// stored field of the same name; unlisted fields are left alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteData {
    fields: Vec<(String, FieldValue)>,
}

impl WriteData {
    /// Empty write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every entry of a JSON object as a plain value.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, FieldValue::Value(v)))
                .collect(),
        }
    }

    /// Add a plain value.
    #[must_use]
    pub fn set(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(key, FieldValue::Value(value.into()))
    }

    /// Add a server-timestamp sentinel.
    #[must_use]
    pub fn server_timestamp(self, key: impl Into<String>) -> Self {
        self.with(key, FieldValue::ServerTimestamp)
    }

    /// Add an array-union.
    #[must_use]
    pub fn array_union(self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(key, FieldValue::ArrayUnion(values))
    }

    fn with(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        let key = key.into();
        self.fields.retain(|(k, _)| *k != key);
        self.fields.push((key, value));
        self
    }

    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate the field writes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Look up one field write.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}
