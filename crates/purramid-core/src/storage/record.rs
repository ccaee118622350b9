//! Flat key/value records.
//!
//! A [`Record`] is the durable shape of one instance. Fields are scalar; list
//! valued state is carried as a JSON text sub-document under a single key and
//! decoded by the owning feature's mapping functions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::feature::FeatureType;

/// One scalar column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Int(i64),
    Real(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl FieldValue {
    /// Tag written to the `kind` column of the SQLite store.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Int(_) => "int",
            FieldValue::Real(_) => "real",
            FieldValue::Bool(_) => "bool",
            FieldValue::Text(_) => "text",
            FieldValue::Null => "null",
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Real(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Durable representation of one instance's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub feature: FeatureType,
    pub instance_id: u32,
    pub schema_version: u32,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(feature: FeatureType, instance_id: u32, schema_version: u32) -> Self {
        Self {
            feature,
            instance_id,
            schema_version,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insert.
    pub fn with(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Serialize `value` as a JSON sub-document under `key`.
    pub fn with_json<T: Serialize>(self, key: &str, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => self.with(key, json),
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to encode sub-document, storing null");
                self.with(key, FieldValue::Null)
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.fields.get(key)? {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Bool(v) => Some(i64::from(*v)),
            FieldValue::Real(v) if v.is_finite() => Some(*v as i64),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn u32(&self, key: &str) -> Option<u32> {
        self.int(key).and_then(|v| u32::try_from(v).ok())
    }

    pub fn i32(&self, key: &str) -> Option<i32> {
        self.int(key).and_then(|v| i32::try_from(v).ok())
    }

    /// Negative stored values clamp to zero.
    pub fn u64(&self, key: &str) -> Option<u64> {
        self.int(key).map(|v| v.max(0) as u64)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.fields.get(key)? {
            FieldValue::Bool(v) => Some(*v),
            FieldValue::Int(v) => Some(*v != 0),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.fields.get(key)? {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Decode a JSON sub-document.
    ///
    /// Missing or null fields yield `None` silently; malformed ones are logged
    /// and also yield `None` so callers can fall back to a default.
    pub fn json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.text(key)?;
        match serde_json::from_str(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(
                    feature = %self.feature,
                    instance_id = self.instance_id,
                    key,
                    error = %e,
                    "malformed sub-document in record, using default"
                );
                None
            }
        }
    }
}
