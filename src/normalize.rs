//! # Value Normalization
//!
//! Canonicalizes raw record values before they are written to the template.
//!
//! ## Rules
//!
//! Applied in order:
//!
//! 1. Empty, whitespace-only or missing values become `"N/A"`
//! 2. Anything whose trimmed, case-folded form is `"n/a"` becomes `"N/A"`
//! 3. Everything else is written as its trimmed string form
//!
//! [`normalize`] is total and pure, so workers can share it freely.
//!
//! ## Example
//!
//! ```
//! use cellfill::normalize::{normalize, FieldValue};
//!
//! assert_eq!(normalize(&FieldValue::from("  42 ")), "42");
//! assert_eq!(normalize(&FieldValue::from("n/A ")), "N/A");
//! assert_eq!(normalize(&FieldValue::Missing), "N/A");
//! assert_eq!(normalize(&FieldValue::Number(7.0)), "7");
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Canonical sentinel for blank or missing values.
pub const NOT_AVAILABLE: &str = "N/A";

/// A single scalar value in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// Null, absent, or otherwise unrepresentable.
    Missing,
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<&serde_json::Value> for FieldValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Missing),
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            // Nested structures have no cell representation
            _ => FieldValue::Missing,
        }
    }
}

/// Normalize a raw value to the string written into a cell.
pub fn normalize(value: &FieldValue) -> String {
    let text = match value {
        FieldValue::Missing => return NOT_AVAILABLE.to_string(),
        FieldValue::Number(n) if !n.is_finite() => return NOT_AVAILABLE.to_string(),
        FieldValue::Number(n) => format_number(*n),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Text(s) => s.clone(),
    };

    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a") {
        return NOT_AVAILABLE.to_string();
    }
    trimmed.to_string()
}

/// Returns true if the value normalizes to the sentinel.
pub fn is_not_available(value: &FieldValue) -> bool {
    normalize(value) == NOT_AVAILABLE
}

/// Integral floats print without a fractional part ("42", not "42.0").
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// The flat, ordered key/value input driving one generation request.
///
/// Immutable once built. Lookups of absent keys yield [`FieldValue::Missing`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, FieldValue)>,
    index: HashMap<String, usize>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. A repeated key replaces the earlier value in place.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key.into(), value.into());
        self
    }

    fn insert(&mut self, key: String, value: FieldValue) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> &FieldValue {
        self.index
            .get(key)
            .map(|&i| &self.entries[i].1)
            .unwrap_or(&FieldValue::Missing)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), FieldValue::from(v)))
            .collect())
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            match v {
                FieldValue::Text(s) => map.serialize_entry(k, s)?,
                FieldValue::Number(n) => map.serialize_entry(k, n)?,
                FieldValue::Bool(b) => map.serialize_entry(k, b)?,
                FieldValue::Missing => map.serialize_entry(k, &Option::<()>::None)?,
            }
        }
        map.end()
    }
}
