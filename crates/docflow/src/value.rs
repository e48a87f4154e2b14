//! Runtime values held by cells.
//!
//! Aggregates are `Arc`-wrapped so cloning a cached value is O(1).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Value of a cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<IndexMap<String, Value>>),
    /// Result of a numeric or domain failure inside a definition.
    Invalid,
}

/// Coarse kind of a value, used when expansion only cares about the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    Text,
    Array,
    Object,
    Invalid,
}

/// Kind plus array length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueShape {
    Scalar(ValueKind),
    Array(usize),
}

impl Value {
    /// NaN collapses to `Invalid` so equality stays reflexive.
    pub fn number(v: f64) -> Self {
        if v.is_nan() {
            Value::Invalid
        } else {
            Value::Number(v)
        }
    }

    pub fn bool(v: bool) -> Self {
        Value::Bool(v)
    }

    pub fn text(v: impl Into<String>) -> Self {
        Value::Text(v.into().into())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Arc::new(items.into_iter().collect()))
    }

    pub fn object(fields: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        Value::Object(Arc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::Text(_) => ValueKind::Text,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
            Value::Invalid => ValueKind::Invalid,
        }
    }

    pub fn shape(&self) -> ValueShape {
        match self {
            Value::Array(items) => ValueShape::Array(items.len()),
            other => ValueShape::Scalar(other.kind()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields.as_ref()),
            _ => None,
        }
    }

    /// Non-negative integer view, for sizes and indices.
    pub fn as_count(&self) -> Option<usize> {
        match self {
            Value::Number(v) if v.is_finite() && *v >= 0.0 => Some(v.floor() as usize),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid)
    }

    /// Text rendering used when values are concatenated into text.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Number(v) => {
                if v.is_infinite() {
                    f.write_str(if *v > 0.0 { "∞" } else { "-∞" })
                } else {
                    write!(f, "{v}")
                }
            }
            Value::Text(v) => f.write_str(v),
            Value::Array(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Value::Object(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Invalid => f.write_str("NaN"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v.into())
    }
}

/// Desired value handed to an inverse definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Desired {
    Value(Value),
    /// Per-key updates of an array, keys are 0-based.
    Entries(IndexMap<usize, Value>),
}

impl Desired {
    pub fn entry(index: usize, value: Value) -> Self {
        let mut entries = IndexMap::new();
        entries.insert(index, value);
        Desired::Entries(entries)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Desired::Value(v) => Some(v),
            Desired::Entries(_) => None,
        }
    }

    /// Per-key view; a whole array value becomes one entry per item.
    pub fn to_entries(&self) -> Option<IndexMap<usize, Value>> {
        match self {
            Desired::Entries(entries) => Some(entries.clone()),
            Desired::Value(Value::Array(items)) => {
                Some(items.iter().cloned().enumerate().collect())
            }
            Desired::Value(_) => None,
        }
    }
}

impl From<Value> for Desired {
    fn from(v: Value) -> Self {
        Desired::Value(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_collapses_to_invalid() {
        assert_eq!(Value::number(f64::NAN), Value::Invalid);
        assert_eq!(Value::number(0.0 / 0.0).kind(), ValueKind::Invalid);
        assert_eq!(Value::number(2.5), Value::Number(2.5));
    }

    #[test]
    fn display_formats_aggregates() {
        let v = Value::array([Value::Number(1.0), Value::Number(2.5)]);
        assert_eq!(v.to_string(), "(1, 2.5)");
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn desired_entries_from_array() {
        let desired = Desired::Value(Value::array([Value::from(1), Value::from(2)]));
        let entries = desired.to_entries().unwrap();
        assert_eq!(entries.get(&1), Some(&Value::Number(2.0)));
        assert!(Desired::Value(Value::from(1)).to_entries().is_none());
    }
}
