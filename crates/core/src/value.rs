//! Property values
//!
//! This module defines:
//! - PropertyValue: the scalar types a node or relationship property may hold
//! - Properties: the ordered key/value map carried by every graph entity
//!
//! ## Type Rules
//!
//! - There is no null: removing a property is how a value is cleared
//! - No implicit coercions: `Int(1) != Float(1.0)`
//! - `Bytes` are not `String`
//! - Float equality follows IEEE-754: `NaN != NaN`, `-0.0 == 0.0`
//!
//! Index lookups need a total, hashable key, so every value also has a
//! canonical [`PropertyValue::index_key`] encoding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property map of a node or relationship
pub type Properties = BTreeMap<String, PropertyValue>;

/// Value of a single property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point (IEEE-754)
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a == b,
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a == b,
            (PropertyValue::Float(a), PropertyValue::Float(b)) => a == b,
            (PropertyValue::String(a), PropertyValue::String(b)) => a == b,
            (PropertyValue::Bytes(a), PropertyValue::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl PropertyValue {
    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "Bool",
            PropertyValue::Int(_) => "Int",
            PropertyValue::Float(_) => "Float",
            PropertyValue::String(_) => "String",
            PropertyValue::Bytes(_) => "Bytes",
        }
    }

    /// Canonical key used by index entries
    ///
    /// Type-prefixed so that `Int(1)` and `String("1")` never collide.
    /// `-0.0` is folded into `0.0` to agree with float equality.
    pub fn index_key(&self) -> String {
        match self {
            PropertyValue::Bool(b) => format!("b:{}", b),
            PropertyValue::Int(i) => format!("i:{}", i),
            PropertyValue::Float(f) => {
                let f = if *f == 0.0 { 0.0f64 } else { *f };
                format!("f:{:016x}", f.to_bits())
            }
            PropertyValue::String(s) => format!("s:{}", s),
            PropertyValue::Bytes(b) => {
                let mut key = String::with_capacity(2 + b.len() * 2);
                key.push_str("x:");
                for byte in b {
                    key.push_str(&format!("{:02x}", byte));
                }
                key
            }
        }
    }

    /// Returns the string payload, if this is a `String`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an `Int`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Float(x) => write!(f, "{}", x),
            PropertyValue::String(s) => write!(f, "{:?}", s),
            PropertyValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<i32> for PropertyValue {
    fn from(i: i32) -> Self {
        PropertyValue::Int(i as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(f: f64) -> Self {
        PropertyValue::Float(f)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(b: Vec<u8>) -> Self {
        PropertyValue::Bytes(b)
    }
}
