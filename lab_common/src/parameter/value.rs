//! Typed configuration values.

use crate::error::ParameterError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single configuration value supplied for a parameter.
///
/// Deserializes untagged, so TOML `true`, `3`, `2.5` and `"abc"` map to
/// `Bool`, `Int`, `Float` and `Str` respectively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Text.
    Str(String),
}

/// The kind of a [`Value`], used as the target of [`coerce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `true` / `false`
    Bool,
    /// Signed integer
    Int,
    /// Floating point
    Float,
    /// Text
    Str,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Str => write!(f, "string"),
        }
    }
}

impl Value {
    /// Kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
        }
    }

    /// Integer payload.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric payload, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Parse a raw string into a value of `kind`.
///
/// Surrounding whitespace is ignored for every kind except `Str`, which is
/// taken verbatim.
///
/// # Errors
///
/// `ParameterError::Unparseable` naming `parameter` and the raw input.
pub fn coerce(parameter: &str, raw: &str, kind: ValueKind) -> Result<Value, ParameterError> {
    let trimmed = raw.trim();
    let parsed = match kind {
        ValueKind::Str => Some(Value::Str(raw.to_string())),
        ValueKind::Bool => trimmed.to_ascii_lowercase().parse::<bool>().ok().map(Value::Bool),
        ValueKind::Int => trimmed.parse::<i64>().ok().map(Value::Int),
        ValueKind::Float => trimmed.parse::<f64>().ok().map(Value::Float),
    };
    parsed.ok_or_else(|| ParameterError::Unparseable {
        name: parameter.to_string(),
        input: raw.to_string(),
        expected: kind.to_string(),
    })
}
