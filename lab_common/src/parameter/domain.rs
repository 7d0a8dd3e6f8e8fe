//! Value domains: pure, total membership predicates.

use super::value::{coerce, Value, ValueKind};
use crate::error::ParameterError;
use regex::Regex;
use std::fmt;

// ─── StringDomain ───────────────────────────────────────────────────

/// Regular-expression domain with prefix-match semantics.
///
/// The pattern must match starting at the first character of the value but
/// need not consume all of it. Anchor with `$` for a full match.
#[derive(Clone)]
pub struct StringDomain {
    pattern: String,
    regex: Regex,
}

impl StringDomain {
    /// Compile `pattern` for the named parameter.
    ///
    /// # Errors
    ///
    /// `ParameterError::InvalidPattern` if the pattern does not compile.
    pub fn new(parameter: &str, pattern: &str) -> Result<Self, ParameterError> {
        let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|e| {
            ParameterError::InvalidPattern {
                name: parameter.to_string(),
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Pattern as declared.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Prefix match.
    pub fn matches(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

impl PartialEq for StringDomain {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl fmt::Debug for StringDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StringDomain").field(&self.pattern).finish()
    }
}

// ─── Domain ─────────────────────────────────────────────────────────

/// Set of values a parameter accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    /// Strings whose start matches a pattern.
    String(StringDomain),
    /// Integers within inclusive bounds. `None` is unbounded.
    Int {
        /// Lower bound.
        min: Option<i64>,
        /// Upper bound.
        max: Option<i64>,
    },
    /// Numbers within inclusive bounds. Integers are widened.
    Float {
        /// Lower bound.
        min: Option<f64>,
        /// Upper bound.
        max: Option<f64>,
    },
    /// Explicit allowed set.
    Options(Vec<Value>),
    /// Union of domains.
    Compound(Vec<Domain>),
}

impl Domain {
    /// String domain. Prefix semantics; see [`StringDomain`].
    pub fn string(pattern: &str) -> Result<Self, ParameterError> {
        StringDomain::new("", pattern).map(Self::String)
    }

    /// Integer domain with optional bounds.
    pub const fn int(min: Option<i64>, max: Option<i64>) -> Self {
        Self::Int { min, max }
    }

    /// Integer domain `[min, max]`.
    pub const fn int_range(min: i64, max: i64) -> Self {
        Self::Int {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Float domain with optional bounds.
    pub const fn float(min: Option<f64>, max: Option<f64>) -> Self {
        Self::Float { min, max }
    }

    /// Float domain `[min, max]`.
    pub const fn float_range(min: f64, max: f64) -> Self {
        Self::Float {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Option domain over `allowed`.
    pub fn options<I, V>(allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Options(allowed.into_iter().map(Into::into).collect())
    }

    /// Compound domain, true if any member is.
    pub fn compound(members: Vec<Domain>) -> Self {
        Self::Compound(members)
    }

    /// Membership test. Never panics; values of the wrong kind are rejected.
    pub fn validate(&self, value: &Value) -> bool {
        match self {
            Self::String(d) => value.as_str().is_some_and(|s| d.matches(s)),
            Self::Int { min, max } => match value {
                Value::Int(v) => min.is_none_or(|lo| *v >= lo) && max.is_none_or(|hi| *v <= hi),
                _ => false,
            },
            Self::Float { min, max } => match value {
                Value::Int(_) | Value::Float(_) => value.as_f64().is_some_and(|v| {
                    !v.is_nan()
                        && min.is_none_or(|lo| v >= lo)
                        && max.is_none_or(|hi| v <= hi)
                }),
                _ => false,
            },
            Self::Options(allowed) => allowed.iter().any(|a| option_eq(a, value)),
            Self::Compound(members) => members.iter().any(|d| d.validate(value)),
        }
    }

    /// Kinds a raw string may be coerced to for this domain, in trial order.
    pub fn accepted_kinds(&self) -> Vec<ValueKind> {
        let mut kinds = Vec::new();
        self.collect_kinds(&mut kinds);
        kinds
    }

    fn collect_kinds(&self, kinds: &mut Vec<ValueKind>) {
        match self {
            Self::String(_) => push_kind(kinds, ValueKind::Str),
            Self::Int { .. } => push_kind(kinds, ValueKind::Int),
            Self::Float { .. } => push_kind(kinds, ValueKind::Float),
            Self::Options(allowed) => allowed.iter().for_each(|v| push_kind(kinds, v.kind())),
            Self::Compound(members) => members.iter().for_each(|d| d.collect_kinds(kinds)),
        }
    }

    /// Coerce `raw` into the first accepted kind that parses and validates.
    ///
    /// # Errors
    ///
    /// - `ParameterError::Unparseable` if no accepted kind parses
    /// - `ParameterError::Invalid` if a parse succeeded but fell outside the domain
    pub fn parse(&self, parameter: &str, raw: &str) -> Result<Value, ParameterError> {
        let kinds = self.accepted_kinds();
        let mut parsed_any = false;
        for kind in &kinds {
            if let Ok(value) = coerce(parameter, raw, *kind) {
                parsed_any = true;
                if self.validate(&value) {
                    return Ok(value);
                }
            }
        }
        if parsed_any {
            Err(ParameterError::Invalid {
                name: parameter.to_string(),
                value: raw.to_string(),
            })
        } else {
            let expected: Vec<String> = kinds.iter().map(ToString::to_string).collect();
            Err(ParameterError::Unparseable {
                name: parameter.to_string(),
                input: raw.to_string(),
                expected: expected.join(" or "),
            })
        }
    }
}

fn push_kind(kinds: &mut Vec<ValueKind>, kind: ValueKind) {
    if !kinds.contains(&kind) {
        kinds.push(kind);
    }
}

// Option sets compare numbers across Int/Float so `[1, 2.5]` accepts `1.0`.
fn option_eq(allowed: &Value, value: &Value) -> bool {
    match (allowed, value) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        _ => allowed == value,
    }
}

// ─── Parameter ──────────────────────────────────────────────────────

/// A named, immutable parameter declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    domain: Domain,
}

impl Parameter {
    /// Declare a parameter.
    pub fn new(name: impl Into<String>, domain: Domain) -> Self {
        Self {
            name: name.into(),
            domain,
        }
    }

    /// Declare a string parameter, compiling its pattern.
    ///
    /// # Errors
    ///
    /// `ParameterError::InvalidPattern` naming this parameter.
    pub fn string(name: impl Into<String>, pattern: &str) -> Result<Self, ParameterError> {
        let name = name.into();
        let domain = Domain::String(StringDomain::new(&name, pattern)?);
        Ok(Self { name, domain })
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter domain.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Membership test against this parameter's domain.
    pub fn validate(&self, value: &Value) -> bool {
        self.domain.validate(value)
    }

    /// Validate, producing an error that names this parameter.
    pub fn check(&self, value: &Value) -> Result<(), ParameterError> {
        if self.validate(value) {
            Ok(())
        } else {
            Err(ParameterError::Invalid {
                name: self.name.clone(),
                value: value.to_string(),
            })
        }
    }

    /// Parse a raw string for this parameter.
    pub fn parse(&self, raw: &str) -> Result<Value, ParameterError> {
        self.domain.parse(&self.name, raw)
    }
}
