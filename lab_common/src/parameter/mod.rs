//! Parameter declarations and the values they accept.
//!
//! # Module Structure
//!
//! - [`value`] - `Value`, `ValueKind` and string coercion
//! - [`domain`] - `Domain` predicates and `Parameter`

pub mod domain;
pub mod value;

pub use domain::{Domain, Parameter, StringDomain};
pub use value::{coerce, Value, ValueKind};
