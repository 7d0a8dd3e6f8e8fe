//! Lab Common Library
//!
//! Shared building blocks for every crate in the lab workspace: the typed
//! parameter layer used to validate instrument construction, the capability
//! records that instrument definitions are resolved from, the error taxonomy
//! and TOML configuration loading.
//!
//! # Module Structure
//!
//! - [`consts`] - Bit widths and other fixed limits
//! - [`error`] - `ParameterError`, `InstrumentError`, `DefinitionError`
//! - [`config`] - Configuration loading traits and types
//! - [`parameter`] - Values, domains and parameters
//! - [`definition`] - Capability records and resolved instrument definitions
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use lab_common::prelude::*;
//!
//! let record = CapabilityRecord::new("synth")
//!     .with_parameter(Parameter::new("freq", Domain::float_range(1.0e6, 2.6e9)));
//! let definition = InstrumentDefinition::resolve(&[record]).unwrap();
//! assert!(definition.parameter("freq").is_some());
//! ```

pub mod config;
pub mod consts;
pub mod definition;
pub mod error;
pub mod parameter;
pub mod prelude;
