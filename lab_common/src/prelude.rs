//! Common re-exports for convenience.
//!
//! ```rust
//! use lab_common::prelude::*;
//! ```

pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::consts::*;
pub use crate::definition::{
    CapabilityCatalog, CapabilityRecord, InstructionMap, InstructionTemplate,
    InstrumentDefinition, ParameterMap, ParameterValues, merged_instructions, merged_parameters,
};
pub use crate::error::{
    CapabilityMap, DefinitionError, InstructionField, InstrumentError, ParameterError,
};
pub use crate::parameter::{Domain, Parameter, StringDomain, Value, ValueKind, coerce};
