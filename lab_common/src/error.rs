//! Error taxonomy shared by every instrument.
//!
//! - `ParameterError` - a configuration value was missing, extra, unparseable
//!   or outside its domain while constructing or updating an instrument.
//! - `InstrumentError` - anything that goes wrong while talking to a device:
//!   connection state, bus I/O faults, device-reported error status, sequencer
//!   field overflows, native driver failures and state violations.
//! - `DefinitionError` - a broken capability hierarchy. Fatal: construction of
//!   the instrument definition is aborted.

use std::fmt;
use thiserror::Error;

// ─── ParameterError ─────────────────────────────────────────────────

/// Error raised while validating instrument parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    /// Supplied parameter names differ from the declared set.
    #[error("{}", mismatch_message(.definition, .missing, .extra))]
    Mismatch {
        /// Definition being instantiated.
        definition: String,
        /// Declared but not supplied.
        missing: Vec<String>,
        /// Supplied but not declared.
        extra: Vec<String>,
    },

    /// A value falls outside its parameter's domain.
    #[error("invalid value assigned to parameter \"{name}\": {value}")]
    Invalid {
        /// Parameter name.
        name: String,
        /// Offending value, rendered.
        value: String,
    },

    /// A raw string could not be parsed into the expected kind.
    #[error("cannot parse {input:?} as {expected} for parameter \"{name}\"")]
    Unparseable {
        /// Parameter name.
        name: String,
        /// Raw input.
        input: String,
        /// Expected kind(s).
        expected: String,
    },

    /// A string domain was declared with a malformed pattern.
    #[error("parameter \"{name}\" has invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// Parameter name.
        name: String,
        /// The pattern as declared.
        pattern: String,
        /// Regex compiler message.
        reason: String,
    },

    /// Parameter is not declared by the definition.
    #[error("{definition} has no parameter \"{name}\"")]
    Unknown {
        /// Definition name.
        definition: String,
        /// Parameter name.
        name: String,
    },

    /// Instruction template is not declared by the definition.
    #[error("{definition} has no instruction \"{name}\"")]
    UnknownInstruction {
        /// Definition name.
        definition: String,
        /// Instruction name.
        name: String,
    },

    /// An instruction template could not be rendered.
    #[error("cannot render instruction \"{name}\": {reason}")]
    Template {
        /// Instruction name.
        name: String,
        /// Formatter message.
        reason: String,
    },
}

fn mismatch_message(definition: &str, missing: &[String], extra: &[String]) -> String {
    let mut parts = Vec::with_capacity(2);
    if !missing.is_empty() {
        parts.push(format!("missing parameters {missing:?}"));
    }
    if !extra.is_empty() {
        parts.push(format!("extra parameters {extra:?}"));
    }
    format!("cannot instantiate {definition}: {}", parts.join(", "))
}

// ─── InstrumentError ────────────────────────────────────────────────

/// Sequencer instruction field that failed a width check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionField {
    /// Output flag mask.
    Flags,
    /// Opcode-specific data.
    Data,
    /// Duration in nanoseconds.
    Duration,
}

impl fmt::Display for InstructionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flags => write!(f, "flags"),
            Self::Data => write!(f, "data"),
            Self::Duration => write!(f, "duration"),
        }
    }
}

/// Error raised by instrument communication and sequencer programming.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstrumentError {
    /// `connect()` on a connected instrument.
    #[error("{instrument} is already connected")]
    AlreadyConnected {
        /// Instrument label.
        instrument: String,
    },

    /// I/O attempted on a disconnected instrument.
    #[error("{instrument} is not connected")]
    NotConnected {
        /// Instrument label.
        instrument: String,
    },

    /// The resource manager could not open the address.
    #[error("cannot open resource {address:?}: {reason}")]
    Open {
        /// Bus address.
        address: String,
        /// Resource manager message.
        reason: String,
    },

    /// A query failed at the resource level.
    #[error("error reading command ({command}): {reason}")]
    ReadFault {
        /// Command text.
        command: String,
        /// Resource message.
        reason: String,
    },

    /// A write failed at the resource level.
    #[error("error writing command ({command}): {reason}")]
    WriteFault {
        /// Command text.
        command: String,
        /// Resource message.
        reason: String,
    },

    /// Closing the resource failed.
    #[error("error closing resource {address:?}: {reason}")]
    CloseFault {
        /// Bus address.
        address: String,
        /// Resource message.
        reason: String,
    },

    /// The device reported a non-zero error status after a checked command.
    #[error("{command}({args}) failed with device error {code}: {message}")]
    DeviceStatus {
        /// Command function name.
        command: String,
        /// Command arguments, rendered.
        args: String,
        /// Numeric error code.
        code: i64,
        /// Human-readable message fetched after the re-issue.
        message: String,
    },

    /// A status register reply could not be parsed as an error code.
    #[error("cannot parse status reply {response:?} to {command}")]
    StatusParse {
        /// Status query.
        command: String,
        /// Raw reply.
        response: String,
    },

    /// An instruction field does not fit in its hardware width.
    #[error("{instruction} instruction {field} ({value:#x}) out of bounds for {width}-bit field")]
    FieldOverflow {
        /// Opcode name.
        instruction: String,
        /// Field that overflowed.
        field: InstructionField,
        /// Supplied value.
        value: u64,
        /// Field width in bits.
        width: u32,
    },

    /// A native driver call returned a negative status.
    #[error("{operation} failed on board {board} ({code}): {message}")]
    Driver {
        /// Driver call.
        operation: String,
        /// Board number.
        board: i32,
        /// Returned status.
        code: i32,
        /// Driver's last error text.
        message: String,
    },

    /// The device assigned an address out of sequence.
    #[error("{instruction} instruction stored at address {actual}, expected {expected}")]
    AddressMismatch {
        /// Opcode name.
        instruction: String,
        /// Next address of the session.
        expected: u32,
        /// Address returned by the device.
        actual: u32,
    },

    /// Operation not allowed in the current device state.
    #[error("invalid state: {0}")]
    State(String),

    /// Operation not provided by this instrument.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Rendering a command from the instrument's parameters failed.
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

// ─── DefinitionError ────────────────────────────────────────────────

/// The capability map a record failed to declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityMap {
    /// `parameters`
    Parameters,
    /// `instructions`
    Instructions,
}

impl fmt::Display for CapabilityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameters => write!(f, "parameters"),
            Self::Instructions => write!(f, "instructions"),
        }
    }
}

/// Broken capability hierarchy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    /// An ancestor record declares no map at all.
    #[error("capability \"{capability}\" declares no {map} map; check its definition")]
    MissingCapabilityMap {
        /// Record name.
        capability: String,
        /// Missing map.
        map: CapabilityMap,
    },

    /// A record names a parent that was never registered.
    #[error("capability \"{capability}\" names unknown parent \"{parent}\"")]
    UnknownParent {
        /// Record name.
        capability: String,
        /// Parent name.
        parent: String,
    },

    /// Parent links loop back on themselves.
    #[error("capability hierarchy of \"{0}\" contains a cycle")]
    Cycle(String),

    /// Two records share a name.
    #[error("capability \"{0}\" is already registered")]
    Duplicate(String),

    /// No record with this name.
    #[error("unknown capability \"{0}\"")]
    Unknown(String),

    /// The chain passed to the resolver is empty.
    #[error("capability chain is empty")]
    EmptyChain,

    /// A parameter declaration is itself malformed.
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}
