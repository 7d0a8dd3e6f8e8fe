//! Lab configuration (`lab.toml`).
//!
//! Declares capability records on top of the built-in ones, the instruments
//! to create from them and which backends to drive them with.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "info"
//! service_name = "odmr-bench"
//!
//! [bus]
//! backend = "tcp"
//! timeout_ms = 2000
//!
//! [[capability]]
//! name = "synth"
//! parent = "bus_instrument"
//!
//! [capability.parameters]
//! freq = { type = "float", min = 1.0e6, max = 4.0e9 }
//! freq_unit = { type = "options", values = ["Hz", "MHz"] }
//!
//! [capability.instructions]
//! set_freq = "FREQ:CW {freq} {freq_unit}"
//! error_code = "SYST:ERR?"
//!
//! [[instrument]]
//! name = "synth0"
//! capability = "synth"
//! parameters = { address = "TCPIP::10.0.0.7::5025::SOCKET", freq = 2.87e9, freq_unit = "Hz" }
//! ```
//!
//! Omitting `parameters` or `instructions` on a capability declares no map
//! at all. That is fine for a leaf but fatal for any capability another one
//! inherits from; write an empty table to declare an empty map.

use crate::builtin::{BUS_INSTRUMENT, PULSE_SEQUENCER, builtin_catalog};
use crate::bus::BusInstrument;
use crate::registry::{InstrumentId, InstrumentRegistry};
use crate::resource::ResourceManager;
use crate::sequencer::{PulseSequencer, SequencerDriver};
use lab_common::config::{ConfigError, SharedConfig};
use lab_common::definition::{CapabilityCatalog, CapabilityRecord, InstructionTemplate};
use lab_common::error::{DefinitionError, InstrumentError, ParameterError};
use lab_common::parameter::{Domain, Parameter, StringDomain, Value};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

fn default_timeout_ms() -> u64 {
    2000
}

fn default_simulated_boards() -> usize {
    1
}

/// Errors raised while turning a [`LabConfig`] into live instruments.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The file itself is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The capability hierarchy is broken.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// An instrument could not be created.
    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    /// The capability derives from neither instrument kind.
    #[error("instrument \"{instrument}\": capability \"{capability}\" is neither a bus_instrument nor a pulse_sequencer")]
    UnknownKind {
        /// Instance name.
        instrument: String,
        /// Capability it was declared with.
        capability: String,
    },
}

impl From<ParameterError> for SetupError {
    fn from(e: ParameterError) -> Self {
        Self::Definition(DefinitionError::Parameter(e))
    }
}

// ─── Backends ───────────────────────────────────────────────────────

/// Resource manager used for bus instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// In-memory simulation.
    #[default]
    Simulation,
    /// Raw TCP sockets.
    Tcp,
}

/// `[bus]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Backend.
    #[serde(default)]
    pub backend: BusBackend,

    /// Per-command timeout for socket resources.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Driver used for pulse sequencers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequencerBackend {
    /// In-process simulation.
    #[default]
    Simulation,
    /// Vendor library (requires the `spinapi` feature).
    SpinApi,
}

/// `[sequencer]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SequencerConfig {
    /// Backend.
    #[serde(default)]
    pub backend: SequencerBackend,

    /// Boards the simulation pretends to have.
    #[serde(default = "default_simulated_boards")]
    pub simulated_boards: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            backend: SequencerBackend::default(),
            simulated_boards: default_simulated_boards(),
        }
    }
}

// ─── Capabilities ───────────────────────────────────────────────────

/// A parameter domain as written in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainSpec {
    /// Regex prefix match.
    String {
        /// Pattern.
        pattern: String,
    },
    /// Integer bounds, each optional.
    Int {
        /// Lower bound.
        min: Option<i64>,
        /// Upper bound.
        max: Option<i64>,
    },
    /// Float bounds, each optional.
    Float {
        /// Lower bound.
        min: Option<f64>,
        /// Upper bound.
        max: Option<f64>,
    },
    /// Explicit set of allowed values.
    Options {
        /// Allowed values.
        values: Vec<Value>,
    },
    /// Any member accepts.
    Compound {
        /// Members.
        members: Vec<DomainSpec>,
    },
}

impl DomainSpec {
    /// Build the domain; `parameter` names it in pattern errors.
    pub fn to_domain(&self, parameter: &str) -> Result<Domain, ParameterError> {
        Ok(match self {
            Self::String { pattern } => Domain::String(StringDomain::new(parameter, pattern)?),
            Self::Int { min, max } => Domain::int(*min, *max),
            Self::Float { min, max } => Domain::float(*min, *max),
            Self::Options { values } => Domain::options(values.iter().cloned()),
            Self::Compound { members } => Domain::compound(
                members
                    .iter()
                    .map(|m| m.to_domain(parameter))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

/// `[[capability]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilitySpec {
    /// Record name.
    pub name: String,

    /// Parent record, built-in or declared.
    #[serde(default)]
    pub parent: Option<String>,

    /// Declared parameters; absent means no map.
    #[serde(default)]
    pub parameters: Option<BTreeMap<String, DomainSpec>>,

    /// Instruction templates; absent means no map.
    #[serde(default)]
    pub instructions: Option<BTreeMap<String, String>>,
}

impl CapabilitySpec {
    /// Convert into a capability record.
    pub fn to_record(&self) -> Result<CapabilityRecord, ParameterError> {
        let parameters = self
            .parameters
            .as_ref()
            .map(|specs| {
                specs
                    .iter()
                    .map(|(name, spec)| {
                        spec.to_domain(name)
                            .map(|d| (name.clone(), Parameter::new(name.clone(), d)))
                    })
                    .collect::<Result<BTreeMap<_, _>, _>>()
            })
            .transpose()?;
        let instructions = self.instructions.as_ref().map(|templates| {
            templates
                .iter()
                .map(|(name, t)| (name.clone(), InstructionTemplate::new(t.clone())))
                .collect()
        });
        Ok(CapabilityRecord {
            name: self.name.clone(),
            parent: self.parent.clone(),
            parameters,
            instructions,
        })
    }
}

// ─── Instruments ────────────────────────────────────────────────────

/// `[[instrument]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentSpec {
    /// Instance name.
    pub name: String,

    /// Capability to instantiate.
    pub capability: String,

    /// One value per declared parameter.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

// ─── LabConfig ──────────────────────────────────────────────────────

/// Root of `lab.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LabConfig {
    /// Shared settings.
    pub shared: SharedConfig,

    /// Bus backend.
    #[serde(default)]
    pub bus: BusConfig,

    /// Sequencer backend.
    #[serde(default)]
    pub sequencer: SequencerConfig,

    /// Capability records added to the built-ins.
    #[serde(default)]
    pub capability: Vec<CapabilitySpec>,

    /// Instruments to create.
    #[serde(default)]
    pub instrument: Vec<InstrumentSpec>,
}

impl LabConfig {
    /// Check names before anything is built.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` for a blank service name, a blank or
    /// duplicate instrument name, or an instrument with no capability.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        let mut seen = BTreeSet::new();
        for instrument in &self.instrument {
            if instrument.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "instrument name cannot be empty".to_string(),
                ));
            }
            if instrument.capability.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "instrument \"{}\" has no capability",
                    instrument.name
                )));
            }
            if !seen.insert(instrument.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate instrument name \"{}\"",
                    instrument.name
                )));
            }
        }
        Ok(())
    }

    /// Built-in records plus every declared capability.
    pub fn catalog(&self) -> Result<CapabilityCatalog, SetupError> {
        let mut catalog = builtin_catalog()?;
        for spec in &self.capability {
            catalog.register(spec.to_record()?)?;
        }
        debug!(capabilities = ?catalog.names(), "Capability catalog built");
        Ok(catalog)
    }

    /// Validate, resolve every definition and create every instrument.
    ///
    /// Bus instruments share `bus`; each pulse sequencer gets a fresh driver
    /// from `driver`. Nothing is connected.
    pub fn build_registry<F>(
        &self,
        bus: Arc<dyn ResourceManager>,
        mut driver: F,
    ) -> Result<InstrumentRegistry, SetupError>
    where
        F: FnMut() -> Result<Box<dyn SequencerDriver>, InstrumentError>,
    {
        self.validate()?;
        let catalog = self.catalog()?;
        let mut registry = InstrumentRegistry::new();

        for spec in &self.instrument {
            let definition = Arc::new(catalog.definition(&spec.capability)?);
            let supplied = spec.parameters.clone();
            if definition.inherits(PULSE_SEQUENCER) {
                let driver = driver()?;
                registry.insert_with(|id: InstrumentId| {
                    PulseSequencer::new(id, spec.name.clone(), definition, supplied, driver)
                })?;
            } else if definition.inherits(BUS_INSTRUMENT) {
                let manager = Arc::clone(&bus);
                registry.insert_with(|id: InstrumentId| {
                    BusInstrument::new(id, spec.name.clone(), definition, supplied, manager)
                })?;
            } else {
                return Err(SetupError::UnknownKind {
                    instrument: spec.name.clone(),
                    capability: spec.capability.clone(),
                });
            }
        }
        info!(instruments = registry.len(), "Instruments created");
        Ok(registry)
    }
}
