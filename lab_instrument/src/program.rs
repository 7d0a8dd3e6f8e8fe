//! Pulse program files (`program.toml`).
//!
//! A program names the register to write and lists its steps in address
//! order. A step may carry a `label`; later steps of an address-taking
//! opcode (`END_LOOP`, `JSR`, `BRANCH`) refer to it with `target` instead of
//! a numeric `data`.
//!
//! ```toml
//! register = "PULSE_PROGRAM"
//!
//! [[step]]
//! op = "CONTINUE"
//! flags = 0b0001
//! pulse = "ON"
//! duration_ns = 500
//!
//! [[step]]
//! label = "outer"
//! op = "LOOP"
//! data = 1000
//! duration_ns = 100
//!
//! [[step]]
//! op = "END_LOOP"
//! target = "outer"
//! duration_ns = 100
//!
//! [[step]]
//! op = "STOP"
//! duration_ns = 100
//! ```

use crate::sequencer::opcode::UnknownName;
use crate::sequencer::{Instruction, Opcode, PulseSequencer, PulseShape, Register, SequencerDriver, Session};
use lab_common::config::ConfigError;
use lab_common::error::InstrumentError;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while compiling or writing a pulse program.
#[derive(Debug, Error)]
pub enum ProgramError {
    /// The file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An opcode, pulse shape or register name is not recognized.
    #[error("step {step}: {source}")]
    Name {
        /// Step index.
        step: usize,
        /// Lookup failure.
        source: UnknownName,
    },

    /// The program register name is not recognized.
    #[error(transparent)]
    Register(UnknownName),

    /// Two steps carry the same label.
    #[error("step {step}: label \"{label}\" already defined")]
    DuplicateLabel {
        /// Step index.
        step: usize,
        /// Label.
        label: String,
    },

    /// `target` names no earlier label.
    #[error("step {step}: no earlier step is labelled \"{label}\"")]
    UnresolvedLabel {
        /// Step index.
        step: usize,
        /// Label.
        label: String,
    },

    /// `target` on an opcode that takes no address.
    #[error("step {step}: {op} does not take a target")]
    TargetNotAllowed {
        /// Step index.
        step: usize,
        /// Opcode.
        op: Opcode,
    },

    /// Both `data` and `target` were given.
    #[error("step {step}: data and target are mutually exclusive")]
    DataAndTarget {
        /// Step index.
        step: usize,
    },

    /// The sequencer rejected the program.
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
}

fn default_register() -> String {
    Register::PulseProgram.name().to_string()
}

/// One `[[step]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    /// Opcode mnemonic.
    pub op: String,

    /// Output flags.
    #[serde(default)]
    pub flags: u32,

    /// Pulse shape name; `OFF` when omitted.
    #[serde(default)]
    pub pulse: Option<String>,

    /// Duration in nanoseconds.
    pub duration_ns: u64,

    /// Raw data field.
    #[serde(default)]
    pub data: Option<u32>,

    /// Label for later steps to target.
    #[serde(default)]
    pub label: Option<String>,

    /// Label of an earlier step whose address becomes the data field.
    #[serde(default)]
    pub target: Option<String>,
}

/// A pulse program file.
#[derive(Debug, Clone, Deserialize)]
pub struct PulseProgram {
    /// Register name.
    #[serde(default = "default_register")]
    pub register: String,

    /// Steps in address order.
    #[serde(default)]
    pub step: Vec<StepSpec>,
}

/// A program with names and labels resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    /// Target register.
    pub register: Register,
    /// Instructions; index is the expected address.
    pub instructions: Vec<Instruction>,
}

impl PulseProgram {
    /// Resolve names and labels.
    pub fn compile(&self) -> Result<CompiledProgram, ProgramError> {
        let register: Register = self.register.parse().map_err(ProgramError::Register)?;
        let mut labels: HashMap<&str, u32> = HashMap::new();
        let mut instructions = Vec::with_capacity(self.step.len());

        for (step, spec) in self.step.iter().enumerate() {
            let name_error = |source| ProgramError::Name { step, source };
            let op: Opcode = spec.op.parse().map_err(name_error)?;
            let shape: PulseShape = match &spec.pulse {
                Some(p) => p.parse().map_err(name_error)?,
                None => PulseShape::Off,
            };
            let data = match (&spec.target, spec.data) {
                (Some(_), Some(_)) => return Err(ProgramError::DataAndTarget { step }),
                (Some(_), None) if !op.takes_address() => {
                    return Err(ProgramError::TargetNotAllowed { step, op });
                }
                (Some(label), None) => *labels.get(label.as_str()).ok_or_else(|| {
                    ProgramError::UnresolvedLabel {
                        step,
                        label: label.clone(),
                    }
                })?,
                (None, data) => data.unwrap_or(0),
            };
            if let Some(label) = &spec.label {
                let address = u32::try_from(step).unwrap_or(u32::MAX);
                if labels.insert(label.as_str(), address).is_some() {
                    return Err(ProgramError::DuplicateLabel {
                        step,
                        label: label.clone(),
                    });
                }
            }
            instructions.push(Instruction::new(op, spec.flags, shape, spec.duration_ns, data));
        }
        Ok(CompiledProgram {
            register,
            instructions,
        })
    }

    /// Compile and write the whole program in one session.
    ///
    /// On failure the session is closed before the error is returned.
    pub fn write_to<D: SequencerDriver>(
        &self,
        sequencer: &mut PulseSequencer<D>,
    ) -> Result<Session, ProgramError> {
        let program = self.compile()?;
        sequencer.start_programming(program.register)?;
        for instruction in &program.instructions {
            if let Err(e) = sequencer.emit(*instruction) {
                if let Err(close) = sequencer.stop_programming() {
                    warn!(error = %close, "Could not close failed programming session");
                }
                return Err(e.into());
            }
        }
        let session = sequencer.stop_programming()?;
        info!(
            register = %program.register,
            instructions = session.instructions().len(),
            "Program written"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_common::config::ConfigLoader;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PROGRAM: &str = r#"
register = "PULSE_PROGRAM"

[[step]]
op = "CONTINUE"
flags = 0b0001
pulse = "ON"
duration_ns = 500

[[step]]
label = "outer"
op = "LOOP"
data = 1000
duration_ns = 100

[[step]]
op = "END_LOOP"
target = "outer"
duration_ns = 100

[[step]]
op = "STOP"
duration_ns = 100
"#;

    #[test]
    fn labels_resolve_to_earlier_addresses() {
        let program = PulseProgram::load_str(PROGRAM).unwrap().compile().unwrap();
        assert_eq!(program.register, Register::PulseProgram);
        assert_eq!(program.instructions.len(), 4);
        assert_eq!(program.instructions[0].shape, PulseShape::On);
        assert_eq!(program.instructions[2].opcode, Opcode::EndLoop);
        assert_eq!(program.instructions[2].data, 1);
    }

    #[test]
    fn forward_target_is_unresolved() {
        let text = PROGRAM.replace("target = \"outer\"", "target = \"later\"");
        let err = PulseProgram::load_str(&text).unwrap().compile().unwrap_err();
        assert!(matches!(err, ProgramError::UnresolvedLabel { step: 2, .. }));
    }

    #[test]
    fn target_on_plain_opcode_is_rejected() {
        let text = r#"
[[step]]
label = "a"
op = "CONTINUE"
duration_ns = 10

[[step]]
op = "CONTINUE"
target = "a"
duration_ns = 10
"#;
        let err = PulseProgram::load_str(text).unwrap().compile().unwrap_err();
        assert!(matches!(
            err,
            ProgramError::TargetNotAllowed { step: 1, op: Opcode::Continue }
        ));
    }

    #[test]
    fn unknown_names_point_at_step() {
        let text = PROGRAM.replace("pulse = \"ON\"", "pulse = \"SIX_PERIOD\"");
        let err = PulseProgram::load_str(&text).unwrap().compile().unwrap_err();
        assert_eq!(err.to_string(), "step 0: unknown pulse shape \"SIX_PERIOD\"");
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(PROGRAM.as_bytes()).unwrap();
        let program = PulseProgram::load(file.path()).unwrap();
        assert_eq!(program.step.len(), 4);
        assert_eq!(program.step[1].label.as_deref(), Some("outer"));
    }
}
