//! Instruments driven by text commands over a resource.
//!
//! A [`BusInstrument`] renders command strings from its definition's
//! instruction templates and current parameter values, sends them through its
//! [`Transport`] and, for checked commands, reads the device's error status
//! through the templates below.
//!
//! | Template        | Used by                                    |
//! |-----------------|--------------------------------------------|
//! | `error_code`    | status query after every checked command   |
//! | `error_message` | message query after a non-zero status      |
//! | `reset`         | [`Device::reset`]                          |
//!
//! Without `error_message` the `error_code` query is issued again after the
//! repeated command and the text after the first comma of that reply is the
//! message, which covers the usual `-222,"Data out of range"` style of reply.

use crate::checked::{ErrorStatus, checked, parse_status_code};
use crate::device::Device;
use crate::registry::InstrumentId;
use crate::resource::ResourceManager;
use crate::transport::Transport;
use lab_common::consts::ADDRESS_PARAMETER;
use lab_common::definition::{InstrumentDefinition, ParameterValues};
use lab_common::error::{InstrumentError, ParameterError};
use lab_common::parameter::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Template queried for the status code.
pub const ERROR_CODE_INSTRUCTION: &str = "error_code";

/// Template queried for the status message.
pub const ERROR_MESSAGE_INSTRUCTION: &str = "error_message";

/// Template written by `reset`.
pub const RESET_INSTRUCTION: &str = "reset";

type Args = Vec<(String, String)>;

fn owned_args(extra: &[(&str, String)]) -> Args {
    extra.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

fn borrowed_args(args: &Args) -> Vec<(&str, String)> {
    args.iter().map(|(k, v)| (k.as_str(), v.clone())).collect()
}

/// Message part of a `code,"text"` status reply; the whole reply if it has no comma.
fn status_text(reply: &str) -> String {
    reply
        .split_once(',')
        .map_or(reply, |(_, text)| text)
        .trim()
        .trim_matches('"')
        .to_string()
}

/// An instrument behind a resource manager.
pub struct BusInstrument {
    id: InstrumentId,
    name: String,
    definition: Arc<InstrumentDefinition>,
    values: ParameterValues,
    manager: Arc<dyn ResourceManager>,
    transport: Transport,
}

impl std::fmt::Debug for BusInstrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusInstrument")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capability", &self.definition.name())
            .field("manager", &self.manager.name())
            .field("transport", &self.transport)
            .finish()
    }
}

impl BusInstrument {
    /// Validate `supplied` and prepare a disconnected instrument.
    ///
    /// The definition must declare `address`.
    pub fn new(
        id: InstrumentId,
        name: impl Into<String>,
        definition: Arc<InstrumentDefinition>,
        supplied: BTreeMap<String, Value>,
        manager: Arc<dyn ResourceManager>,
    ) -> Result<Self, InstrumentError> {
        let values = definition.instantiate(supplied)?;
        if values.get_str(ADDRESS_PARAMETER).is_none() {
            return Err(ParameterError::Unknown {
                definition: definition.name().to_string(),
                name: ADDRESS_PARAMETER.to_string(),
            }
            .into());
        }
        let name = name.into();
        debug!(instrument = %name, %id, capability = %definition.name(), "Created bus instrument");
        Ok(Self {
            id,
            transport: Transport::new(name.clone()),
            name,
            definition,
            values,
            manager,
        })
    }

    /// Resource address.
    pub fn address(&self) -> &str {
        self.values.get_str(ADDRESS_PARAMETER).unwrap_or_default()
    }

    /// Validate and store a parameter. The address is fixed while connected.
    pub fn set_parameter(&mut self, name: &str, value: Value) -> Result<(), InstrumentError> {
        if name == ADDRESS_PARAMETER && self.transport.is_connected() {
            return Err(InstrumentError::State(format!(
                "{}: disconnect before changing {name}",
                self.name
            )));
        }
        self.definition.assign(&mut self.values, name, value)?;
        Ok(())
    }

    /// Send `command` and return the reply.
    pub fn read(&mut self, command: &str) -> Result<String, InstrumentError> {
        self.transport.read(command)
    }

    /// Send `command` without a reply.
    pub fn write(&mut self, command: &str) -> Result<(), InstrumentError> {
        self.transport.write(command)
    }

    /// Render a named instruction from current values and `extra`.
    pub fn render(&self, instruction: &str, extra: &[(&str, String)]) -> Result<String, InstrumentError> {
        Ok(self.definition.render(instruction, &self.values, extra)?)
    }

    /// Render and query a named instruction.
    pub fn query_instruction(&mut self, instruction: &str, extra: &[(&str, String)]) -> Result<String, InstrumentError> {
        let command = self.render(instruction, extra)?;
        self.read(&command)
    }

    /// Render and write a named instruction.
    pub fn send_instruction(&mut self, instruction: &str, extra: &[(&str, String)]) -> Result<(), InstrumentError> {
        let command = self.render(instruction, extra)?;
        self.write(&command)
    }

    /// [`query_instruction`](Self::query_instruction) followed by an error-status check.
    pub fn checked_query(&mut self, instruction: &str, extra: &[(&str, String)]) -> Result<String, InstrumentError> {
        let name = instruction.to_string();
        let op = checked(instruction, move |bus: &mut BusInstrument, args: Args| {
            bus.query_instruction(&name, &borrowed_args(&args))
        });
        op(self, owned_args(extra))
    }

    /// [`send_instruction`](Self::send_instruction) followed by an error-status check.
    pub fn checked_write(&mut self, instruction: &str, extra: &[(&str, String)]) -> Result<(), InstrumentError> {
        let name = instruction.to_string();
        let op = checked(instruction, move |bus: &mut BusInstrument, args: Args| {
            bus.send_instruction(&name, &borrowed_args(&args))
        });
        op(self, owned_args(extra))
    }

    fn unsupported(&self, instruction: &str) -> InstrumentError {
        InstrumentError::Unsupported(format!(
            "{} ({}) has no \"{instruction}\" instruction",
            self.name,
            self.definition.name()
        ))
    }
}

impl ErrorStatus for BusInstrument {
    fn error_code(&mut self) -> Result<i64, InstrumentError> {
        if self.definition.instruction(ERROR_CODE_INSTRUCTION).is_none() {
            return Err(self.unsupported(ERROR_CODE_INSTRUCTION));
        }
        let reply = self.query_instruction(ERROR_CODE_INSTRUCTION, &[])?;
        parse_status_code(ERROR_CODE_INSTRUCTION, &reply)
    }

    fn error_message(&mut self) -> Result<String, InstrumentError> {
        if self.definition.instruction(ERROR_MESSAGE_INSTRUCTION).is_some() {
            let reply = self.query_instruction(ERROR_MESSAGE_INSTRUCTION, &[])?;
            return Ok(reply.trim().to_string());
        }
        if self.definition.instruction(ERROR_CODE_INSTRUCTION).is_none() {
            return Err(self.unsupported(ERROR_MESSAGE_INSTRUCTION));
        }
        let reply = self.query_instruction(ERROR_CODE_INSTRUCTION, &[])?;
        Ok(status_text(&reply))
    }
}

impl Device for BusInstrument {
    fn id(&self) -> InstrumentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> &InstrumentDefinition {
        &self.definition
    }

    fn values(&self) -> &ParameterValues {
        &self.values
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn connect(&mut self) -> Result<(), InstrumentError> {
        let address = self.address().to_string();
        self.transport.connect(self.manager.as_ref(), &address)
    }

    fn disconnect(&mut self) -> Result<(), InstrumentError> {
        self.transport.disconnect()
    }

    /// Write the `reset` template.
    fn reset(&mut self) -> Result<(), InstrumentError> {
        if self.definition.instruction(RESET_INSTRUCTION).is_none() {
            return Err(self.unsupported(RESET_INSTRUCTION));
        }
        self.send_instruction(RESET_INSTRUCTION, &[])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{BUS_INSTRUMENT, builtin_catalog};
    use crate::resource::{ResourceError, SimulatedResourceManager, SimulationHandle};
    use lab_common::definition::CapabilityRecord;
    use lab_common::parameter::{Domain, Parameter};

    const ADDRESS: &str = "TCPIP::10.0.0.7::5025::SOCKET";

    fn synth_definition(with_status: bool) -> Arc<InstrumentDefinition> {
        let mut catalog = builtin_catalog().unwrap();
        let mut record = CapabilityRecord::new("synth")
            .with_parent(BUS_INSTRUMENT)
            .with_parameter(Parameter::new("freq", Domain::float_range(1.0e6, 2.6e9)))
            .with_parameter(Parameter::new("freq_unit", Domain::options(["Hz", "MHz"])))
            .with_instruction("set_freq", "FREQ:CW {freq} {freq_unit}")
            .with_instruction("get_freq", "FREQ:CW?")
            .with_instruction("set_power", "POW {level} dBm")
            .with_instruction("reset", "*RST");
        if with_status {
            record = record.with_instruction("error_code", "SYST:ERR?");
        }
        catalog.register(record).unwrap();
        Arc::new(catalog.definition("synth").unwrap())
    }

    fn synth(with_status: bool) -> (BusInstrument, SimulationHandle) {
        let manager = SimulatedResourceManager::new();
        let handle = manager.handle();
        let supplied = BTreeMap::from([
            ("address".to_string(), Value::from(ADDRESS)),
            ("freq".to_string(), Value::Float(1.0e9)),
            ("freq_unit".to_string(), Value::from("Hz")),
        ]);
        let bus = BusInstrument::new(
            InstrumentId::new(0),
            "synth0",
            synth_definition(with_status),
            supplied,
            Arc::new(manager),
        )
        .unwrap();
        (bus, handle)
    }

    #[test]
    fn renders_templates_from_current_values() {
        let (mut bus, handle) = synth(true);
        bus.connect().unwrap();
        bus.send_instruction("set_freq", &[]).unwrap();
        bus.set_parameter("freq", Value::Float(2.0e9)).unwrap();
        bus.send_instruction("set_power", &[("level", "-10".to_string())]).unwrap();
        assert_eq!(
            handle.commands(ADDRESS),
            vec!["FREQ:CW 1000000000 Hz", "POW -10 dBm"]
        );
        assert_eq!(bus.render("set_freq", &[]).unwrap(), "FREQ:CW 2000000000 Hz");
    }

    #[test]
    fn set_parameter_validates_against_merged_domain() {
        let (mut bus, _) = synth(true);
        assert!(matches!(
            bus.set_parameter("freq", Value::Float(5.0e9)),
            Err(InstrumentError::Parameter(ParameterError::Invalid { .. }))
        ));
        assert!(matches!(
            bus.set_parameter("power", Value::Float(0.0)),
            Err(InstrumentError::Parameter(ParameterError::Unknown { .. }))
        ));
        assert_eq!(bus.values().get_f64("freq"), Some(1.0e9));
    }

    #[test]
    fn checked_query_passes_through_on_zero_status() {
        let (mut bus, handle) = synth(true);
        bus.connect().unwrap();
        handle.set_reply("FREQ:CW?", "1.5E9");
        handle.set_reply("SYST:ERR?", "+0,\"No error\"");
        assert_eq!(bus.checked_query("get_freq", &[]).unwrap(), "1.5E9");
        assert_eq!(handle.commands(ADDRESS), vec!["FREQ:CW?", "SYST:ERR?"]);
    }

    #[test]
    fn checked_write_repeats_once_on_device_error() {
        let (mut bus, handle) = synth(true);
        bus.connect().unwrap();
        handle.push_reply("SYST:ERR?", "-222,\"Data out of range\"");
        handle.push_reply("SYST:ERR?", "-221,\"Settings conflict\"");
        handle.set_reply("SYST:ERR?", "+0,\"No error\"");

        let err = bus.checked_write("set_freq", &[]).unwrap_err();
        assert_eq!(
            err,
            InstrumentError::DeviceStatus {
                command: "set_freq".to_string(),
                args: "[]".to_string(),
                code: -222,
                message: "Settings conflict".to_string(),
            }
        );
        assert_eq!(
            handle.commands(ADDRESS),
            vec![
                "FREQ:CW 1000000000 Hz",
                "SYST:ERR?",
                "FREQ:CW 1000000000 Hz",
                "SYST:ERR?"
            ]
        );

        // Both status replies were consumed, so the next command is clean.
        bus.checked_write("set_freq", &[]).unwrap();
    }

    #[test]
    fn checked_without_status_template_is_unsupported() {
        let (mut bus, _) = synth(false);
        bus.connect().unwrap();
        assert!(matches!(
            bus.checked_write("set_freq", &[]),
            Err(InstrumentError::Unsupported(_))
        ));
    }

    #[test]
    fn io_fault_is_not_retried() {
        let (mut bus, handle) = synth(true);
        bus.connect().unwrap();
        handle.fail_next("FREQ:CW?", ResourceError::Timeout(500));
        assert!(matches!(
            bus.checked_query("get_freq", &[]),
            Err(InstrumentError::ReadFault { .. })
        ));
        assert_eq!(handle.commands(ADDRESS), vec!["FREQ:CW?"]);
    }

    #[test]
    fn lifecycle_and_reset() {
        let (mut bus, handle) = synth(true);
        assert!(matches!(bus.reset(), Err(InstrumentError::NotConnected { .. })));
        bus.connect().unwrap();
        assert!(matches!(bus.connect(), Err(InstrumentError::AlreadyConnected { .. })));
        assert!(matches!(
            bus.set_parameter("address", Value::from("TCPIP::other::1::SOCKET")),
            Err(InstrumentError::State(_))
        ));
        bus.reset().unwrap();
        assert_eq!(handle.last_command(ADDRESS).as_deref(), Some("*RST"));
        bus.disconnect().unwrap();
        assert!(!bus.is_connected());
    }

    #[test]
    fn missing_address_parameter_is_rejected() {
        let definition = Arc::new(
            lab_common::definition::InstrumentDefinition::resolve(&[CapabilityRecord::new("bare")])
                .unwrap(),
        );
        let err = BusInstrument::new(
            InstrumentId::new(0),
            "bare0",
            definition,
            BTreeMap::new(),
            Arc::new(SimulatedResourceManager::new()),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::Parameter(ParameterError::Unknown { .. })
        ));
    }
}
