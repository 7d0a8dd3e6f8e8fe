//! Pulse-sequencer programming.
//!
//! # Module Structure
//!
//! - [`opcode`] - Opcodes, pulse shapes and programmable registers
//! - [`instruction`] - Instruction fields, width checks and packing
//! - [`driver`] - The native driver call table
//! - [`simulation`] - In-process driver for tests and dry runs
//! - `spinapi` - Vendor library binding (feature `spinapi`)
//!
//! # State Machine
//!
//! ```text
//!            start_programming(reg)
//!   Idle ─────────────────────────────► Programming(reg)
//!    ▲                                        │ continue/stop/loop/end_loop/
//!    │          stop_programming              │ jsr/rts/branch/long_delay/wait
//!    └────────────────────────────────────────┘
//! ```
//!
//! Instruction emitters are only legal while programming; `start`, `stop` and
//! `reset` only while idle. Every board-level call first selects this
//! sequencer's board, since the vendor library keeps one global selection.

pub mod driver;
pub mod instruction;
pub mod opcode;
pub mod simulation;
#[cfg(feature = "spinapi")]
pub mod spinapi;

pub use driver::SequencerDriver;
pub use instruction::{EncodedInstruction, Instruction};
pub use opcode::{Opcode, PulseShape, Register};
pub use simulation::SimulatedSequencer;
#[cfg(feature = "spinapi")]
pub use spinapi::SpinApiDriver;

use crate::device::Device;
use crate::registry::InstrumentId;
use lab_common::definition::{InstrumentDefinition, ParameterValues};
use lab_common::error::{InstrumentError, ParameterError};
use lab_common::parameter::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parameter holding the board number.
pub const BOARD_PARAMETER: &str = "board_num";

/// Parameter holding the core clock in MHz.
pub const CLOCK_PARAMETER: &str = "clock_mhz";

/// Sequencer over a boxed driver, as built from configuration.
pub type BoxedSequencer = PulseSequencer<Box<dyn SequencerDriver>>;

/// An instruction together with the address the board assigned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgrammedInstruction {
    /// Assigned address.
    pub address: u32,
    /// The instruction as emitted.
    pub instruction: Instruction,
}

/// Instructions written during one programming session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    register: Register,
    instructions: Vec<ProgrammedInstruction>,
}

impl Session {
    fn new(register: Register) -> Self {
        Self {
            register,
            instructions: Vec::new(),
        }
    }

    /// Register being programmed.
    pub fn register(&self) -> Register {
        self.register
    }

    /// Instructions in address order.
    pub fn instructions(&self) -> &[ProgrammedInstruction] {
        &self.instructions
    }

    /// Address the next instruction must receive.
    pub fn next_address(&self) -> u32 {
        u32::try_from(self.instructions.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Programming(Session),
}

/// A pulse sequencer board driven through `D`.
pub struct PulseSequencer<D: SequencerDriver> {
    id: InstrumentId,
    name: String,
    definition: Arc<InstrumentDefinition>,
    values: ParameterValues,
    board: i32,
    clock_mhz: f64,
    driver: D,
    connected: bool,
    state: State,
}

impl<D: SequencerDriver> std::fmt::Debug for PulseSequencer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseSequencer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("driver", &self.driver.name())
            .field("board", &self.board)
            .field("connected", &self.connected)
            .field("state", &self.state)
            .finish()
    }
}

fn required<T>(definition: &InstrumentDefinition, name: &str, value: Option<T>) -> Result<T, ParameterError> {
    value.ok_or_else(|| ParameterError::Unknown {
        definition: definition.name().to_string(),
        name: name.to_string(),
    })
}

fn board_number(definition: &InstrumentDefinition, values: &ParameterValues) -> Result<i32, ParameterError> {
    let raw = required(definition, BOARD_PARAMETER, values.get_i64(BOARD_PARAMETER))?;
    i32::try_from(raw).map_err(|_| ParameterError::Invalid {
        name: BOARD_PARAMETER.to_string(),
        value: raw.to_string(),
    })
}

impl<D: SequencerDriver> PulseSequencer<D> {
    /// Validate `supplied` against `definition` and wrap `driver`.
    ///
    /// The definition must declare `board_num` and `clock_mhz`.
    pub fn new(
        id: InstrumentId,
        name: impl Into<String>,
        definition: Arc<InstrumentDefinition>,
        supplied: BTreeMap<String, Value>,
        driver: D,
    ) -> Result<Self, InstrumentError> {
        let values = definition.instantiate(supplied)?;
        let board = board_number(&definition, &values)?;
        let clock_mhz = required(&definition, CLOCK_PARAMETER, values.get_f64(CLOCK_PARAMETER))?;
        let name = name.into();
        debug!(instrument = %name, %id, board, clock_mhz, driver = driver.name(), "Created pulse sequencer");
        Ok(Self {
            id,
            name,
            definition,
            values,
            board,
            clock_mhz,
            driver,
            connected: false,
            state: State::Idle,
        })
    }

    /// Board number.
    pub fn board(&self) -> i32 {
        self.board
    }

    /// Core clock in MHz.
    pub fn clock_mhz(&self) -> f64 {
        self.clock_mhz
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The driver, mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Current session, if programming.
    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            State::Programming(session) => Some(session),
            State::Idle => None,
        }
    }

    /// True between `start_programming` and `stop_programming`.
    pub fn is_programming(&self) -> bool {
        matches!(self.state, State::Programming(_))
    }

    /// Validate and store a parameter.
    ///
    /// `board_num` and `clock_mhz` can only change while disconnected.
    pub fn set_parameter(&mut self, name: &str, value: Value) -> Result<(), InstrumentError> {
        if self.connected && (name == BOARD_PARAMETER || name == CLOCK_PARAMETER) {
            return Err(InstrumentError::State(format!(
                "{}: disconnect before changing {name}",
                self.name
            )));
        }
        let mut values = self.values.clone();
        self.definition.assign(&mut values, name, value)?;
        let board = board_number(&self.definition, &values)?;
        let clock_mhz = required(&self.definition, CLOCK_PARAMETER, values.get_f64(CLOCK_PARAMETER))?;
        self.values = values;
        self.board = board;
        self.clock_mhz = clock_mhz;
        Ok(())
    }

    /// Number of boards the driver can see.
    pub fn count_boards(&mut self) -> Result<usize, InstrumentError> {
        let code = self.driver.count_boards();
        if code < 0 {
            return Err(self.driver_error("count_boards", code));
        }
        Ok(usize::try_from(code).unwrap_or_default())
    }

    fn driver_error(&mut self, operation: &str, code: i32) -> InstrumentError {
        let message = self.driver.last_error();
        warn!(instrument = %self.name, operation, code, error = %message, "Driver call failed");
        InstrumentError::Driver {
            operation: operation.to_string(),
            board: self.board,
            code,
            message,
        }
    }

    fn status(&mut self, operation: &str, code: i32) -> Result<i32, InstrumentError> {
        if code < 0 {
            Err(self.driver_error(operation, code))
        } else {
            Ok(code)
        }
    }

    /// Select this board, then run `call` and check its status.
    fn board_call(
        &mut self,
        operation: &str,
        call: impl FnOnce(&mut D) -> i32,
    ) -> Result<i32, InstrumentError> {
        let selected = self.driver.select_board(self.board);
        self.status("select_board", selected)?;
        let code = call(&mut self.driver);
        self.status(operation, code)
    }

    fn ensure_connected(&self) -> Result<(), InstrumentError> {
        if self.connected {
            Ok(())
        } else {
            Err(InstrumentError::NotConnected {
                instrument: self.name.clone(),
            })
        }
    }

    fn ensure_idle(&self, operation: &str) -> Result<(), InstrumentError> {
        self.ensure_connected()?;
        match &self.state {
            State::Idle => Ok(()),
            State::Programming(session) => Err(InstrumentError::State(format!(
                "{}: cannot {operation} while programming {}",
                self.name, session.register
            ))),
        }
    }

    // ─── Programming session ────────────────────────────────────────

    /// Open a programming session on `register`.
    pub fn start_programming(&mut self, register: Register) -> Result<(), InstrumentError> {
        self.ensure_idle("start programming")?;
        self.board_call("start_programming", |d| d.start_programming(register.id()))?;
        info!(instrument = %self.name, %register, "Programming started");
        self.state = State::Programming(Session::new(register));
        Ok(())
    }

    /// Close the session and return what was written.
    pub fn stop_programming(&mut self) -> Result<Session, InstrumentError> {
        self.ensure_connected()?;
        if !self.is_programming() {
            return Err(InstrumentError::State(format!(
                "{}: no programming session to stop",
                self.name
            )));
        }
        self.board_call("stop_programming", |d| d.stop_programming())?;
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Programming(session) => {
                info!(
                    instrument = %self.name,
                    register = %session.register,
                    instructions = session.instructions.len(),
                    "Programming finished"
                );
                Ok(session)
            }
            State::Idle => Err(InstrumentError::State(format!(
                "{}: no programming session to stop",
                self.name
            ))),
        }
    }

    /// Encode, transmit and record one instruction; returns its address.
    ///
    /// Field widths are checked before any driver call. A WAIT may not be
    /// the first instruction of a pulse program.
    pub fn emit(&mut self, instruction: Instruction) -> Result<u32, InstrumentError> {
        let (register, expected) = match &self.state {
            State::Programming(session) => (session.register, session.next_address()),
            State::Idle => {
                return Err(InstrumentError::State(format!(
                    "{}: {} instruction outside a programming session",
                    self.name, instruction.opcode
                )));
            }
        };
        if instruction.opcode == Opcode::Wait && expected == 0 && register == Register::PulseProgram {
            return Err(InstrumentError::State(
                "WAIT cannot be the first instruction of a pulse program".to_string(),
            ));
        }
        let encoded = instruction.encode()?;

        let operation = instruction.opcode.mnemonic();
        let raw = self.board_call(operation, |d| {
            d.write_instruction(
                encoded.flags,
                i32::from(encoded.opcode),
                i32::try_from(encoded.data).unwrap_or(i32::MAX),
                f64::from(encoded.duration_ns),
            )
        })?;
        let address = u32::try_from(raw).unwrap_or(u32::MAX);
        if address != expected {
            return Err(InstrumentError::AddressMismatch {
                instruction: operation.to_string(),
                expected,
                actual: address,
            });
        }
        debug!(
            instrument = %self.name,
            address,
            opcode = %instruction.opcode,
            flags = encoded.flags,
            data = encoded.data,
            duration_ns = encoded.duration_ns,
            "Instruction written"
        );
        if let State::Programming(session) = &mut self.state {
            session.instructions.push(ProgrammedInstruction {
                address,
                instruction,
            });
        }
        Ok(address)
    }

    /// CONTINUE: proceed to the next instruction.
    pub fn continue_inst(&mut self, flags: u32, shape: PulseShape, duration_ns: u64) -> Result<u32, InstrumentError> {
        self.emit(Instruction::new(Opcode::Continue, flags, shape, duration_ns, 0))
    }

    /// STOP: end execution.
    pub fn stop_inst(&mut self, flags: u32, shape: PulseShape, duration_ns: u64) -> Result<u32, InstrumentError> {
        self.emit(Instruction::new(Opcode::Stop, flags, shape, duration_ns, 0))
    }

    /// LOOP: begin a loop repeated `count` times.
    pub fn loop_inst(&mut self, flags: u32, shape: PulseShape, duration_ns: u64, count: u32) -> Result<u32, InstrumentError> {
        self.emit(Instruction::new(Opcode::Loop, flags, shape, duration_ns, count))
    }

    /// END_LOOP: jump back to the LOOP at `loop_address`.
    pub fn end_loop_inst(&mut self, flags: u32, shape: PulseShape, duration_ns: u64, loop_address: u32) -> Result<u32, InstrumentError> {
        self.emit(Instruction::new(Opcode::EndLoop, flags, shape, duration_ns, loop_address))
    }

    /// JSR: call the subroutine starting at `address`.
    pub fn jsr_inst(&mut self, flags: u32, shape: PulseShape, duration_ns: u64, address: u32) -> Result<u32, InstrumentError> {
        self.emit(Instruction::new(Opcode::Jsr, flags, shape, duration_ns, address))
    }

    /// RTS: return from a subroutine.
    pub fn rts_inst(&mut self, flags: u32, shape: PulseShape, duration_ns: u64) -> Result<u32, InstrumentError> {
        self.emit(Instruction::new(Opcode::Rts, flags, shape, duration_ns, 0))
    }

    /// BRANCH: jump to `address`.
    pub fn branch_inst(&mut self, flags: u32, shape: PulseShape, duration_ns: u64, address: u32) -> Result<u32, InstrumentError> {
        self.emit(Instruction::new(Opcode::Branch, flags, shape, duration_ns, address))
    }

    /// LONG_DELAY: hold for `duration_ns * multiplier`.
    pub fn long_delay_inst(&mut self, flags: u32, shape: PulseShape, duration_ns: u64, multiplier: u32) -> Result<u32, InstrumentError> {
        self.emit(Instruction::new(Opcode::LongDelay, flags, shape, duration_ns, multiplier))
    }

    /// WAIT: pause until the next trigger.
    pub fn wait_inst(&mut self, flags: u32, shape: PulseShape, duration_ns: u64) -> Result<u32, InstrumentError> {
        self.emit(Instruction::new(Opcode::Wait, flags, shape, duration_ns, 0))
    }

    // ─── Triggers ───────────────────────────────────────────────────

    /// Run from address 0, or resume a program paused at WAIT.
    pub fn start(&mut self) -> Result<(), InstrumentError> {
        self.ensure_idle("start")?;
        self.board_call("start", |d| d.start())?;
        info!(instrument = %self.name, "Started");
        Ok(())
    }

    /// Halt outputs and re-arm so the next `start` runs from address 0.
    pub fn stop(&mut self) -> Result<(), InstrumentError> {
        self.ensure_idle("stop")?;
        self.board_call("stop", |d| d.stop())?;
        info!(instrument = %self.name, "Stopped");
        Ok(())
    }

    /// Halt outputs and reset the sequencer core.
    pub fn reset_core(&mut self) -> Result<(), InstrumentError> {
        self.ensure_idle("reset")?;
        self.board_call("reset", |d| d.reset())?;
        info!(instrument = %self.name, "Core reset");
        Ok(())
    }
}

impl<D: SequencerDriver + 'static> Device for PulseSequencer<D> {
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
        self.connected
    }

    /// Select the board, initialize it and report the core clock.
    fn connect(&mut self) -> Result<(), InstrumentError> {
        if self.connected {
            return Err(InstrumentError::AlreadyConnected {
                instrument: self.name.clone(),
            });
        }
        self.board_call("init", |d| d.init())?;
        let clock = self.clock_mhz;
        if let Err(e) = self.board_call("core_clock", |d| d.core_clock(clock)) {
            if self.driver.close() < 0 {
                let message = self.driver.last_error();
                warn!(instrument = %self.name, error = %message, "Close after failed connect failed");
            }
            return Err(e);
        }
        self.connected = true;
        info!(instrument = %self.name, board = self.board, clock_mhz = clock, "Connected");
        Ok(())
    }

    /// Stop outputs and close the board. An open session is abandoned.
    fn disconnect(&mut self) -> Result<(), InstrumentError> {
        self.ensure_connected()?;
        if let State::Programming(session) = std::mem::replace(&mut self.state, State::Idle) {
            warn!(
                instrument = %self.name,
                register = %session.register,
                "Disconnecting with an open programming session"
            );
            self.board_call("stop_programming", |d| d.stop_programming())?;
        }
        self.board_call("stop", |d| d.stop())?;
        self.connected = false;
        self.board_call("close", |d| d.close())?;
        info!(instrument = %self.name, "Disconnected");
        Ok(())
    }

    fn reset(&mut self) -> Result<(), InstrumentError> {
        self.reset_core()
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
    use crate::builtin::builtin_catalog;
    use lab_common::error::InstructionField;
    use simulation::{DriverCall, RunState};

    fn sequencer() -> PulseSequencer<SimulatedSequencer> {
        let definition = builtin_catalog().unwrap().definition("pulse_sequencer").unwrap();
        let supplied = BTreeMap::from([
            (BOARD_PARAMETER.to_string(), Value::Int(0)),
            (CLOCK_PARAMETER.to_string(), Value::Float(100.0)),
        ]);
        PulseSequencer::new(
            InstrumentId::new(0),
            "pb",
            Arc::new(definition),
            supplied,
            SimulatedSequencer::new(1),
        )
        .unwrap()
    }

    fn connected() -> PulseSequencer<SimulatedSequencer> {
        let mut seq = sequencer();
        seq.connect().unwrap();
        seq.driver_mut().clear_calls();
        seq
    }

    #[test]
    fn connect_selects_initializes_and_sets_clock() {
        let mut seq = sequencer();
        seq.connect().unwrap();
        assert_eq!(
            seq.driver().calls(),
            &[
                DriverCall::SelectBoard(0),
                DriverCall::Init,
                DriverCall::SelectBoard(0),
                DriverCall::CoreClock(100.0),
            ]
        );
        assert!(seq.is_connected());
        assert!(matches!(seq.connect(), Err(InstrumentError::AlreadyConnected { .. })));
    }

    #[test]
    fn programming_requires_connection() {
        let mut seq = sequencer();
        let err = seq.start_programming(Register::PulseProgram).unwrap_err();
        assert_eq!(
            err,
            InstrumentError::NotConnected {
                instrument: "pb".to_string()
            }
        );
        assert!(seq.driver().calls().is_empty());
    }

    #[test]
    fn addresses_follow_call_order() {
        let mut seq = connected();
        seq.start_programming(Register::PulseProgram).unwrap();
        let addresses = [
            seq.continue_inst(0x1, PulseShape::On, 100).unwrap(),
            seq.loop_inst(0x2, PulseShape::Off, 200, 3).unwrap(),
            seq.continue_inst(0x3, PulseShape::OnePeriod, 50).unwrap(),
            seq.end_loop_inst(0x0, PulseShape::Off, 50, 1).unwrap(),
            seq.stop_inst(0x0, PulseShape::Off, 100).unwrap(),
        ];
        assert_eq!(addresses, [0, 1, 2, 3, 4]);

        let session = seq.stop_programming().unwrap();
        assert_eq!(session.register(), Register::PulseProgram);
        let recorded: Vec<u32> = session.instructions().iter().map(|p| p.address).collect();
        assert_eq!(recorded, vec![0, 1, 2, 3, 4]);
        assert_eq!(seq.driver().program(0, 0).len(), 5);
        assert!(!seq.is_programming());
    }

    #[test]
    fn flag_overflow_never_reaches_driver() {
        let mut seq = connected();
        seq.start_programming(Register::PulseProgram).unwrap();

        let err = seq.continue_inst(1 << 21, PulseShape::Off, 100).unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::FieldOverflow { field: InstructionField::Flags, .. }
        ));
        assert_eq!(seq.driver().instruction_writes(), 0);

        assert_eq!(seq.continue_inst((1 << 21) - 1, PulseShape::Off, 100).unwrap(), 0);
        assert_eq!(seq.driver().instruction_writes(), 1);
    }

    #[test]
    fn data_overflow_is_rejected() {
        let mut seq = connected();
        seq.start_programming(Register::PulseProgram).unwrap();
        let err = seq.loop_inst(0, PulseShape::Off, 100, 1 << 20).unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::FieldOverflow { field: InstructionField::Data, .. }
        ));
        assert_eq!(seq.driver().instruction_writes(), 0);
    }

    #[test]
    fn emitter_outside_session_fails() {
        let mut seq = connected();
        assert!(matches!(
            seq.continue_inst(0, PulseShape::Off, 100),
            Err(InstrumentError::State(_))
        ));
        assert_eq!(seq.driver().instruction_writes(), 0);
    }

    #[test]
    fn wait_cannot_open_a_pulse_program() {
        let mut seq = connected();
        seq.start_programming(Register::PulseProgram).unwrap();
        assert!(matches!(
            seq.wait_inst(0, PulseShape::Off, 100),
            Err(InstrumentError::State(_))
        ));
        assert_eq!(seq.driver().instruction_writes(), 0);
        seq.continue_inst(0, PulseShape::Off, 100).unwrap();
        assert_eq!(seq.wait_inst(0, PulseShape::Off, 100).unwrap(), 1);
    }

    #[test]
    fn second_start_programming_fails() {
        let mut seq = connected();
        seq.start_programming(Register::FrequencyRegs).unwrap();
        assert!(matches!(
            seq.start_programming(Register::PulseProgram),
            Err(InstrumentError::State(_))
        ));
        assert_eq!(seq.session().map(Session::register), Some(Register::FrequencyRegs));
    }

    #[test]
    fn triggers_only_when_idle() {
        let mut seq = connected();
        seq.start_programming(Register::PulseProgram).unwrap();
        assert!(matches!(seq.start(), Err(InstrumentError::State(_))));
        assert!(matches!(seq.reset(), Err(InstrumentError::State(_))));
        seq.stop_inst(0, PulseShape::Off, 100).unwrap();
        seq.stop_programming().unwrap();

        seq.start().unwrap();
        assert_eq!(seq.driver().run_state(0), Some(RunState::Running));
        seq.stop().unwrap();
        assert_eq!(seq.driver().run_state(0), Some(RunState::Armed));
        assert_eq!(seq.driver().reset_count(0), 0);
        seq.reset().unwrap();
        assert_eq!(seq.driver().reset_count(0), 1);
    }

    #[test]
    fn negative_address_carries_driver_text() {
        let mut seq = connected();
        seq.start_programming(Register::PulseProgram).unwrap();
        seq.driver_mut().fail_next("write_instruction", "fifo full");
        let err = seq.continue_inst(0, PulseShape::Off, 100).unwrap_err();
        assert_eq!(
            err,
            InstrumentError::Driver {
                operation: "CONTINUE".to_string(),
                board: 0,
                code: -1,
                message: "fifo full".to_string(),
            }
        );
        assert!(seq.session().is_some_and(|s| s.instructions().is_empty()));
    }

    #[test]
    fn unexpected_address_is_reported() {
        let mut seq = connected();
        seq.start_programming(Register::PulseProgram).unwrap();
        seq.driver_mut().skew_addresses(1);
        let err = seq.continue_inst(0, PulseShape::Off, 100).unwrap_err();
        assert_eq!(
            err,
            InstrumentError::AddressMismatch {
                instruction: "CONTINUE".to_string(),
                expected: 0,
                actual: 1,
            }
        );
    }

    #[test]
    fn disconnect_stops_and_closes() {
        let mut seq = connected();
        seq.disconnect().unwrap();
        assert_eq!(
            seq.driver().calls(),
            &[
                DriverCall::SelectBoard(0),
                DriverCall::Stop,
                DriverCall::SelectBoard(0),
                DriverCall::Close,
            ]
        );
        assert!(!seq.is_connected());
        assert!(matches!(seq.disconnect(), Err(InstrumentError::NotConnected { .. })));
    }

    #[test]
    fn disconnect_abandons_open_session() {
        let mut seq = connected();
        seq.start_programming(Register::PulseProgram).unwrap();
        seq.disconnect().unwrap();
        assert!(!seq.is_programming());
        assert!(seq.driver().calls().contains(&DriverCall::StopProgramming));
    }

    #[test]
    fn board_number_locked_while_connected() {
        let mut seq = connected();
        assert!(matches!(
            seq.set_parameter(BOARD_PARAMETER, Value::Int(1)),
            Err(InstrumentError::State(_))
        ));
        seq.disconnect().unwrap();
        seq.set_parameter(BOARD_PARAMETER, Value::Int(1)).unwrap();
        assert_eq!(seq.board(), 1);
        assert!(matches!(
            seq.set_parameter(CLOCK_PARAMETER, Value::Float(-1.0)),
            Err(InstrumentError::Parameter(ParameterError::Invalid { .. }))
        ));
        assert_eq!(seq.clock_mhz(), 100.0);
    }

    #[test]
    fn failed_clock_setup_closes_board() {
        let mut seq = sequencer();
        seq.driver_mut().fail_next("core_clock", "PLL did not lock");
        assert!(matches!(seq.connect(), Err(InstrumentError::Driver { .. })));
        assert!(!seq.is_connected());
        assert!(!seq.driver().is_initialized(0));
        assert_eq!(seq.driver().calls().last(), Some(&DriverCall::Close));

        seq.connect().unwrap();
        assert!(seq.driver().is_initialized(0));
        assert_eq!(seq.driver().clock_mhz(0), Some(seq.clock_mhz()));
    }

    #[test]
    fn count_boards_reports_driver_total() {
        let mut seq = sequencer();
        assert_eq!(seq.count_boards().unwrap(), 1);
        seq.driver_mut().fail_next("count_boards", "driver not loaded");
        assert!(matches!(seq.count_boards(), Err(InstrumentError::Driver { .. })));
    }
}
