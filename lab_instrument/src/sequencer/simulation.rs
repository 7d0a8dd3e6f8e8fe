//! Simulated pulse sequencer.
//!
//! Behaves like a bank of boards behind the vendor library: a selected board
//! must be initialized before programming, instructions receive consecutive
//! addresses per session, and misuse returns a negative status with a
//! readable `last_error`. Every call is logged so tests can assert exactly
//! what reached the "hardware".

use super::driver::SequencerDriver;
use std::collections::HashMap;
use tracing::trace;

/// One driver call as seen by the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    /// `count_boards()`
    CountBoards,
    /// `select_board(n)`
    SelectBoard(i32),
    /// `init()`
    Init,
    /// `core_clock(mhz)`
    CoreClock(f64),
    /// `close()`
    Close,
    /// `start_programming(register)`
    StartProgramming(i32),
    /// `stop_programming()`
    StopProgramming,
    /// `start()`
    Start,
    /// `stop()`
    Stop,
    /// `reset()`
    Reset,
    /// `write_instruction(flags, opcode, data, duration)`
    WriteInstruction {
        /// Packed flag word.
        flags: u32,
        /// Opcode.
        opcode: i32,
        /// Data field.
        data: i32,
        /// Duration in nanoseconds.
        duration_ns: f64,
    },
}

/// Instruction stored in simulated program memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredInstruction {
    /// Packed flag word.
    pub flags: u32,
    /// Opcode.
    pub opcode: i32,
    /// Data field.
    pub data: i32,
    /// Duration in nanoseconds.
    pub duration_ns: f64,
}

/// Run state of a simulated board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Armed; `start` runs from address 0.
    #[default]
    Armed,
    /// Executing.
    Running,
}

#[derive(Debug, Default)]
struct Board {
    initialized: bool,
    clock_mhz: Option<f64>,
    programming: Option<i32>,
    memory: HashMap<i32, Vec<StoredInstruction>>,
    run_state: RunState,
    resets: usize,
}

/// In-process stand-in for the native driver.
#[derive(Debug)]
pub struct SimulatedSequencer {
    boards: Vec<Board>,
    selected: Option<usize>,
    calls: Vec<DriverCall>,
    last_error: String,
    faults: HashMap<&'static str, String>,
    address_skew: i32,
}

impl SimulatedSequencer {
    /// Simulate `boards` boards.
    pub fn new(boards: usize) -> Self {
        Self {
            boards: (0..boards).map(|_| Board::default()).collect(),
            selected: None,
            calls: Vec::new(),
            last_error: "No Error".to_string(),
            faults: HashMap::new(),
            address_skew: 0,
        }
    }

    /// Make the next call to `operation` fail with `message`.
    ///
    /// `operation` is the driver method name, e.g. `"init"`.
    pub fn fail_next(&mut self, operation: &'static str, message: impl Into<String>) {
        self.faults.insert(operation, message.into());
    }

    /// Offset every returned address by `skew`, as a misbehaving board would.
    pub fn skew_addresses(&mut self, skew: i32) {
        self.address_skew = skew;
    }

    /// Calls received so far.
    pub fn calls(&self) -> &[DriverCall] {
        &self.calls
    }

    /// Number of `write_instruction` calls received.
    pub fn instruction_writes(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, DriverCall::WriteInstruction { .. }))
            .count()
    }

    /// Forget the call log.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Program memory of `register` on `board`.
    pub fn program(&self, board: usize, register: i32) -> &[StoredInstruction] {
        self.boards
            .get(board)
            .and_then(|b| b.memory.get(&register))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Run state of `board`.
    pub fn run_state(&self, board: usize) -> Option<RunState> {
        self.boards.get(board).map(|b| b.run_state)
    }

    /// How often `board` was reset.
    pub fn reset_count(&self, board: usize) -> usize {
        self.boards.get(board).map_or(0, |b| b.resets)
    }

    /// Whether `board` is initialized.
    pub fn is_initialized(&self, board: usize) -> bool {
        self.boards.get(board).is_some_and(|b| b.initialized)
    }

    /// Core clock last reported for `board`.
    pub fn clock_mhz(&self, board: usize) -> Option<f64> {
        self.boards.get(board).and_then(|b| b.clock_mhz)
    }

    fn fail(&mut self, message: impl Into<String>) -> i32 {
        self.last_error = message.into();
        trace!(error = %self.last_error, "Simulated driver failure");
        -1
    }

    fn ok(&mut self) -> i32 {
        self.last_error = "No Error".to_string();
        0
    }

    fn injected(&mut self, operation: &'static str) -> Option<i32> {
        let message = self.faults.remove(operation)?;
        Some(self.fail(message))
    }

    /// Apply `f` to the selected, initialized board.
    fn with_board(&mut self, operation: &'static str, f: impl FnOnce(&mut Board) -> Result<i32, String>) -> i32 {
        if let Some(code) = self.injected(operation) {
            return code;
        }
        let Some(index) = self.selected else {
            return self.fail("no board selected");
        };
        let Some(board) = self.boards.get_mut(index) else {
            return self.fail(format!("board {index} does not exist"));
        };
        if !board.initialized {
            return self.fail("board not initialized");
        }
        match f(board) {
            Ok(code) => {
                self.last_error = "No Error".to_string();
                code
            }
            Err(message) => self.fail(message),
        }
    }
}

impl Default for SimulatedSequencer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SequencerDriver for SimulatedSequencer {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn count_boards(&mut self) -> i32 {
        self.calls.push(DriverCall::CountBoards);
        if let Some(code) = self.injected("count_boards") {
            return code;
        }
        i32::try_from(self.boards.len()).unwrap_or(i32::MAX)
    }

    fn select_board(&mut self, board: i32) -> i32 {
        self.calls.push(DriverCall::SelectBoard(board));
        if let Some(code) = self.injected("select_board") {
            return code;
        }
        match usize::try_from(board).ok().filter(|b| *b < self.boards.len()) {
            Some(index) => {
                self.selected = Some(index);
                self.ok()
            }
            None => self.fail(format!("board {board} does not exist")),
        }
    }

    fn init(&mut self) -> i32 {
        self.calls.push(DriverCall::Init);
        if let Some(code) = self.injected("init") {
            return code;
        }
        let Some(board) = self.selected.and_then(|i| self.boards.get_mut(i)) else {
            return self.fail("no board selected");
        };
        board.initialized = true;
        self.ok()
    }

    fn core_clock(&mut self, clock_mhz: f64) -> i32 {
        self.calls.push(DriverCall::CoreClock(clock_mhz));
        self.with_board("core_clock", |b| {
            b.clock_mhz = Some(clock_mhz);
            Ok(0)
        })
    }

    fn close(&mut self) -> i32 {
        self.calls.push(DriverCall::Close);
        self.with_board("close", |b| {
            b.initialized = false;
            b.programming = None;
            Ok(0)
        })
    }

    fn start_programming(&mut self, register: i32) -> i32 {
        self.calls.push(DriverCall::StartProgramming(register));
        self.with_board("start_programming", |b| {
            if b.programming.is_some() {
                return Err("already programming".to_string());
            }
            b.programming = Some(register);
            b.memory.insert(register, Vec::new());
            Ok(0)
        })
    }

    fn stop_programming(&mut self) -> i32 {
        self.calls.push(DriverCall::StopProgramming);
        self.with_board("stop_programming", |b| {
            b.programming
                .take()
                .map(|_| 0)
                .ok_or_else(|| "not programming".to_string())
        })
    }

    fn start(&mut self) -> i32 {
        self.calls.push(DriverCall::Start);
        self.with_board("start", |b| {
            b.run_state = RunState::Running;
            Ok(0)
        })
    }

    fn stop(&mut self) -> i32 {
        self.calls.push(DriverCall::Stop);
        self.with_board("stop", |b| {
            b.run_state = RunState::Armed;
            Ok(0)
        })
    }

    fn reset(&mut self) -> i32 {
        self.calls.push(DriverCall::Reset);
        self.with_board("reset", |b| {
            b.run_state = RunState::Armed;
            b.resets += 1;
            Ok(0)
        })
    }

    fn write_instruction(&mut self, flags: u32, opcode: i32, data: i32, duration_ns: f64) -> i32 {
        self.calls.push(DriverCall::WriteInstruction {
            flags,
            opcode,
            data,
            duration_ns,
        });
        let skew = self.address_skew;
        self.with_board("write_instruction", |b| {
            let register = b.programming.ok_or_else(|| "not programming".to_string())?;
            let memory = b.memory.entry(register).or_default();
            memory.push(StoredInstruction {
                flags,
                opcode,
                data,
                duration_ns,
            });
            let address = i32::try_from(memory.len() - 1).map_err(|e| e.to_string())?;
            Ok(address + skew)
        })
    }

    fn last_error(&mut self) -> String {
        self.last_error.clone()
    }
}
