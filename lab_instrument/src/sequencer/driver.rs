//! Native pulse-sequencer call surface.
//!
//! Mirrors the vendor library one call per method. Every method returns the
//! raw status: negative means failure, and [`SequencerDriver::last_error`]
//! describes it. `write_instruction` returns the assigned address instead.
//! Turning statuses into errors is left to [`super::PulseSequencer`].

/// Fixed call table of a pulse-sequencer driver.
pub trait SequencerDriver: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Number of boards present, negative on error.
    fn count_boards(&mut self) -> i32;

    /// Direct subsequent calls to `board`.
    fn select_board(&mut self, board: i32) -> i32;

    /// Initialize the selected board.
    fn init(&mut self) -> i32;

    /// Tell the library the core clock in MHz.
    fn core_clock(&mut self, clock_mhz: f64) -> i32;

    /// End communication with the selected board.
    fn close(&mut self) -> i32;

    /// Begin programming the on-board device `register`.
    fn start_programming(&mut self, register: i32) -> i32;

    /// Finish the current programming session.
    fn stop_programming(&mut self) -> i32;

    /// Software trigger: run from address 0 or resume from WAIT.
    fn start(&mut self) -> i32;

    /// Halt outputs and re-arm for a restart at address 0.
    fn stop(&mut self) -> i32;

    /// Halt outputs and reset the core.
    fn reset(&mut self) -> i32;

    /// Append one instruction; returns its address or a negative status.
    fn write_instruction(&mut self, flags: u32, opcode: i32, data: i32, duration_ns: f64) -> i32;

    /// Description of the most recent failure.
    fn last_error(&mut self) -> String;
}

impl<D: SequencerDriver + ?Sized> SequencerDriver for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn count_boards(&mut self) -> i32 {
        (**self).count_boards()
    }

    fn select_board(&mut self, board: i32) -> i32 {
        (**self).select_board(board)
    }

    fn init(&mut self) -> i32 {
        (**self).init()
    }

    fn core_clock(&mut self, clock_mhz: f64) -> i32 {
        (**self).core_clock(clock_mhz)
    }

    fn close(&mut self) -> i32 {
        (**self).close()
    }

    fn start_programming(&mut self, register: i32) -> i32 {
        (**self).start_programming(register)
    }

    fn stop_programming(&mut self) -> i32 {
        (**self).stop_programming()
    }

    fn start(&mut self) -> i32 {
        (**self).start()
    }

    fn stop(&mut self) -> i32 {
        (**self).stop()
    }

    fn reset(&mut self) -> i32 {
        (**self).reset()
    }

    fn write_instruction(&mut self, flags: u32, opcode: i32, data: i32, duration_ns: f64) -> i32 {
        (**self).write_instruction(flags, opcode, data, duration_ns)
    }

    fn last_error(&mut self) -> String {
        (**self).last_error()
    }
}
