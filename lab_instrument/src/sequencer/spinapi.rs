//! Binding to the vendor SpinAPI library.
//!
//! Only built with the `spinapi` feature. The library keeps a single
//! process-wide "selected board", so the sequencer selects its board before
//! every board-level call.

use super::driver::SequencerDriver;
use libc::{c_char, c_double, c_int, c_uint};
use std::ffi::CStr;

#[link(name = "spinapi")]
unsafe extern "C" {
    fn pb_count_boards() -> c_int;
    fn pb_select_board(board: c_int) -> c_int;
    fn pb_init() -> c_int;
    fn pb_core_clock(clock_freq: c_double);
    fn pb_close() -> c_int;
    fn pb_start_programming(device: c_int) -> c_int;
    fn pb_stop_programming() -> c_int;
    fn pb_start() -> c_int;
    fn pb_stop() -> c_int;
    fn pb_reset() -> c_int;
    fn pb_inst_pbonly(flags: c_uint, inst: c_int, inst_data: c_int, length: c_double) -> c_int;
    fn pb_get_error() -> *const c_char;
}

/// Driver backed by `libspinapi`.
#[derive(Debug, Default)]
pub struct SpinApiDriver {
    _private: (),
}

impl SpinApiDriver {
    /// Handle to the linked library.
    pub fn new() -> Self {
        Self::default()
    }
}

// SAFETY (all calls below): the functions take plain integers/doubles, have no
// pointer arguments and are declared with the signatures of spinapi.h.
impl SequencerDriver for SpinApiDriver {
    fn name(&self) -> &'static str {
        "spinapi"
    }

    fn count_boards(&mut self) -> i32 {
        unsafe { pb_count_boards() }
    }

    fn select_board(&mut self, board: i32) -> i32 {
        unsafe { pb_select_board(board) }
    }

    fn init(&mut self) -> i32 {
        unsafe { pb_init() }
    }

    fn core_clock(&mut self, clock_mhz: f64) -> i32 {
        unsafe { pb_core_clock(clock_mhz) };
        0
    }

    fn close(&mut self) -> i32 {
        unsafe { pb_close() }
    }

    fn start_programming(&mut self, register: i32) -> i32 {
        unsafe { pb_start_programming(register) }
    }

    fn stop_programming(&mut self) -> i32 {
        unsafe { pb_stop_programming() }
    }

    fn start(&mut self) -> i32 {
        unsafe { pb_start() }
    }

    fn stop(&mut self) -> i32 {
        unsafe { pb_stop() }
    }

    fn reset(&mut self) -> i32 {
        unsafe { pb_reset() }
    }

    fn write_instruction(&mut self, flags: u32, opcode: i32, data: i32, duration_ns: f64) -> i32 {
        unsafe { pb_inst_pbonly(flags, opcode, data, duration_ns) }
    }

    fn last_error(&mut self) -> String {
        // SAFETY: pb_get_error returns a pointer to a static NUL-terminated
        // buffer owned by the library; it is copied out immediately.
        let ptr = unsafe { pb_get_error() };
        if ptr.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}
