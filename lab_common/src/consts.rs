//! System-wide constants for the lab workspace.
//!
//! Single source of truth for the pulse-sequencer field widths and the
//! well-known parameter names. Imported by all crates.

use static_assertions::const_assert;

/// Width of the output flag field of a sequencer instruction.
pub const FLAGS_WIDTH: u32 = 21;

/// Width of the opcode-specific data field (loop count, jump address, delay multiplier).
pub const INST_DATA_WIDTH: u32 = 20;

/// Width of the duration field, in nanoseconds.
pub const DURATION_WIDTH: u32 = 32;

/// Bit position of the pulse-shape code inside the packed flag word.
pub const PULSE_SHIFT: u32 = 21;

/// Width of the pulse-shape code.
pub const PULSE_WIDTH: u32 = 3;

/// Highest opcode value understood by the sequencer core.
pub const MAX_OPCODE: u8 = 8;

/// Status code reported by an instrument with an empty error register.
pub const NO_ERROR: i64 = 0;

/// Parameter carrying the bus address of a bus instrument.
pub const ADDRESS_PARAMETER: &str = "address";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/labctl/lab.toml";

// Pulse shape sits directly above the flags and the packed word is a C `unsigned int`.
const_assert!(PULSE_SHIFT == FLAGS_WIDTH);
const_assert!(PULSE_SHIFT + PULSE_WIDTH <= 32);
const_assert!(INST_DATA_WIDTH < 32);

/// Exclusive upper bound of a `width`-bit unsigned field.
#[inline]
pub const fn field_limit(width: u32) -> u64 {
    1u64 << width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_limits_match_hardware_widths() {
        assert_eq!(field_limit(FLAGS_WIDTH), 0x20_0000);
        assert_eq!(field_limit(INST_DATA_WIDTH), 0x10_0000);
        assert_eq!(field_limit(DURATION_WIDTH), u32::MAX as u64 + 1);
    }

    #[test]
    fn pulse_code_fits_above_flags() {
        let top = (field_limit(PULSE_WIDTH) - 1) << PULSE_SHIFT;
        assert_eq!(top & (field_limit(FLAGS_WIDTH) - 1), 0);
        assert!(top <= u32::MAX as u64);
    }
}
