//! Instruction encoding and bit-width checks.
//!
//! | Field    | Width | Notes                                   |
//! |----------|-------|-----------------------------------------|
//! | flags    | 21    | one bit per output                      |
//! | shape    | 3     | packed into bits 21..24 of the flag word |
//! | data     | 20    | loop count, address or delay multiplier |
//! | duration | 32    | nanoseconds                             |
//!
//! All checks run in [`Instruction::encode`], before anything reaches a driver.

use super::opcode::{Opcode, PulseShape};
use lab_common::consts::{DURATION_WIDTH, FLAGS_WIDTH, INST_DATA_WIDTH, field_limit};
use lab_common::error::{InstructionField, InstrumentError};

/// One symbolic sequencer instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Operation.
    pub opcode: Opcode,
    /// Output flags, one bit per channel.
    pub flags: u32,
    /// Duty pattern applied to the flags.
    pub shape: PulseShape,
    /// Opcode-specific data.
    pub data: u32,
    /// Duration in nanoseconds.
    pub duration_ns: u64,
}

/// An instruction packed into driver-ready fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedInstruction {
    /// `flags | shape << 21`.
    pub flags: u32,
    /// Numeric opcode.
    pub opcode: u8,
    /// Data field.
    pub data: u32,
    /// Duration in nanoseconds.
    pub duration_ns: u32,
}

impl Instruction {
    /// Build an instruction.
    pub const fn new(opcode: Opcode, flags: u32, shape: PulseShape, duration_ns: u64, data: u32) -> Self {
        Self {
            opcode,
            flags,
            shape,
            data,
            duration_ns,
        }
    }

    /// Check every field width and pack.
    ///
    /// # Errors
    ///
    /// `InstrumentError::FieldOverflow` naming the first field that does
    /// not fit, checked in the order flags, data, duration.
    pub fn encode(&self) -> Result<EncodedInstruction, InstrumentError> {
        let flags = self.check(InstructionField::Flags, u64::from(self.flags), FLAGS_WIDTH)?;
        let data = self.check(InstructionField::Data, u64::from(self.data), INST_DATA_WIDTH)?;
        let duration = self.check(InstructionField::Duration, self.duration_ns, DURATION_WIDTH)?;
        Ok(EncodedInstruction {
            flags: flags | self.shape.mask(),
            opcode: self.opcode.code(),
            data,
            duration_ns: duration,
        })
    }

    fn check(&self, field: InstructionField, value: u64, width: u32) -> Result<u32, InstrumentError> {
        if value < field_limit(width) {
            if let Ok(v) = u32::try_from(value) {
                return Ok(v);
            }
        }
        Err(InstrumentError::FieldOverflow {
            instruction: self.opcode.mnemonic().to_string(),
            field,
            value,
            width,
        })
    }
}
