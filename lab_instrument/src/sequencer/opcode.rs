//! Symbolic names of the sequencer's instruction set.
//!
//! - [`Opcode`] - flow-control operation of one instruction
//! - [`PulseShape`] - 3-bit output duty pattern packed above the flags
//! - [`Register`] - on-board device selected by `start_programming`

use lab_common::consts::{MAX_OPCODE, PULSE_SHIFT};
use std::fmt;
use std::str::FromStr;
use static_assertions::const_assert_eq;
use thiserror::Error;

/// A name that is not part of the instruction set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} \"{name}\"")]
pub struct UnknownName {
    /// What was being looked up.
    pub kind: &'static str,
    /// The offending name.
    pub name: String,
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_uppercase().replace('-', "_")
}

// ─── Opcode ─────────────────────────────────────────────────────────

/// Flow-control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continue to the next instruction.
    Continue = 0,
    /// Stop execution.
    Stop = 1,
    /// Begin a loop; data is the repeat count.
    Loop = 2,
    /// End a loop; data is the address of the matching LOOP.
    EndLoop = 3,
    /// Jump to a subroutine; data is its first address.
    Jsr = 4,
    /// Return from a subroutine.
    Rts = 5,
    /// Jump; data is the target address.
    Branch = 6,
    /// Repeat this instruction's duration; data is the multiplier.
    LongDelay = 7,
    /// Pause until a trigger.
    Wait = 8,
}

const_assert_eq!(Opcode::Wait as u8, MAX_OPCODE);

impl Opcode {
    /// Every opcode in numeric order.
    pub const ALL: [Opcode; 9] = [
        Self::Continue,
        Self::Stop,
        Self::Loop,
        Self::EndLoop,
        Self::Jsr,
        Self::Rts,
        Self::Branch,
        Self::LongDelay,
        Self::Wait,
    ];

    /// Numeric opcode sent to the driver.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Upper-case mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::Stop => "STOP",
            Self::Loop => "LOOP",
            Self::EndLoop => "END_LOOP",
            Self::Jsr => "JSR",
            Self::Rts => "RTS",
            Self::Branch => "BRANCH",
            Self::LongDelay => "LONG_DELAY",
            Self::Wait => "WAIT",
        }
    }

    /// True if the data field holds an instruction address.
    pub const fn takes_address(self) -> bool {
        matches!(self, Self::EndLoop | Self::Jsr | Self::Branch)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for Opcode {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = normalize(s);
        let name = if name == "ENDLOOP" { "END_LOOP".to_string() } else { name };
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic() == name)
            .ok_or_else(|| UnknownName {
                kind: "opcode",
                name: s.to_string(),
            })
    }
}

// ─── PulseShape ─────────────────────────────────────────────────────

/// Output duty pattern for the flags of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PulseShape {
    /// Outputs follow the flags for the full duration.
    #[default]
    Off,
    /// One clock period.
    OnePeriod,
    /// Two clock periods.
    TwoPeriod,
    /// Three clock periods.
    ThreePeriod,
    /// Four clock periods.
    FourPeriod,
    /// Five clock periods.
    FivePeriod,
    /// Always on.
    On,
}

impl PulseShape {
    /// Every shape.
    pub const ALL: [PulseShape; 7] = [
        Self::Off,
        Self::OnePeriod,
        Self::TwoPeriod,
        Self::ThreePeriod,
        Self::FourPeriod,
        Self::FivePeriod,
        Self::On,
    ];

    /// 3-bit shape code.
    pub const fn code(self) -> u32 {
        match self {
            Self::Off => 0,
            Self::OnePeriod => 1,
            Self::TwoPeriod => 2,
            Self::ThreePeriod => 3,
            Self::FourPeriod => 4,
            Self::FivePeriod => 5,
            Self::On => 7,
        }
    }

    /// Code shifted into bits 21..24 of the flag word.
    pub const fn mask(self) -> u32 {
        self.code() << PULSE_SHIFT
    }

    /// Upper-case name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::OnePeriod => "ONE_PERIOD",
            Self::TwoPeriod => "TWO_PERIOD",
            Self::ThreePeriod => "THREE_PERIOD",
            Self::FourPeriod => "FOUR_PERIOD",
            Self::FivePeriod => "FIVE_PERIOD",
            Self::On => "ON",
        }
    }
}

impl fmt::Display for PulseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PulseShape {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = normalize(s);
        Self::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| UnknownName {
                kind: "pulse shape",
                name: s.to_string(),
            })
    }
}

// ─── Register ───────────────────────────────────────────────────────

/// On-board device that a programming session targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Register {
    /// The pulse program memory.
    #[default]
    PulseProgram,
    /// DDS frequency registers.
    FrequencyRegs,
    /// TX phase registers (alias `PHASE_REGS_1`).
    TxPhaseRegs,
    /// RX phase registers (alias `PHASE_REGS_0`).
    RxPhaseRegs,
    /// Sine phase registers.
    SinPhaseRegs,
    /// Cosine phase registers.
    CosPhaseRegs,
}

impl Register {
    /// Device id passed to `start_programming`.
    pub const fn id(self) -> i32 {
        match self {
            Self::PulseProgram => 0,
            Self::FrequencyRegs => 1,
            Self::TxPhaseRegs => 2,
            Self::RxPhaseRegs => 3,
            Self::SinPhaseRegs => 50,
            Self::CosPhaseRegs => 51,
        }
    }

    /// Canonical name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::PulseProgram => "PULSE_PROGRAM",
            Self::FrequencyRegs => "FREQ_REGS",
            Self::TxPhaseRegs => "TX_PHASE_REGS",
            Self::RxPhaseRegs => "RX_PHASE_REGS",
            Self::SinPhaseRegs => "SIN_PHASE_REGS",
            Self::CosPhaseRegs => "COS_PHASE_REGS",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Register {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "PULSE_PROGRAM" => Ok(Self::PulseProgram),
            "FREQ_REGS" => Ok(Self::FrequencyRegs),
            "PHASE_REGS" | "TX_PHASE_REGS" | "PHASE_REGS_1" => Ok(Self::TxPhaseRegs),
            "RX_PHASE_REGS" | "PHASE_REGS_0" => Ok(Self::RxPhaseRegs),
            "SIN_PHASE_REGS" => Ok(Self::SinPhaseRegs),
            "COS_PHASE_REGS" => Ok(Self::CosPhaseRegs),
            _ => Err(UnknownName {
                kind: "register",
                name: s.to_string(),
            }),
        }
    }
}
