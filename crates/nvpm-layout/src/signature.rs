//! Instruction signatures and scan outcomes.

use std::fmt;

use nvpm_x86::Instruction;

use crate::Field;

/// Default number of instructions decoded before giving up.
pub const DEFAULT_BUDGET: usize = 128;

/// Shape of the one instruction that touches a field.
///
/// Matching compares opcode, ModRM reg and the extended rm (REX.B folded in)
/// and ignores the displacement, which is the value being discovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSignature {
    pub field: Field,
    /// First opcode byte (0x0F for two-byte opcodes).
    pub opcode: u8,
    pub reg: u8,
    /// rm with REX.B as bit 3 (0..=15).
    pub rm: u8,
    /// Added to the displacement to get the field offset.
    pub adjustment: i32,
    /// Maximum instructions to decode.
    pub budget: usize,
}

impl FieldSignature {
    pub const fn new(field: Field, opcode: u8, reg: u8, rm: u8) -> Self {
        Self {
            field,
            opcode,
            reg,
            rm,
            adjustment: 0,
            budget: DEFAULT_BUDGET,
        }
    }

    #[must_use]
    pub const fn with_adjustment(mut self, adjustment: i32) -> Self {
        self.adjustment = adjustment;
        self
    }

    #[must_use]
    pub const fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Whether `instr` is the instruction this signature describes.
    pub fn matches(&self, instr: &Instruction) -> bool {
        instr.opcode == self.opcode
            && instr.has_memory_operand()
            && instr.reg() == Some(self.reg)
            && instr.rm_ext() == Some(self.rm)
    }

    /// Apply the adjustment. Negative results are not valid offsets.
    pub fn offset_from(&self, disp: i32) -> Option<u32> {
        u32::try_from(i64::from(disp) + i64::from(self.adjustment)).ok()
    }
}

impl fmt::Display for FieldSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (op={:02x} reg={} rm={}",
            self.field, self.opcode, self.reg, self.rm
        )?;
        if self.adjustment != 0 {
            write!(f, " adj={:+}", self.adjustment)?;
        }
        write!(f, " budget={})", self.budget)
    }
}

/// Outcome of probing for a field offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    /// Offset found. Zero is a valid offset.
    Resolved(u32),
    /// Code was scanned but no instruction matched within the budget.
    NotFound,
    /// No code to scan: the function could not be located.
    NotAttempted,
}

impl Probe {
    pub const fn offset(self) -> Option<u32> {
        match self {
            Self::Resolved(offset) => Some(offset),
            Self::NotFound | Self::NotAttempted => None,
        }
    }

    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(offset) => write!(f, "resolved {offset:#x}"),
            Self::NotFound => f.write_str("not found"),
            Self::NotAttempted => f.write_str("not attempted"),
        }
    }
}
