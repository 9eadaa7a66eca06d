//! Decoded instruction types.

use std::fmt;

use thiserror::Error;

/// Architectural upper bound on instruction length.
pub const MAX_INSTRUCTION_LEN: usize = 15;

/// Decode failures. Any of these ends a code scan.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("instruction truncated at byte {offset}")]
    Truncated { offset: usize },
    #[error("invalid opcode {opcode:#04x} in 64-bit mode")]
    InvalidOpcode { opcode: u8 },
    #[error("invalid opcode 0f {opcode:#04x}")]
    InvalidSecondaryOpcode { opcode: u8 },
    #[error("VEX/EVEX encoded instruction (prefix {prefix:#04x}) not supported")]
    VexUnsupported { prefix: u8 },
    #[error("instruction exceeds 15 bytes")]
    TooLong,
}

/// Legacy prefixes seen before the opcode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Prefixes {
    /// 0x66
    pub operand_size: bool,
    /// 0x67
    pub address_size: bool,
    /// 0xF0
    pub lock: bool,
    /// 0xF3
    pub rep: bool,
    /// 0xF2
    pub repne: bool,
    /// Segment override byte, if any.
    pub segment: Option<u8>,
}

/// ModRM byte split into fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModRm {
    /// Addressing mode (0..=3). 3 is register-direct.
    pub mode: u8,
    /// Register / opcode extension field, without REX.R.
    pub reg: u8,
    /// Register / memory field, without REX.B.
    pub rm: u8,
}

impl ModRm {
    #[inline]
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            mode: byte >> 6,
            reg: (byte >> 3) & 0x7,
            rm: byte & 0x7,
        }
    }

    /// Whether the operand is a memory reference.
    #[inline]
    pub const fn is_memory(&self) -> bool {
        self.mode != 3
    }
}

/// One decoded instruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Instruction {
    /// Total encoded length in bytes.
    pub len: u8,
    pub prefixes: Prefixes,
    /// REX byte, or 0 when absent.
    pub rex: u8,
    /// First opcode byte (0x0F for escaped opcodes).
    pub opcode: u8,
    /// Second opcode byte after a 0x0F escape.
    pub opcode2: Option<u8>,
    /// Third opcode byte after 0x0F 0x38 / 0x0F 0x3A.
    pub opcode3: Option<u8>,
    pub modrm: Option<ModRm>,
    pub sib: Option<u8>,
    /// Displacement, sign-extended to 32 bits. Zero when absent.
    pub disp: i32,
    /// Displacement width in bytes (0, 1 or 4).
    pub disp_size: u8,
    /// Immediate bytes, little-endian, truncated to 64 bits.
    pub imm: u64,
    /// Immediate width in bytes.
    pub imm_size: u8,
}

impl Instruction {
    #[inline]
    pub const fn rex_w(&self) -> bool {
        self.rex & 0x8 != 0
    }

    #[inline]
    pub const fn rex_r(&self) -> bool {
        self.rex & 0x4 != 0
    }

    #[inline]
    pub const fn rex_x(&self) -> bool {
        self.rex & 0x2 != 0
    }

    #[inline]
    pub const fn rex_b(&self) -> bool {
        self.rex & 0x1 != 0
    }

    /// ModRM reg field (REX.R not applied).
    pub fn reg(&self) -> Option<u8> {
        self.modrm.map(|m| m.reg)
    }

    /// ModRM rm field (REX.B not applied).
    pub fn rm(&self) -> Option<u8> {
        self.modrm.map(|m| m.rm)
    }

    /// ModRM rm field with REX.B folded in as bit 3 (0..=15).
    pub fn rm_ext(&self) -> Option<u8> {
        self.modrm.map(|m| m.rm | (u8::from(self.rex_b()) << 3))
    }

    /// Whether the ModRM operand references memory.
    pub fn has_memory_operand(&self) -> bool {
        self.modrm.is_some_and(|m| m.is_memory())
    }

    /// RIP-relative addressing (mod 00, rm 101).
    pub fn is_rip_relative(&self) -> bool {
        self.modrm.is_some_and(|m| m.mode == 0 && m.rm == 5)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op={:02x}", self.opcode)?;
        if let Some(op2) = self.opcode2 {
            write!(f, " {op2:02x}")?;
        }
        if let Some(op3) = self.opcode3 {
            write!(f, " {op3:02x}")?;
        }
        if let Some(m) = self.modrm {
            write!(f, " mod={} reg={} rm={}", m.mode, m.reg, m.rm)?;
            if self.rex_b() {
                write!(f, " (rm.ext={})", m.rm | 8)?;
            }
        }
        if self.disp_size > 0 {
            if self.disp < 0 {
                write!(f, " disp=-{:#x}", self.disp.unsigned_abs())?;
            } else {
                write!(f, " disp={:#x}", self.disp)?;
            }
        }
        if self.imm_size > 0 {
            write!(f, " imm={:#x}", self.imm)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modrm_split() {
        let m = ModRm::from_byte(0x87);
        assert_eq!(m.mode, 2);
        assert_eq!(m.reg, 0);
        assert_eq!(m.rm, 7);
        assert!(m.is_memory());
        assert!(!ModRm::from_byte(0xE5).is_memory());
    }

    #[test]
    fn test_rm_ext_folds_rex_b() {
        let instr = Instruction {
            rex: 0x4D,
            modrm: Some(ModRm::from_byte(0xBE)),
            ..Default::default()
        };
        assert_eq!(instr.reg(), Some(7));
        assert_eq!(instr.rm(), Some(6));
        assert_eq!(instr.rm_ext(), Some(14));
        assert!(instr.rex_w());
        assert!(instr.rex_r());
        assert!(!instr.rex_x());
    }

    #[test]
    fn test_display_negative_disp() {
        let instr = Instruction {
            len: 4,
            rex: 0x48,
            opcode: 0x8B,
            modrm: Some(ModRm::from_byte(0x47)),
            disp: -8,
            disp_size: 1,
            ..Default::default()
        };
        assert_eq!(instr.to_string(), "op=8b mod=1 reg=0 rm=7 disp=-0x8");
    }
}
