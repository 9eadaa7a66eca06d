//! Table-driven 64-bit mode length and operand decoder.
//!
//! Each opcode has a small attribute byte saying whether a ModRM byte follows
//! and how many immediate bytes trail the instruction. That is enough to walk
//! straight-line compiled code and pull out memory operand displacements.

use crate::{Decode, DecodeError, Instruction, MAX_INSTRUCTION_LEN, ModRm, Prefixes};

const MODRM: u8 = 1 << 0;
const IMM8: u8 = 1 << 1;
const IMM16: u8 = 1 << 2;
/// 16 or 32 bits depending on operand size.
const IMMZ: u8 = 1 << 3;
/// 16, 32 or 64 bits (mov r, imm).
const IMMV: u8 = 1 << 4;
/// Always 32 bits in 64-bit mode (near call/jmp/jcc).
const REL32: u8 = 1 << 5;
/// Absolute address, 64 bits unless 0x67.
const MOFFS: u8 = 1 << 6;
const INVALID: u8 = 1 << 7;

const ONE_BYTE: [u8; 256] = one_byte_table();
const TWO_BYTE: [u8; 256] = two_byte_table();

const fn one_byte_table() -> [u8; 256] {
    let mut t = [0u8; 256];

    // ALU block: op r/m,r / op r,r/m / op al,imm8 / op eax,immz
    let mut op = 0;
    while op < 0x40 {
        t[op] = match op & 7 {
            0..=3 => MODRM,
            4 => IMM8,
            5 => IMMZ,
            // push/pop seg, daa/das/aaa/aas: invalid in 64-bit mode.
            // Prefix and escape bytes in this range are consumed before lookup.
            _ => INVALID,
        };
        op += 1;
    }

    t[0x60] = INVALID;
    t[0x61] = INVALID;
    t[0x62] = INVALID; // EVEX
    t[0x63] = MODRM; // movsxd
    t[0x68] = IMMZ;
    t[0x69] = MODRM | IMMZ;
    t[0x6A] = IMM8;
    t[0x6B] = MODRM | IMM8;

    op = 0x70;
    while op < 0x80 {
        t[op] = IMM8; // jcc rel8
        op += 1;
    }

    t[0x80] = MODRM | IMM8;
    t[0x81] = MODRM | IMMZ;
    t[0x82] = INVALID;
    t[0x83] = MODRM | IMM8;
    op = 0x84;
    while op < 0x90 {
        t[op] = MODRM;
        op += 1;
    }

    t[0x9A] = INVALID;
    t[0xA0] = MOFFS;
    t[0xA1] = MOFFS;
    t[0xA2] = MOFFS;
    t[0xA3] = MOFFS;
    t[0xA8] = IMM8;
    t[0xA9] = IMMZ;

    op = 0xB0;
    while op < 0xB8 {
        t[op] = IMM8;
        op += 1;
    }
    while op < 0xC0 {
        t[op] = IMMV;
        op += 1;
    }

    t[0xC0] = MODRM | IMM8;
    t[0xC1] = MODRM | IMM8;
    t[0xC2] = IMM16;
    t[0xC4] = INVALID; // VEX3
    t[0xC5] = INVALID; // VEX2
    t[0xC6] = MODRM | IMM8;
    t[0xC7] = MODRM | IMMZ;
    t[0xC8] = IMM16 | IMM8; // enter
    t[0xCA] = IMM16;
    t[0xCD] = IMM8;
    t[0xCE] = INVALID;

    op = 0xD0;
    while op < 0xD4 {
        t[op] = MODRM;
        op += 1;
    }
    t[0xD4] = INVALID;
    t[0xD5] = INVALID;
    t[0xD6] = INVALID;
    op = 0xD8;
    while op < 0xE0 {
        t[op] = MODRM; // x87
        op += 1;
    }

    while op < 0xE8 {
        t[op] = IMM8; // loop/jcxz rel8, in/out imm8
        op += 1;
    }
    t[0xE8] = REL32;
    t[0xE9] = REL32;
    t[0xEA] = INVALID;
    t[0xEB] = IMM8;

    // Group 3 immediates depend on ModRM.reg, handled in decode.
    t[0xF6] = MODRM;
    t[0xF7] = MODRM;
    t[0xFE] = MODRM;
    t[0xFF] = MODRM;
    t
}

const fn two_byte_table() -> [u8; 256] {
    let mut t = [MODRM; 256];

    t[0x04] = INVALID;
    t[0x05] = 0; // syscall
    t[0x06] = 0; // clts
    t[0x07] = 0; // sysret
    t[0x08] = 0; // invd
    t[0x09] = 0; // wbinvd
    t[0x0A] = INVALID;
    t[0x0B] = 0; // ud2
    t[0x0C] = INVALID;
    t[0x0E] = 0; // femms
    t[0x0F] = INVALID; // 3DNow!

    t[0x24] = INVALID;
    t[0x25] = INVALID;
    t[0x26] = INVALID;
    t[0x27] = INVALID;

    let mut op = 0x30;
    while op < 0x38 {
        t[op] = 0; // wrmsr, rdtsc, rdmsr, rdpmc, sysenter, sysexit, getsec
        op += 1;
    }
    t[0x36] = INVALID;
    t[0x39] = INVALID;
    op = 0x3B;
    while op < 0x40 {
        t[op] = INVALID;
        op += 1;
    }

    op = 0x70;
    while op < 0x74 {
        t[op] = MODRM | IMM8; // pshuf*, shift groups
        op += 1;
    }
    t[0x77] = 0; // emms
    t[0x7A] = INVALID;
    t[0x7B] = INVALID;

    op = 0x80;
    while op < 0x90 {
        t[op] = REL32; // jcc rel32
        op += 1;
    }

    t[0xA0] = 0;
    t[0xA1] = 0;
    t[0xA2] = 0; // cpuid
    t[0xA4] = MODRM | IMM8; // shld imm8
    t[0xA6] = INVALID;
    t[0xA7] = INVALID;
    t[0xA8] = 0;
    t[0xA9] = 0;
    t[0xAA] = 0; // rsm
    t[0xAC] = MODRM | IMM8; // shrd imm8
    t[0xBA] = MODRM | IMM8; // bt group
    t[0xC2] = MODRM | IMM8;
    t[0xC4] = MODRM | IMM8;
    t[0xC5] = MODRM | IMM8;
    t[0xC6] = MODRM | IMM8;

    op = 0xC8;
    while op < 0xD0 {
        t[op] = 0; // bswap
        op += 1;
    }
    t[0xFF] = INVALID;
    t
}

/// Stateless 64-bit mode decoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct X64Decoder;

impl Decode for X64Decoder {
    fn decode_one(&self, bytes: &[u8]) -> Result<Instruction, DecodeError> {
        Cursor::new(bytes).decode()
    }
}

/// Byte cursor enforcing the architectural length limit.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn peek(&self) -> Result<u8, DecodeError> {
        if self.pos >= MAX_INSTRUCTION_LEN {
            return Err(DecodeError::TooLong);
        }
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::Truncated { offset: self.pos })
    }

    fn fetch_u8(&mut self) -> Result<u8, DecodeError> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    /// Read `size` bytes little-endian (size <= 8).
    fn fetch_le(&mut self, size: usize) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for i in 0..size {
            value |= u64::from(self.fetch_u8()?) << (i * 8);
        }
        Ok(value)
    }

    fn decode(mut self) -> Result<Instruction, DecodeError> {
        let mut instr = Instruction::default();

        self.decode_prefixes(&mut instr)?;

        instr.opcode = self.fetch_u8()?;
        let attrs = if instr.opcode == 0x0F {
            let op2 = self.fetch_u8()?;
            instr.opcode2 = Some(op2);
            match op2 {
                0x38 => {
                    instr.opcode3 = Some(self.fetch_u8()?);
                    MODRM
                }
                0x3A => {
                    instr.opcode3 = Some(self.fetch_u8()?);
                    MODRM | IMM8
                }
                _ => {
                    let attrs = TWO_BYTE[op2 as usize];
                    if attrs & INVALID != 0 {
                        return Err(DecodeError::InvalidSecondaryOpcode { opcode: op2 });
                    }
                    attrs
                }
            }
        } else {
            let attrs = ONE_BYTE[instr.opcode as usize];
            if attrs & INVALID != 0 {
                return Err(match instr.opcode {
                    prefix @ (0x62 | 0xC4 | 0xC5) => DecodeError::VexUnsupported { prefix },
                    opcode => DecodeError::InvalidOpcode { opcode },
                });
            }
            attrs
        };

        if attrs & MODRM != 0 {
            self.decode_modrm(&mut instr)?;
        }

        let imm_size = Self::immediate_size(&instr, attrs);
        if imm_size > 0 {
            // enter (imm16, imm8) is the only 3-byte immediate; keep the low 8 bytes otherwise.
            instr.imm = self.fetch_le(imm_size.min(8))?;
            if imm_size > 8 {
                self.fetch_le(imm_size - 8)?;
            }
            instr.imm_size = imm_size as u8;
        }

        instr.len = self.pos as u8;
        Ok(instr)
    }

    fn decode_prefixes(&mut self, instr: &mut Instruction) -> Result<(), DecodeError> {
        loop {
            let b = self.peek()?;
            match b {
                0x66 => instr.prefixes.operand_size = true,
                0x67 => instr.prefixes.address_size = true,
                0xF0 => instr.prefixes.lock = true,
                0xF2 => instr.prefixes.repne = true,
                0xF3 => instr.prefixes.rep = true,
                0x26 | 0x2E | 0x36 | 0x3E | 0x64 | 0x65 => instr.prefixes.segment = Some(b),
                0x40..=0x4F => {
                    self.pos += 1;
                    instr.rex = b;
                    continue;
                }
                _ => return Ok(()),
            }
            // REX only counts when it immediately precedes the opcode.
            instr.rex = 0;
            self.pos += 1;
        }
    }

    fn decode_modrm(&mut self, instr: &mut Instruction) -> Result<(), DecodeError> {
        let modrm = ModRm::from_byte(self.fetch_u8()?);
        instr.modrm = Some(modrm);

        if !modrm.is_memory() {
            return Ok(());
        }

        let mut disp_size = match modrm.mode {
            1 => 1,
            2 => 4,
            _ => 0,
        };

        if modrm.rm == 4 {
            let sib = self.fetch_u8()?;
            instr.sib = Some(sib);
            if modrm.mode == 0 && sib & 0x7 == 5 {
                disp_size = 4; // [index*scale + disp32]
            }
        } else if modrm.mode == 0 && modrm.rm == 5 {
            disp_size = 4; // [rip + disp32]
        }

        match disp_size {
            1 => {
                instr.disp = i32::from(self.fetch_u8()? as i8);
                instr.disp_size = 1;
            }
            4 => {
                instr.disp = self.fetch_le(4)? as u32 as i32;
                instr.disp_size = 4;
            }
            _ => {}
        }
        Ok(())
    }

    fn immediate_size(instr: &Instruction, attrs: u8) -> usize {
        let op16 = instr.prefixes.operand_size && !instr.rex_w();
        let mut size = 0;

        if attrs & IMM8 != 0 {
            size += 1;
        }
        if attrs & IMM16 != 0 {
            size += 2;
        }
        if attrs & IMMZ != 0 {
            size += if op16 { 2 } else { 4 };
        }
        if attrs & IMMV != 0 {
            size += if instr.rex_w() {
                8
            } else if op16 {
                2
            } else {
                4
            };
        }
        if attrs & REL32 != 0 {
            size += 4;
        }
        if attrs & MOFFS != 0 {
            size += if instr.prefixes.address_size { 4 } else { 8 };
        }

        // test r/m, imm (group 3 /0 and /1)
        if instr.opcode2.is_none()
            && matches!(instr.opcode, 0xF6 | 0xF7)
            && instr.reg().is_some_and(|reg| reg < 2)
        {
            size += match (instr.opcode, op16) {
                (0xF6, _) => 1,
                (_, true) => 2,
                _ => 4,
            };
        }

        size
    }
}
