//! Minimal x86-64 instruction decoder.
//!
//! Only decodes what's needed to walk compiled code one instruction at a time
//! and inspect memory operands: prefixes, opcode bytes, ModRM/SIB, and the
//! displacement. Immediates are skipped by length. There is no operand
//! semantics and no disassembly beyond a compact field dump.

mod decode;
mod types;

pub use decode::*;
pub use types::*;

/// Instruction decoder seam.
///
/// The offset resolver is generic over this so tests can count decodes or
/// feed synthetic instruction streams.
pub trait Decode {
    /// Decode exactly one instruction from the start of `bytes`.
    fn decode_one(&self, bytes: &[u8]) -> Result<Instruction, DecodeError>;
}

impl<D: Decode + ?Sized> Decode for &D {
    fn decode_one(&self, bytes: &[u8]) -> Result<Instruction, DecodeError> {
        (**self).decode_one(bytes)
    }
}

/// Decode one 64-bit mode instruction.
///
/// This is a convenience wrapper around `X64Decoder.decode_one()`.
pub fn decode(bytes: &[u8]) -> Result<Instruction, DecodeError> {
    X64Decoder.decode_one(bytes)
}
