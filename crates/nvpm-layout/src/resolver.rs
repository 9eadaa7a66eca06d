//! Sequential code scan for a field signature.

use metrics::counter;
use nvpm_x86::{Decode, DecodeError, Instruction};
use tracing::trace;

use crate::{CodeRegion, FieldSignature, Probe};

/// Detailed result of scanning one region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// An instruction matched.
    Matched {
        address: u64,
        instr: Instruction,
        decoded: usize,
    },
    /// Budget spent or region ended without a match.
    Exhausted { decoded: usize },
    /// The decoder rejected the bytes at `address`.
    Failed {
        address: u64,
        error: DecodeError,
        decoded: usize,
    },
}

impl ScanOutcome {
    /// Instructions successfully decoded during the scan.
    pub const fn decoded(&self) -> usize {
        match self {
            Self::Matched { decoded, .. }
            | Self::Exhausted { decoded }
            | Self::Failed { decoded, .. } => *decoded,
        }
    }
}

/// Decode forward from the start of `code` until `sig` matches.
pub fn find<D: Decode + ?Sized>(
    decoder: &D,
    code: CodeRegion<'_>,
    sig: &FieldSignature,
) -> ScanOutcome {
    let mut pos = 0usize;
    let mut decoded = 0usize;

    let outcome = loop {
        if decoded >= sig.budget {
            break ScanOutcome::Exhausted { decoded };
        }
        let Some(rest) = code.tail(pos) else {
            break ScanOutcome::Exhausted { decoded };
        };
        let address = code.address + pos as u64;

        match decoder.decode_one(rest) {
            Ok(instr) => {
                decoded += 1;
                trace!(addr = format!("{:#x}", address), %instr, "decoded");
                if sig.matches(&instr) {
                    break ScanOutcome::Matched {
                        address,
                        instr,
                        decoded,
                    };
                }
                pos += usize::from(instr.len);
            }
            Err(error) => {
                trace!(addr = format!("{:#x}", address), %error, "decode failed");
                break ScanOutcome::Failed {
                    address,
                    error,
                    decoded,
                };
            }
        }
    };

    counter!("nvpm_instructions_decoded_total").increment(outcome.decoded() as u64);
    outcome
}

/// Scan `code` for `sig` and return the adjusted displacement.
///
/// Not cached. See [`OffsetCache`](crate::OffsetCache) for the memoized form.
pub fn scan<D: Decode + ?Sized>(decoder: &D, code: CodeRegion<'_>, sig: &FieldSignature) -> Probe {
    match find(decoder, code, sig) {
        ScanOutcome::Matched { instr, .. } => sig
            .offset_from(instr.disp)
            .map_or(Probe::NotFound, Probe::Resolved),
        ScanOutcome::Exhausted { .. } | ScanOutcome::Failed { .. } => Probe::NotFound,
    }
}
