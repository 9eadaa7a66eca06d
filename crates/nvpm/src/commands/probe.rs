//! Probe command: run one field signature against a code dump.

use std::path::Path;

use nvpm::{CodeImage, Field, HostRelease, X64Decoder};
use nvpm_layout::{ScanOutcome, find, signature_for};
use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal;

pub fn cmd_probe(
    code: &Path,
    field: Field,
    release: HostRelease,
    base: u64,
    entry: Option<u64>,
) -> i32 {
    let Some((function, sig)) = signature_for(field, release) else {
        terminal::warning(&format!("{field} has no signature of its own"));
        return EXIT_FAILURE;
    };
    info!(%field, %release, function = function.symbol(), %sig, "probing");

    let bytes = match std::fs::read(code) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(path = %code.display(), error = %e, "failed to read code");
            return EXIT_FAILURE;
        }
    };
    let image = CodeImage::new(base, bytes);
    let entry = entry.unwrap_or(base);
    let Some(region) = image.region_at(entry) else {
        error!(entry = format!("{entry:#x}"), "entry outside code");
        return EXIT_FAILURE;
    };

    match find(&X64Decoder, region, &sig) {
        ScanOutcome::Matched {
            address,
            instr,
            decoded,
        } => match sig.offset_from(instr.disp) {
            Some(offset) => {
                terminal::field("match", format!("{address:#x} {instr}"));
                terminal::field("decoded", decoded);
                terminal::success(&format!("{field} = {offset:#x}"));
                EXIT_SUCCESS
            }
            None => {
                terminal::error(&format!(
                    "{field}: displacement {} at {address:#x} is not a valid offset",
                    instr.disp
                ));
                EXIT_FAILURE
            }
        },
        ScanOutcome::Exhausted { decoded } => {
            terminal::error(&format!("{field} not found after {decoded} instructions"));
            EXIT_FAILURE
        }
        ScanOutcome::Failed {
            address,
            error,
            decoded,
        } => {
            terminal::error(&format!(
                "{field}: decode failed at {address:#x} after {decoded} instructions: {error}"
            ));
            EXIT_FAILURE
        }
    }
}
