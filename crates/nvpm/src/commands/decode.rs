//! Decode command: walk a code dump one instruction at a time.

use std::path::Path;

use nvpm::CodeImage;
use tracing::{debug, error};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal::{self, Alignment, Table};

pub fn cmd_decode(code: &Path, base: u64, offset: u64, count: usize) -> i32 {
    let bytes = match std::fs::read(code) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(path = %code.display(), error = %e, "failed to read code");
            return EXIT_FAILURE;
        }
    };
    let image = CodeImage::new(base, bytes);
    let Some(region) = base.checked_add(offset).and_then(|a| image.region_at(a)) else {
        error!(offset = format!("{offset:#x}"), len = image.bytes().len(), "offset outside code");
        return EXIT_FAILURE;
    };
    debug!(address = format!("{:#x}", region.address), len = region.len(), "decoding");

    let mut table = Table::new(&["address", "bytes", "instruction"])
        .with_alignments(vec![Alignment::Right, Alignment::Left, Alignment::Left]);
    let mut pos = 0usize;
    let mut failure = None;
    for _ in 0..count {
        let Some(rest) = region.tail(pos) else {
            break;
        };
        let address = region.address + pos as u64;
        match nvpm_x86::decode(rest) {
            Ok(instr) => {
                let len = usize::from(instr.len);
                let hex: Vec<_> = rest[..len].iter().map(|b| format!("{b:02x}")).collect();
                table.add_row(vec![format!("{address:#x}"), hex.join(" "), instr.to_string()]);
                pos += len;
            }
            Err(e) => {
                failure = Some((address, e));
                break;
            }
        }
    }

    table.print();
    match failure {
        Some((address, e)) => {
            terminal::error(&format!("decode failed at {address:#x}: {e}"));
            EXIT_FAILURE
        }
        None => EXIT_SUCCESS,
    }
}
