//! Command implementations.

mod decode;
mod plan;
mod probe;

use nvpm::PlatformInfo;

use crate::cli::{Cli, Commands};
use crate::terminal;

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Plan { .. } => handle_plan(cli),
        Commands::Decode { .. } => handle_decode(cli),
        Commands::Probe { .. } => handle_probe(cli),
    }
}

fn handle_plan(cli: &Cli) -> i32 {
    let Commands::Plan {
        identify,
        vendor_id,
        device_id,
        max_latency,
        no_apst,
        oem_vendor,
        oem_product,
        oem_board,
    } = &cli.command
    else {
        unreachable!("plan command variant mismatch");
    };

    let platform = PlatformInfo {
        vendor: oem_vendor.clone(),
        product: oem_product.clone(),
        board: oem_board.clone(),
    };
    if *max_latency == 0 && !*no_apst {
        terminal::info("max latency 0 disables APST");
    }

    plan::cmd_plan(plan::PlanOptions {
        identify,
        vendor_id: *vendor_id,
        device_id: *device_id,
        max_latency: *max_latency,
        no_apst: *no_apst,
        platform,
    })
}

fn handle_decode(cli: &Cli) -> i32 {
    let Commands::Decode {
        code,
        base,
        offset,
        count,
    } = &cli.command
    else {
        unreachable!("decode command variant mismatch");
    };

    decode::cmd_decode(code, *base, *offset, *count)
}

fn handle_probe(cli: &Cli) -> i32 {
    let Commands::Probe {
        code,
        field,
        release,
        base,
        entry,
    } = &cli.command
    else {
        unreachable!("probe command variant mismatch");
    };

    probe::cmd_probe(code, *field, *release, *base, *entry)
}
