//! Plan command: power policy for an Identify dump.

use std::path::Path;

use nvpm::{Config, PlatformInfo, PowerPlan, Quirks};
use nvpm_power::bus_quirks;
use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal::{self, Alignment, Table};

/// Options for the `plan` command.
pub struct PlanOptions<'a> {
    pub identify: &'a Path,
    pub vendor_id: Option<u16>,
    pub device_id: Option<u16>,
    pub max_latency: u64,
    pub no_apst: bool,
    pub platform: PlatformInfo,
}

pub fn cmd_plan(options: PlanOptions<'_>) -> i32 {
    info!(identify = %options.identify.display(), "planning");

    let id = match nvpm::load_identify(options.identify) {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "failed to load identify data");
            return EXIT_FAILURE;
        }
    };

    let config = Config::default()
        .with_max_latency(options.max_latency)
        .with_apst(!options.no_apst)
        .with_platform(options.platform);

    let bus = match (options.vendor_id, options.device_id) {
        (Some(vendor), Some(device)) => bus_quirks(vendor, device, &config.platform),
        (None, None) => Quirks::NONE,
        _ => {
            terminal::warning("PCI quirks need both --vendor-id and --device-id");
            Quirks::NONE
        }
    };

    let plan = match PowerPlan::new(&id, bus, config.ps_max_latency_us, &config) {
        Ok(plan) => plan,
        Err(e) => {
            error!(error = %e, "no power management for this controller");
            return EXIT_FAILURE;
        }
    };

    terminal::header("Controller");
    terminal::field("model", id.model());
    terminal::field("firmware", id.firmware());
    terminal::field("serial", id.serial());
    terminal::field("vendor", format!("{:#06x}", id.vid));
    terminal::field("npss", id.npss);
    terminal::field("apsta", id.apsta);
    terminal::field("quirks", plan.quirks);

    terminal::header("Power states");
    let mut states = Table::new(&["ps", "type", "max power", "entry", "exit"]).with_alignments(
        vec![
            Alignment::Right,
            Alignment::Left,
            Alignment::Right,
            Alignment::Right,
            Alignment::Right,
        ],
    );
    for state in plan.model.states() {
        let d = state.descriptor;
        states.add_row(vec![
            state.index.to_string(),
            if d.non_operational { "non-op" } else { "op" }.to_string(),
            format!("{:.4} W", d.max_power_watts()),
            format!("{} us", d.entry_latency_us),
            format!("{} us", d.exit_latency_us),
        ]);
    }
    states.print();

    terminal::header("APST");
    match &plan.apst {
        Some(apst) => {
            terminal::field("deepest target", format!("ps{}", apst.deepest_target));
            terminal::field("max latency", format!("{} us", apst.max_latency_us));
            let mut table =
                Table::new(&["ps", "transition"]).with_alignments(vec![Alignment::Right, Alignment::Left]);
            for state in plan.model.states() {
                table.add_row(vec![
                    state.index.to_string(),
                    apst.table.entry(usize::from(state.index)).to_string(),
                ]);
            }
            table.print();
        }
        None => terminal::dim("not planned"),
    }

    terminal::header("Host power levels");
    match plan.os_table(plan.apst.is_some(), &config) {
        Some(levels) => {
            let mut table = Table::new(&["level", "state", "usable"])
                .with_alignments(vec![Alignment::Right, Alignment::Left, Alignment::Left]);
            for (index, level) in levels.levels().iter().enumerate() {
                table.add_row(vec![
                    index.to_string(),
                    level.to_string(),
                    if level.device_usable() { "yes" } else { "no" }.to_string(),
                ]);
            }
            table.print();
        }
        None => terminal::dim("left to the host"),
    }

    terminal::success("plan complete");
    EXIT_SUCCESS
}
