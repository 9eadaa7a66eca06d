//! NVMe power state policy.
//!
//! Turns a controller's Identify data and quirks into an Autonomous Power
//! State Transition table and a host power level table.

mod apst;
mod caps;
mod error;
mod identify;
mod model;
mod os_table;
mod quirks;

pub use apst::*;
pub use caps::*;
pub use error::*;
pub use identify::*;
pub use model::*;
pub use os_table::*;
pub use quirks::*;

/// All quirks that apply before Identify data is available.
pub fn bus_quirks(vendor: u16, device: u16, platform: &PlatformInfo) -> Quirks {
    pci_quirks(vendor, device) | platform_quirks(vendor, device, platform)
}
