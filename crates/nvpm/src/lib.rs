//! NVMe power management for a closed storage driver.
//!
//! The host driver publishes controllers but never configures Autonomous
//! Power State Transitions and exposes a fixed set of power levels. This
//! crate discovers the driver's private layout from its code, builds APST
//! and power level tables from each controller's Identify data, and pushes
//! them through an [`NvmeDevice`].
//!
//! # Example
//!
//! ```ignore
//! use nvpm::{Config, PowerManager};
//!
//! let manager = PowerManager::new(Config::default());
//! manager.on_driver_loaded(&driver_image);
//! let token = manager.on_controller_published(device);
//! ```

pub use nvpm_layout::{
    CodeImage, CodeRegion, DriverLayout, Field, FieldSignature, FunctionId, FunctionLocator,
    HostRelease, OffsetCache, Probe, resolve_offset,
};
pub use nvpm_power::{
    ApstPlan, ApstTable, IdentifyController, OsPowerTable, PlatformInfo, PowerLevel,
    PowerStateModel, Quirks, build_autonomous_table, build_os_power_table,
};
pub use nvpm_x86::{Decode, DecodeError, Instruction, X64Decoder};

mod config;
mod controller;
mod device;
mod error;
mod manager;
pub mod metrics;
mod policy;
mod registry;

pub use config::*;
pub use controller::*;
pub use device::*;
pub use error::*;
pub use manager::*;
pub use policy::*;
pub use registry::*;

use std::path::Path;

/// Load and parse an Identify Controller dump.
pub fn load_identify(path: &Path) -> Result<IdentifyController> {
    let data = std::fs::read(path)?;
    Ok(IdentifyController::parse(&data)?)
}
