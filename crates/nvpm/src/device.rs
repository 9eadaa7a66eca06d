//! Device collaborator interface.
//!
//! The host driver owns the controller. Everything that touches hardware or
//! host power management goes through [`NvmeDevice`].

use std::fmt;

use nvpm_power::OsPowerTable;
use thiserror::Error;

/// Stable host identifier of a controller.
pub type DeviceId = u64;

/// Raw Identify Controller data as returned by the device.
pub type IdentifyBuffer = Vec<u8>;

/// PCI vendor ID of controllers managed by their own vendor driver.
pub const APPLE_VENDOR_ID: u16 = 0x106b;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PciIdentity {
    pub vendor: u16,
    pub device: u16,
}

impl fmt::Display for PciIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.device)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("command completed with status {0:#x}")]
    Status(u32),
    #[error("no resources to build the command")]
    NoResources,
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("device removed")]
    Gone,
}

/// One NVMe controller as exposed by the host driver.
pub trait NvmeDevice: Send + Sync {
    fn id(&self) -> DeviceId;

    fn name(&self) -> String {
        format!("nvme{}", self.id())
    }

    /// PCI IDs of the parent function, when it is a PCI device.
    fn pci_identity(&self) -> Option<PciIdentity>;

    /// Per-device override of the APST latency ceiling.
    fn ps_max_latency_us(&self) -> Option<u64> {
        None
    }

    /// Issue Identify Controller.
    fn read_identify(&self) -> Result<IdentifyBuffer, DeviceError>;

    /// Submit a Get or Set Features admin command and wait for completion.
    ///
    /// `payload` is the data buffer for features that carry one; for a get it
    /// is filled by the device. Returns completion dword 0.
    fn issue_feature_command(
        &self,
        feature_id: u8,
        dword11: Option<u32>,
        payload: Option<&mut [u8]>,
        set: bool,
    ) -> Result<u32, DeviceError>;

    /// Replace the host power management table for this controller.
    fn register_power_states(&self, table: &OsPowerTable) -> Result<(), DeviceError>;

    /// Write one byte into the host's controller object.
    fn write_u8(&self, offset: u32, value: u8) -> Result<(), DeviceError>;
}
