#![allow(dead_code)]

use std::sync::Arc;

use nvpm::{
    CodeImage, DeviceError, DeviceId, FunctionId, IdentifyBuffer, IdentifyController,
    NvmeDevice, OsPowerTable, PciIdentity,
};
use nvpm_power::PowerStateDescriptor as Psd;
use parking_lot::Mutex;

pub const GET_STATUS: &[u8] = &[0x8B, 0x87, 0xA8, 0x00, 0x00, 0x00, 0xC3];
pub const GET_OPCODE: &[u8] = &[0x0F, 0xB6, 0x87, 0x0A, 0x01, 0x00, 0x00, 0xC3];
pub const IDENTIFY_MODERN: &[u8] = &[0x4C, 0x89, 0xBB, 0xB0, 0x00, 0x00, 0x00, 0xC3];
pub const FILTER: &[u8] = &[0x80, 0xBF, 0x69, 0x02, 0x00, 0x00, 0x00, 0xC3];

pub const MSI_WORKAROUND_OFFSET: u32 = 0x269;

/// Lay out functions back to back and define their symbols.
pub fn driver_image(parts: &[(FunctionId, &[u8])]) -> CodeImage {
    let base = 0xFFFF_FF80_0000_0000;
    let mut bytes = Vec::new();
    let mut image_symbols = Vec::new();
    for (function, code) in parts {
        image_symbols.push((function.symbol(), base + bytes.len() as u64));
        bytes.extend_from_slice(code);
    }
    let mut image = CodeImage::new(base, bytes);
    for (name, address) in image_symbols {
        image.define(name, address);
    }
    image
}

/// A driver image where every command field resolves.
pub fn full_driver() -> CodeImage {
    driver_image(&[
        (FunctionId::RequestGetStatus, GET_STATUS),
        (FunctionId::RequestGetOpcode, GET_OPCODE),
        (FunctionId::IssueIdentifyCommandNew, IDENTIFY_MODERN),
        (FunctionId::FilterInterruptRequest, FILTER),
    ])
}

/// Three operational states and two non-operational ones.
pub fn identify() -> IdentifyController {
    IdentifyController::default()
        .with_vendor(0x144d)
        .with_model("Test SSD 1TB")
        .with_firmware("1B2QEXM7")
        .with_serial("S4EWNX0N123456")
        .with_apst(true)
        .with_power_states(&[
            Psd::operational(900, 0, 0),
            Psd::operational(600, 0, 0),
            Psd::operational(400, 0, 0),
            Psd::non_operational(50, 1000, 1000),
            Psd::non_operational(5, 2000, 8000),
        ])
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureCommand {
    pub feature_id: u8,
    pub dword11: Option<u32>,
    pub set: bool,
    pub payload: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct FakeState {
    pub commands: Vec<FeatureCommand>,
    pub writes: Vec<(u32, u8)>,
    pub registered: Vec<OsPowerTable>,
    pub identify_reads: usize,
    apst_data: Vec<u8>,
    apst_on: bool,
}

/// Records every interaction and answers like a well behaved controller.
pub struct FakeDevice {
    id: DeviceId,
    pci: Option<PciIdentity>,
    identify: Mutex<IdentifyBuffer>,
    latency_override: Option<u64>,
    fail_set_features: bool,
    fail_registration: bool,
    pub state: Mutex<FakeState>,
}

impl FakeDevice {
    pub fn new(id: DeviceId, identify: &IdentifyController) -> Self {
        Self {
            id,
            pci: Some(PciIdentity {
                vendor: 0x144d,
                device: 0xa808,
            }),
            identify: Mutex::new(identify.encode()),
            latency_override: None,
            fail_set_features: false,
            fail_registration: false,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_pci(mut self, vendor: u16, device: u16) -> Self {
        self.pci = Some(PciIdentity { vendor, device });
        self
    }

    pub fn with_raw_identify(self, data: Vec<u8>) -> Self {
        *self.identify.lock() = data;
        self
    }

    pub const fn with_latency_override(mut self, latency: u64) -> Self {
        self.latency_override = Some(latency);
        self
    }

    pub const fn failing_set_features(mut self) -> Self {
        self.fail_set_features = true;
        self
    }

    /// The host rejects every power level table.
    pub const fn failing_registration(mut self) -> Self {
        self.fail_registration = true;
        self
    }

    pub fn set_identify(&self, identify: &IdentifyController) {
        *self.identify.lock() = identify.encode();
    }

    pub fn set_raw_identify(&self, data: IdentifyBuffer) {
        *self.identify.lock() = data;
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_commands(&self) -> Vec<FeatureCommand> {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|c| c.set)
            .cloned()
            .collect()
    }
}

impl NvmeDevice for FakeDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn pci_identity(&self) -> Option<PciIdentity> {
        self.pci
    }

    fn ps_max_latency_us(&self) -> Option<u64> {
        self.latency_override
    }

    fn read_identify(&self) -> Result<IdentifyBuffer, DeviceError> {
        self.state.lock().identify_reads += 1;
        Ok(self.identify.lock().clone())
    }

    fn issue_feature_command(
        &self,
        feature_id: u8,
        dword11: Option<u32>,
        payload: Option<&mut [u8]>,
        set: bool,
    ) -> Result<u32, DeviceError> {
        let mut state = self.state.lock();
        state.commands.push(FeatureCommand {
            feature_id,
            dword11,
            set,
            payload: payload.as_ref().map(|p| p.to_vec()),
        });

        if set {
            if self.fail_set_features {
                return Err(DeviceError::Status(0x2));
            }
            state.apst_on = dword11.is_some_and(|d| d & 1 != 0);
            if let Some(data) = payload {
                state.apst_data = data.to_vec();
            }
        } else if let Some(data) = payload {
            let len = data.len().min(state.apst_data.len());
            data[..len].copy_from_slice(&state.apst_data[..len]);
        }
        Ok(u32::from(state.apst_on))
    }

    fn register_power_states(&self, table: &OsPowerTable) -> Result<(), DeviceError> {
        if self.fail_registration {
            return Err(DeviceError::Gone);
        }
        self.state.lock().registered.push(table.clone());
        Ok(())
    }

    fn write_u8(&self, offset: u32, value: u8) -> Result<(), DeviceError> {
        self.state.lock().writes.push((offset, value));
        Ok(())
    }
}
