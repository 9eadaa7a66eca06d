//! Read-only power state model for one controller.

use crate::{IdentifyController, MAX_POWER_STATES, PowerError, PowerStateDescriptor, Result};

/// One power state as seen by the policy builders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PowerState {
    /// 0 is the highest power state; NPSS the deepest.
    pub index: u8,
    pub descriptor: PowerStateDescriptor,
}

impl PowerState {
    #[inline]
    pub const fn non_operational(&self) -> bool {
        self.descriptor.non_operational
    }

    #[inline]
    pub const fn exit_latency_us(&self) -> u32 {
        self.descriptor.exit_latency_us
    }

    #[inline]
    pub const fn entry_latency_us(&self) -> u32 {
        self.descriptor.entry_latency_us
    }

    /// Entry plus exit latency.
    #[inline]
    pub fn total_latency_us(&self) -> u64 {
        u64::from(self.exit_latency_us()) + u64::from(self.entry_latency_us())
    }
}

/// Power states `0..=npss` plus the controller identity that selects quirks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowerStateModel {
    states: Vec<PowerState>,
    apst_supported: bool,
    vid: u16,
    model: String,
    firmware: String,
}

impl PowerStateModel {
    /// Build from a descriptor list. Index `i` of `states` is power state `i`.
    pub fn new(states: &[PowerStateDescriptor], apst_supported: bool) -> Result<Self> {
        if states.is_empty() {
            return Err(PowerError::InvalidCapability(
                "no power state descriptors".to_string(),
            ));
        }
        if states.len() > MAX_POWER_STATES {
            return Err(PowerError::InvalidCapability(format!(
                "NPSS {} exceeds {}",
                states.len() - 1,
                MAX_POWER_STATES - 1
            )));
        }

        let states = states
            .iter()
            .enumerate()
            .map(|(i, descriptor)| PowerState {
                index: i as u8,
                descriptor: *descriptor,
            })
            .collect();

        Ok(Self {
            states,
            apst_supported,
            vid: 0,
            model: String::new(),
            firmware: String::new(),
        })
    }

    pub fn from_identify(id: &IdentifyController) -> Result<Self> {
        if usize::from(id.npss) >= MAX_POWER_STATES {
            return Err(PowerError::InvalidCapability(format!(
                "NPSS {} exceeds {}",
                id.npss,
                MAX_POWER_STATES - 1
            )));
        }
        let mut model = Self::new(id.power_states(), id.apsta)?;
        model.vid = id.vid;
        model.model = id.model();
        model.firmware = id.firmware();
        Ok(model)
    }

    /// Index of the deepest power state.
    pub fn npss(&self) -> u8 {
        (self.states.len() - 1) as u8
    }

    pub fn state(&self, index: u8) -> Option<&PowerState> {
        self.states.get(usize::from(index))
    }

    pub fn states(&self) -> &[PowerState] {
        &self.states
    }

    /// States from deepest (NPSS) to highest power (0).
    pub fn deepest_first(&self) -> impl Iterator<Item = &PowerState> {
        self.states.iter().rev()
    }

    pub fn operational_count(&self) -> usize {
        self.states.iter().filter(|s| !s.non_operational()).count()
    }

    pub fn non_operational_count(&self) -> usize {
        self.states.iter().filter(|s| s.non_operational()).count()
    }

    pub const fn apst_supported(&self) -> bool {
        self.apst_supported
    }

    pub const fn vid(&self) -> u16 {
        self.vid
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn firmware(&self) -> &str {
        &self.firmware
    }
}
