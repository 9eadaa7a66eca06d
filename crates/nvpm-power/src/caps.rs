use crate::{PowerStateModel, Quirks};

/// Default ceiling on APST exit latency.
pub const DEFAULT_PS_MAX_LATENCY_US: u64 = 100_000;

/// Per-controller policy inputs beyond the reported power states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerCapabilities {
    pub apst_supported: bool,
    pub npss: u8,
    /// States with a longer exit latency are never APST targets. 0 disables APST.
    pub ps_max_latency_us: u64,
    pub quirks: Quirks,
}

impl ControllerCapabilities {
    pub fn from_model(model: &PowerStateModel, quirks: Quirks) -> Self {
        Self {
            apst_supported: model.apst_supported(),
            npss: model.npss(),
            ps_max_latency_us: DEFAULT_PS_MAX_LATENCY_US,
            quirks,
        }
    }

    #[must_use]
    pub const fn with_max_latency(mut self, ps_max_latency_us: u64) -> Self {
        self.ps_max_latency_us = ps_max_latency_us;
        self
    }

    #[must_use]
    pub const fn with_quirks(mut self, quirks: Quirks) -> Self {
        self.quirks = self.quirks.union(quirks);
        self
    }

    /// Host policy allows configuring APST.
    pub const fn apst_allowed(&self) -> bool {
        !self.quirks.contains(Quirks::NO_APST) && self.ps_max_latency_us > 0
    }
}
