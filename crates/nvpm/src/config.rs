//! Power manager configuration.

use nvpm_layout::HostRelease;
use nvpm_power::{DEFAULT_PS_MAX_LATENCY_US, PlatformInfo};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// APST exit latency ceiling in µs. 0 disables APST.
    pub ps_max_latency_us: u64,
    /// Configure APST when the device and quirks allow it.
    pub apst: bool,
    /// Replace host power levels with ones derived from the device.
    pub power_management: bool,
    /// Host release family, selects code shapes for layout discovery.
    pub release: HostRelease,
    /// OEM strings for platform quirks.
    pub platform: PlatformInfo,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ps_max_latency_us: DEFAULT_PS_MAX_LATENCY_US,
            apst: true,
            power_management: true,
            release: HostRelease::default(),
            platform: PlatformInfo::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_max_latency(mut self, ps_max_latency_us: u64) -> Self {
        self.ps_max_latency_us = ps_max_latency_us;
        self
    }

    #[must_use]
    pub const fn with_apst(mut self, enabled: bool) -> Self {
        self.apst = enabled;
        self
    }

    #[must_use]
    pub const fn with_power_management(mut self, enabled: bool) -> Self {
        self.power_management = enabled;
        self
    }

    #[must_use]
    pub const fn with_release(mut self, release: HostRelease) -> Self {
        self.release = release;
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = platform;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ps_max_latency_us, 100_000);
        assert!(config.apst);
        assert!(config.power_management);
        assert_eq!(config.release, HostRelease::Modern);
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .with_max_latency(0)
            .with_apst(false)
            .with_release(HostRelease::Sonoma)
            .with_platform(PlatformInfo::default().with_vendor("Dell Inc."));
        assert_eq!(config.ps_max_latency_us, 0);
        assert!(!config.apst);
        assert_eq!(config.release, HostRelease::Sonoma);
        assert_eq!(config.platform.vendor.as_deref(), Some("Dell Inc."));
    }
}
