//! Per-controller bring-up.
//!
//! A [`ControllerEntry`] owns everything derived for one controller: quirks,
//! the parsed Identify data, the power plan, whether APST ended up enabled,
//! and the host power level table. It is handled once after the driver
//! layout is known; re-identification replaces the derived state.

use std::sync::Arc;

use metrics::counter;
use nvpm_layout::{DriverLayout, Field};
use nvpm_power::{
    APST_DATA_LEN, APST_ENABLE, APST_FEATURE_ID, ApstPlan, ApstTable, IdentifyController,
    OsPowerTable, Quirks, bus_quirks,
};
use nvpm_x86::Decode;
use tracing::{debug, info, warn};

use crate::{APPLE_VENDOR_ID, Config, DeviceId, Error, NvmeDevice, PowerPlan, Result};

/// Value written to the ANS2 MSI workaround flag.
const ANS2_MSI_WORKAROUND: u8 = 1;

pub struct ControllerEntry {
    device: Arc<dyn NvmeDevice>,
    processed: bool,
    skipped: bool,
    bus_quirks: Quirks,
    ps_max_latency_us: u64,
    identify: Option<IdentifyController>,
    plan: Option<PowerPlan>,
    apst_enabled: bool,
    power_table: Option<OsPowerTable>,
}

impl ControllerEntry {
    pub fn new(device: Arc<dyn NvmeDevice>) -> Self {
        Self {
            device,
            processed: false,
            skipped: false,
            bus_quirks: Quirks::NONE,
            ps_max_latency_us: 0,
            identify: None,
            plan: None,
            apst_enabled: false,
            power_table: None,
        }
    }

    pub fn device(&self) -> &Arc<dyn NvmeDevice> {
        &self.device
    }

    pub fn device_id(&self) -> DeviceId {
        self.device.id()
    }

    /// Handled once, whatever the outcome.
    pub const fn processed(&self) -> bool {
        self.processed
    }

    /// Left alone because its own vendor driver manages it.
    pub const fn skipped(&self) -> bool {
        self.skipped
    }

    /// Effective quirks. Identity quirks are only known after identify.
    pub fn quirks(&self) -> Quirks {
        self.plan.as_ref().map_or(self.bus_quirks, |plan| plan.quirks)
    }

    pub const fn ps_max_latency_us(&self) -> u64 {
        self.ps_max_latency_us
    }

    pub const fn identify(&self) -> Option<&IdentifyController> {
        self.identify.as_ref()
    }

    pub const fn plan(&self) -> Option<&PowerPlan> {
        self.plan.as_ref()
    }

    /// The APST table that was accepted by the controller.
    pub fn apst(&self) -> Option<&ApstPlan> {
        if self.apst_enabled {
            self.plan.as_ref().and_then(|plan| plan.apst.as_ref())
        } else {
            None
        }
    }

    pub const fn apst_active(&self) -> bool {
        self.apst_enabled
    }

    pub const fn power_table(&self) -> Option<&OsPowerTable> {
        self.power_table.as_ref()
    }

    /// Bring up power management for this controller.
    ///
    /// Runs once; later calls return immediately. Errors leave the
    /// controller with whatever the host configured on its own.
    pub fn handle<D: Decode>(&mut self, layout: &DriverLayout<D>, config: &Config) -> Result<()> {
        if self.processed {
            return Ok(());
        }
        self.processed = true;

        let name = self.device.name();
        let pci = self.device.pci_identity();
        if pci.is_some_and(|p| p.vendor == APPLE_VENDOR_ID) {
            info!(device = %name, "skipping Apple controller");
            self.skipped = true;
            return Ok(());
        }

        self.apply_msi_workaround(layout);

        self.bus_quirks = pci.map_or(Quirks::NONE, |p| {
            bus_quirks(p.vendor, p.device, &config.platform)
        });
        self.ps_max_latency_us = match self.device.ps_max_latency_us() {
            Some(latency) => {
                debug!(device = %name, latency, "device overrides max latency");
                latency
            }
            None => config.ps_max_latency_us,
        };

        self.configure(layout, config)
    }

    /// Read Identify again and rebuild the plan and tables.
    pub fn reidentify<D: Decode>(&mut self, layout: &DriverLayout<D>, config: &Config) -> Result<()> {
        if self.skipped {
            return Ok(());
        }
        if !self.processed {
            debug!(device = %self.device.name(), "not brought up yet, deferring to bring-up");
            return Ok(());
        }
        self.configure(layout, config)
    }

    fn apply_msi_workaround<D: Decode>(&self, layout: &DriverLayout<D>) {
        let Some(offset) = layout.offset(Field::ControllerAns2MsiWorkaround) else {
            debug!(device = %self.device.name(), "MSI workaround offset unknown, skipping");
            return;
        };
        match self.device.write_u8(offset, ANS2_MSI_WORKAROUND) {
            Ok(()) => debug!(
                device = %self.device.name(),
                offset = format!("{offset:#x}"),
                "applied MSI workaround"
            ),
            Err(e) => warn!(device = %self.device.name(), error = %e, "MSI workaround failed"),
        }
    }

    fn configure<D: Decode>(&mut self, layout: &DriverLayout<D>, config: &Config) -> Result<()> {
        // Derived state never outlives a failed identify.
        self.clear_derived();

        let name = self.device.name();
        let data = self.device.read_identify()?;
        let identify = IdentifyController::parse(&data)?;
        let plan = PowerPlan::new(&identify, self.bus_quirks, self.ps_max_latency_us, config)?;

        if let Some(apst) = &plan.apst {
            match self.configure_apst(layout, apst) {
                Ok(()) => self.apst_enabled = true,
                Err(e) => warn!(device = %name, error = %e, "APST left disabled"),
            }
        }

        let table = plan.os_table(self.apst_enabled, config);
        self.identify = Some(identify);
        self.plan = Some(plan);

        let Some(table) = table else {
            debug!(device = %name, "host power states unchanged");
            return Ok(());
        };
        self.device.register_power_states(&table)?;
        info!(
            device = %name,
            levels = table.len(),
            apst = self.apst_enabled,
            "registered power states"
        );
        self.power_table = Some(table);
        Ok(())
    }

    fn clear_derived(&mut self) {
        self.identify = None;
        self.plan = None;
        self.apst_enabled = false;
        self.power_table = None;
    }

    fn configure_apst<D: Decode>(&self, layout: &DriverLayout<D>, apst: &ApstPlan) -> Result<()> {
        Self::require_feature_commands(layout)?;

        let mut data = apst.table.to_feature_data();
        let result = self.device.issue_feature_command(
            APST_FEATURE_ID,
            Some(APST_ENABLE),
            Some(&mut data),
            true,
        );
        if let Err(e) = result {
            counter!("nvpm_feature_commands_failed_total").increment(1);
            return Err(e.into());
        }

        counter!("nvpm_apst_enabled_total").increment(1);
        info!(
            device = %self.device.name(),
            max_ps = apst.deepest_target,
            max_latency_us = apst.max_latency_us,
            "APST enabled"
        );
        Ok(())
    }

    /// Whether the controller reports APST as enabled.
    pub fn apst_enabled<D: Decode>(&self, layout: &DriverLayout<D>) -> Result<bool> {
        Self::require_feature_commands(layout)?;
        let dword0 = self
            .device
            .issue_feature_command(APST_FEATURE_ID, None, None, false)
            .inspect_err(|_| counter!("nvpm_feature_commands_failed_total").increment(1))?;
        Ok(dword0 & 1 != 0)
    }

    /// Read the controller's current APST table.
    pub fn dump_apst<D: Decode>(&self, layout: &DriverLayout<D>) -> Result<ApstTable> {
        Self::require_feature_commands(layout)?;
        let mut data = [0u8; APST_DATA_LEN];
        self.device
            .issue_feature_command(APST_FEATURE_ID, None, Some(&mut data), false)
            .inspect_err(|_| counter!("nvpm_feature_commands_failed_total").increment(1))?;
        ApstTable::from_feature_data(&data)
            .ok_or_else(|| Error::InvalidCapability("short APST feature data".to_string()))
    }

    /// Level to report for a proposed level. `None` until a table exists.
    pub fn active_level(&self, proposed: usize) -> Option<usize> {
        self.power_table
            .as_ref()
            .map(|table| table.active_level(proposed))
    }

    /// Level to raise to on device activity. Without a table the request
    /// is passed through.
    pub fn tickle_level(&self, requested: usize) -> usize {
        self.power_table
            .as_ref()
            .map_or(requested, OsPowerTable::tickle_level)
    }

    fn require_feature_commands<D: Decode>(layout: &DriverLayout<D>) -> Result<()> {
        if layout.supports_feature_commands() {
            Ok(())
        } else {
            Err(Error::CapabilityUnavailable(
                "admin feature command fields not located".to_string(),
            ))
        }
    }
}
