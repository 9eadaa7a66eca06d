//! Per-controller power plan.
//!
//! Combines parsed Identify data, quirks and configuration into the APST
//! table and the host power level table. Pure; no device access.

use nvpm_power::{
    ApstPlan, ControllerCapabilities, IdentifyController, OsPowerTable, PowerStateModel, Quirks,
    build_autonomous_table, build_os_power_table, identity_quirks,
};
use tracing::debug;

use crate::{Config, Result};

#[derive(Clone, Debug)]
pub struct PowerPlan {
    /// Bus quirks plus identity quirks.
    pub quirks: Quirks,
    pub caps: ControllerCapabilities,
    pub model: PowerStateModel,
    /// `None` when APST is unsupported, disallowed or has no target.
    pub apst: Option<ApstPlan>,
}

impl PowerPlan {
    pub fn new(
        id: &IdentifyController,
        bus_quirks: Quirks,
        ps_max_latency_us: u64,
        config: &Config,
    ) -> Result<Self> {
        let quirks = bus_quirks | identity_quirks(id.vid, &id.mn, &id.fr);
        let model = PowerStateModel::from_identify(id)?;
        let caps = ControllerCapabilities::from_model(&model, quirks)
            .with_max_latency(ps_max_latency_us);

        let apst = if config.apst {
            build_autonomous_table(&model, &caps)
        } else {
            debug!("APST disabled by configuration");
            None
        };

        debug!(
            model = model.model(),
            npss = model.npss(),
            apsta = model.apst_supported(),
            %quirks,
            "power plan"
        );
        Ok(Self {
            quirks,
            caps,
            model,
            apst,
        })
    }

    /// Host power level table given whether APST ended up enabled.
    pub fn os_table(&self, apst_active: bool, config: &Config) -> Option<OsPowerTable> {
        if !config.power_management {
            return None;
        }
        build_os_power_table(&self.model, &self.caps, apst_active)
    }
}
