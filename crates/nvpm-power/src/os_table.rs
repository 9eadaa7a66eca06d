//! Host-visible power level table.
//!
//! Level 0 is off. Then comes at most one low power level standing for all
//! non-operational states, then one level per operational state from lowest
//! to highest power. The last level is the full power level.

use std::fmt;

use tracing::debug;

use crate::{ControllerCapabilities, PowerStateModel, Quirks};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelKind {
    Off,
    /// Device not usable; the host may idle sleep.
    LowPower,
    /// Device usable; prevents idle sleep.
    Active,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PowerLevel {
    pub kind: LevelKind,
    /// NVMe power state backing this level.
    pub state: Option<u8>,
    /// Entered by the controller's own APST timer, never set by the host.
    pub autonomous: bool,
}

impl PowerLevel {
    const OFF: Self = Self {
        kind: LevelKind::Off,
        state: None,
        autonomous: false,
    };

    pub const fn device_usable(&self) -> bool {
        matches!(self.kind, LevelKind::Active)
    }

    pub const fn prevents_idle_sleep(&self) -> bool {
        matches!(self.kind, LevelKind::Active)
    }

    pub const fn low_power(&self) -> bool {
        matches!(self.kind, LevelKind::LowPower)
    }

    /// Power state the host should set when entering this level.
    pub const fn host_target(&self) -> Option<u8> {
        if self.autonomous { None } else { self.state }
    }
}

impl fmt::Display for PowerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LevelKind::Off => f.write_str("off")?,
            LevelKind::LowPower => f.write_str("low-power")?,
            LevelKind::Active => f.write_str("active")?,
        }
        if let Some(state) = self.state {
            write!(f, " ps{state}")?;
        }
        if self.autonomous {
            f.write_str(" (autonomous)")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OsPowerTable {
    levels: Vec<PowerLevel>,
}

impl OsPowerTable {
    pub fn levels(&self) -> &[PowerLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Never true for a built table; it always has off and one active level.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level(&self, index: usize) -> Option<&PowerLevel> {
        self.levels.get(index)
    }

    /// Index of the highest power level.
    pub fn highest(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// The level to report as active for a proposed level: the proposal
    /// itself when the device is usable there, otherwise full power.
    pub fn active_level(&self, proposed: usize) -> usize {
        match self.levels.get(proposed) {
            Some(level) if level.device_usable() => proposed,
            _ => self.highest(),
        }
    }

    /// Activity always raises the device to full power.
    pub fn tickle_level(&self) -> usize {
        self.highest()
    }
}

/// Build the host power level table.
///
/// Returns `None` when the simple-suspend quirk leaves power management to
/// the bus, or when the controller reports no operational state.
pub fn build_os_power_table(
    model: &PowerStateModel,
    caps: &ControllerCapabilities,
    apst_active: bool,
) -> Option<OsPowerTable> {
    if caps.quirks.contains(Quirks::SIMPLE_SUSPEND) {
        debug!("simple suspend quirk, leaving power management to the bus");
        return None;
    }
    if model.operational_count() == 0 {
        debug!("no operational power states");
        return None;
    }

    let npss = model.npss();
    let skip_deepest = caps.quirks.contains(Quirks::NO_DEEPEST_PS);
    let deepest_non_op = model
        .deepest_first()
        .filter(|s| s.non_operational())
        .find(|s| !(skip_deepest && s.index == npss))
        .map(|s| s.index);
    let any_non_op = model.non_operational_count() > 0;

    let mut levels = Vec::with_capacity(2 + model.operational_count());
    levels.push(PowerLevel::OFF);

    if apst_active && any_non_op {
        levels.push(PowerLevel {
            kind: LevelKind::LowPower,
            state: deepest_non_op,
            autonomous: true,
        });
    } else if let Some(state) = deepest_non_op {
        levels.push(PowerLevel {
            kind: LevelKind::LowPower,
            state: Some(state),
            autonomous: false,
        });
    }

    levels.extend(
        model
            .deepest_first()
            .filter(|s| !s.non_operational())
            .map(|s| PowerLevel {
                kind: LevelKind::Active,
                state: Some(s.index),
                autonomous: false,
            }),
    );

    debug!(levels = levels.len(), apst_active, "built OS power table");
    Some(OsPowerTable { levels })
}
