//! Autonomous Power State Transition table.
//!
//! Each of the 32 entries says which non-operational state the controller
//! should drop to after the given idle time while in the entry's state.
//! Entry layout: bits 3..8 target state, bits 8..32 idle time in ms.

use std::fmt;

use tracing::debug;

use crate::{ControllerCapabilities, PowerStateModel, Quirks};

/// Set/Get Features identifier for APST.
pub const APST_FEATURE_ID: u8 = 0x0C;
/// Dword 11 value enabling APST.
pub const APST_ENABLE: u32 = 1;
pub const APST_ENTRIES: usize = 32;
/// Feature data size: 32 little-endian 8-byte words.
pub const APST_DATA_LEN: usize = APST_ENTRIES * 8;

const MAX_IDLE_MS: u64 = (1 << 24) - 1;

/// Idle time before transition: 50x the round trip latency, in ms.
pub const fn idle_time_ms(total_latency_us: u64) -> u64 {
    let ms = total_latency_us.div_ceil(20);
    if ms > MAX_IDLE_MS { MAX_IDLE_MS } else { ms }
}

/// One table entry. Zero means no transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApstEntry(pub u64);

impl ApstEntry {
    pub const fn new(target_state: u8, idle_time_ms: u64) -> Self {
        Self(((target_state as u64) << 3) | (idle_time_ms << 8))
    }

    pub const fn target_state(self) -> u8 {
        ((self.0 >> 3) & 0x1F) as u8
    }

    pub const fn idle_time_ms(self) -> u32 {
        ((self.0 >> 8) & MAX_IDLE_MS) as u32
    }

    pub const fn is_enabled(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ApstEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_enabled() {
            write!(
                f,
                "-> ps{} after {}ms ({:#x})",
                self.target_state(),
                self.idle_time_ms(),
                self.0
            )
        } else {
            f.write_str("none")
        }
    }
}

/// The full 32-entry table, indexed by source power state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApstTable {
    entries: [ApstEntry; APST_ENTRIES],
}

impl ApstTable {
    pub const fn entry(&self, state: usize) -> ApstEntry {
        if state < APST_ENTRIES {
            self.entries[state]
        } else {
            ApstEntry(0)
        }
    }

    pub const fn entries(&self) -> &[ApstEntry; APST_ENTRIES] {
        &self.entries
    }

    /// Raw entry words.
    pub fn words(&self) -> [u64; APST_ENTRIES] {
        self.entries.map(|e| e.0)
    }

    /// Encode as Set Features data, little-endian regardless of host order.
    pub fn to_feature_data(&self) -> [u8; APST_DATA_LEN] {
        let mut data = [0u8; APST_DATA_LEN];
        for (chunk, entry) in data.chunks_exact_mut(8).zip(&self.entries) {
            chunk.copy_from_slice(&entry.0.to_le_bytes());
        }
        data
    }

    /// Decode Get Features data. Returns `None` when `data` is short.
    pub fn from_feature_data(data: &[u8]) -> Option<Self> {
        let data = data.get(..APST_DATA_LEN)?;
        let mut table = Self::default();
        for (entry, chunk) in table.entries.iter_mut().zip(data.chunks_exact(8)) {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            *entry = ApstEntry(u64::from_le_bytes(word));
        }
        Some(table)
    }
}

/// Result of planning APST for a controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApstPlan {
    pub table: ApstTable,
    /// Deepest state any entry transitions to.
    pub deepest_target: u8,
    /// Largest entry+exit latency among chosen targets.
    pub max_latency_us: u64,
}

/// Build the APST table.
///
/// States are walked from deepest to highest power. Each usable
/// non-operational state becomes the idle target of every higher power
/// state until a shallower usable one replaces it. Returns `None` when APST
/// is unsupported or disallowed, or no state qualifies.
pub fn build_autonomous_table(
    model: &PowerStateModel,
    caps: &ControllerCapabilities,
) -> Option<ApstPlan> {
    if !caps.apst_supported {
        debug!("APST unsupported by controller");
        return None;
    }
    if !caps.apst_allowed() {
        debug!(quirks = %caps.quirks, max_latency_us = caps.ps_max_latency_us, "APST not allowed");
        return None;
    }

    let npss = model.npss();
    let skip_deepest = caps.quirks.contains(Quirks::NO_DEEPEST_PS);
    let mut table = ApstTable::default();
    let mut target: Option<ApstEntry> = None;
    let mut deepest_target: Option<u8> = None;
    let mut max_latency_us = 0u64;

    for state in model.deepest_first() {
        let index = usize::from(state.index);
        if let Some(target) = target {
            table.entries[index] = target;
            debug!(state = state.index, entry = format!("{:#x}", target.0), "set APST entry");
        }

        if state.index == npss && skip_deepest {
            continue;
        }
        if !state.non_operational() {
            continue;
        }
        if u64::from(state.exit_latency_us()) > caps.ps_max_latency_us {
            continue;
        }

        let total = state.total_latency_us();
        target = Some(ApstEntry::new(state.index, idle_time_ms(total)));
        deepest_target.get_or_insert(state.index);
        max_latency_us = max_latency_us.max(total);
    }

    let Some(deepest_target) = deepest_target else {
        debug!("no non-operational states are available");
        return None;
    };

    debug!(
        max_ps = deepest_target,
        max_latency_us, "APST plan built"
    );
    Some(ApstPlan {
        table,
        deepest_target,
        max_latency_us,
    })
}
