//! Controller registry.
//!
//! Keeps one entry per published controller. Tokens are never reused, so a
//! stale token simply misses after termination.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::{ControllerEntry, DeviceId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceToken(u64);

impl DeviceToken {
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot {
    id: DeviceId,
    entry: Arc<Mutex<ControllerEntry>>,
}

#[derive(Default)]
pub struct ControllerRegistry {
    next: AtomicU64,
    entries: RwLock<FxHashMap<DeviceToken, Slot>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller. Publishing the same device twice returns the
    /// existing token.
    pub fn insert(&self, entry: ControllerEntry) -> DeviceToken {
        let id = entry.device_id();
        let mut entries = self.entries.write();
        if let Some((&token, _)) = entries.iter().find(|(_, slot)| slot.id == id) {
            return token;
        }
        let token = DeviceToken(self.next.fetch_add(1, Ordering::Relaxed));
        entries.insert(
            token,
            Slot {
                id,
                entry: Arc::new(Mutex::new(entry)),
            },
        );
        token
    }

    pub fn remove(&self, token: DeviceToken) -> Option<Arc<Mutex<ControllerEntry>>> {
        self.entries.write().remove(&token).map(|slot| slot.entry)
    }

    /// Remove by device identifier.
    pub fn remove_device(&self, id: DeviceId) -> Option<Arc<Mutex<ControllerEntry>>> {
        let token = self.find(id)?;
        self.remove(token)
    }

    pub fn get(&self, token: DeviceToken) -> Option<Arc<Mutex<ControllerEntry>>> {
        self.entries.read().get(&token).map(|slot| Arc::clone(&slot.entry))
    }

    pub fn find(&self, id: DeviceId) -> Option<DeviceToken> {
        self.entries
            .read()
            .iter()
            .find(|(_, slot)| slot.id == id)
            .map(|(&token, _)| token)
    }

    /// All live tokens in publication order.
    pub fn tokens(&self) -> Vec<DeviceToken> {
        let mut tokens: Vec<_> = self.entries.read().keys().copied().collect();
        tokens.sort_unstable();
        tokens
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
