//! Lifecycle glue between the host driver and per-controller bring-up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nvpm_layout::{DriverLayout, FunctionLocator};
use tracing::{debug, error, info};

use crate::{
    Config, ControllerEntry, ControllerRegistry, DeviceId, DeviceToken, NvmeDevice, Result,
};

pub struct PowerManager {
    config: Config,
    layout: DriverLayout,
    registry: ControllerRegistry,
    solved: AtomicBool,
}

impl PowerManager {
    pub fn new(config: Config) -> Self {
        let layout = DriverLayout::new(config.release);
        Self {
            config,
            layout,
            registry: ControllerRegistry::new(),
            solved: AtomicBool::new(false),
        }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn layout(&self) -> &DriverLayout {
        &self.layout
    }

    pub const fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    /// Layout discovery has run.
    pub fn is_solved(&self) -> bool {
        self.solved.load(Ordering::Acquire)
    }

    /// The storage driver image is available. Discovers its layout and
    /// handles every controller published so far.
    ///
    /// Returns whether feature commands are usable.
    pub fn on_driver_loaded(&self, locator: &dyn FunctionLocator) -> bool {
        let ok = self.layout.solve(locator);
        self.solved.store(true, Ordering::Release);
        self.handle_controllers();
        ok
    }

    /// A controller appeared. It is handled right away when the layout is
    /// already known, otherwise on driver load.
    pub fn on_controller_published(&self, device: Arc<dyn NvmeDevice>) -> DeviceToken {
        let name = device.name();
        let token = self.registry.insert(ControllerEntry::new(device));
        debug!(device = %name, %token, "controller published");
        if self.is_solved() {
            self.handle_one(token);
        }
        token
    }

    /// A controller went away. Returns whether it was registered.
    pub fn on_controller_terminated(&self, id: DeviceId) -> bool {
        let removed = self.registry.remove_device(id).is_some();
        if removed {
            debug!(device = id, "controller terminated");
        }
        removed
    }

    /// Handle every registered controller not yet processed.
    pub fn handle_controllers(&self) {
        for token in self.registry.tokens() {
            self.handle_one(token);
        }
    }

    fn handle_one(&self, token: DeviceToken) {
        let Some(entry) = self.registry.get(token) else {
            return;
        };
        let mut entry = entry.lock();
        if entry.processed() {
            return;
        }
        if let Err(e) = entry.handle(&self.layout, &self.config) {
            error!(device = %entry.device().name(), error = %e, "power management setup failed");
        }
    }

    /// Re-read Identify for a controller and rebuild its tables.
    pub fn reidentify(&self, id: DeviceId) -> Result<()> {
        let Some(entry) = self.registry.find(id).and_then(|t| self.registry.get(t)) else {
            return Ok(());
        };
        let mut entry = entry.lock();
        entry.reidentify(&self.layout, &self.config)?;
        info!(device = id, "controller re-identified");
        Ok(())
    }

    /// Host query for the level to report as active.
    ///
    /// `None` means the host should use its own answer.
    pub fn active_power_state(&self, id: DeviceId, proposed: usize) -> Option<usize> {
        self.registry
            .find(id)
            .and_then(|t| self.registry.get(t))
            .and_then(|entry| entry.lock().active_level(proposed))
    }

    /// Host activity notification. Returns the level to raise to.
    pub fn activity_tickle(&self, id: DeviceId, requested: usize) -> usize {
        self.registry
            .find(id)
            .and_then(|t| self.registry.get(t))
            .map_or(requested, |entry| entry.lock().tickle_level(requested))
    }

    /// Whether the controller reports APST enabled.
    pub fn apst_enabled(&self, id: DeviceId) -> Result<Option<bool>> {
        let Some(entry) = self.registry.find(id).and_then(|t| self.registry.get(t)) else {
            return Ok(None);
        };
        let enabled = entry.lock().apst_enabled(&self.layout)?;
        Ok(Some(enabled))
    }
}
