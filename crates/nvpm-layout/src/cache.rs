//! Resolve-once offset cache.
//!
//! Each field has a write-once slot. The first successful scan fills it under
//! a mutex; every later query reads the slot without locking and without
//! decoding anything. Failures are never stored, so a later query with code
//! to scan can still succeed.

use std::array;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use metrics::counter;
use nvpm_x86::{Decode, X64Decoder};
use parking_lot::Mutex;
use tracing::debug;

use crate::{CodeRegion, Field, FieldSignature, Probe, scan};

pub struct OffsetCache<D = X64Decoder> {
    decoder: D,
    slots: [OnceLock<u32>; Field::COUNT],
    /// Set once a missing field has been reported.
    reported: [AtomicBool; Field::COUNT],
    scan_lock: Mutex<()>,
}

impl OffsetCache<X64Decoder> {
    pub fn new() -> Self {
        Self::with_decoder(X64Decoder)
    }
}

impl Default for OffsetCache<X64Decoder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Decode> OffsetCache<D> {
    pub fn with_decoder(decoder: D) -> Self {
        Self {
            decoder,
            slots: array::from_fn(|_| OnceLock::new()),
            reported: array::from_fn(|_| AtomicBool::new(false)),
            scan_lock: Mutex::new(()),
        }
    }

    pub const fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Cached offset of `field`, if resolved.
    #[inline]
    pub fn get(&self, field: Field) -> Option<u32> {
        self.slots[field.index()].get().copied()
    }

    #[inline]
    pub fn has(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    /// Resolve `sig.field`, scanning `code` only when not yet cached.
    ///
    /// `code` is `None` when the function holding the signature could not be
    /// located; that yields [`Probe::NotAttempted`].
    pub fn resolve(&self, code: Option<CodeRegion<'_>>, sig: &FieldSignature) -> Probe {
        if let Some(offset) = self.get(sig.field) {
            return Probe::Resolved(offset);
        }
        let Some(code) = code else {
            self.report_missing(sig, Probe::NotAttempted);
            return Probe::NotAttempted;
        };

        let _guard = self.scan_lock.lock();
        if let Some(offset) = self.get(sig.field) {
            return Probe::Resolved(offset);
        }

        let probe = scan(&self.decoder, code, sig);
        match probe {
            Probe::Resolved(offset) => self.store(sig.field, offset),
            Probe::NotFound | Probe::NotAttempted => self.report_missing(sig, probe),
        }
        probe
    }

    /// Derive `field` from an already resolved field plus a constant delta.
    pub fn derive(&self, field: Field, from: Field, delta: i64) -> Probe {
        if let Some(offset) = self.get(field) {
            return Probe::Resolved(offset);
        }
        let Some(base) = self.get(from) else {
            return Probe::NotAttempted;
        };
        let Ok(offset) = u32::try_from(i64::from(base) + delta) else {
            return Probe::NotFound;
        };

        let _guard = self.scan_lock.lock();
        self.store(field, offset);
        Probe::Resolved(self.get(field).unwrap_or(offset))
    }

    /// Current state of every field.
    pub fn snapshot(&self) -> [(Field, Option<u32>); Field::COUNT] {
        Field::ALL.map(|field| (field, self.get(field)))
    }

    fn store(&self, field: Field, offset: u32) {
        if self.slots[field.index()].set(offset).is_ok() {
            counter!("nvpm_fields_resolved_total").increment(1);
            debug!(%field, offset = format!("{:#x}", offset), "resolved field");
        }
    }

    fn report_missing(&self, sig: &FieldSignature, probe: Probe) {
        if !self.reported[sig.field.index()].swap(true, Ordering::Relaxed) {
            counter!("nvpm_fields_missing_total").increment(1);
            debug!(field = %sig.field, signature = %sig, %probe, "field offset unavailable");
        }
    }
}
