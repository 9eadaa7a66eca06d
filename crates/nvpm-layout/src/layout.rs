//! Whole-driver layout discovery.

use nvpm_x86::{Decode, X64Decoder};
use tracing::{debug, info};

use crate::{
    CONTROLLER_FROM_RESULT, Field, FunctionId, FunctionLocator, HostRelease, OffsetCache, Probe,
    prp_descriptor_signature, signature_for,
};

/// Fields needed to build and submit an admin feature command.
pub const COMMAND_FIELDS: [Field; 4] = [
    Field::RequestResult,
    Field::RequestController,
    Field::RequestCommand,
    Field::RequestPrpDescriptor,
];

/// Offsets of every catalogued field for one loaded driver image.
pub struct DriverLayout<D = X64Decoder> {
    release: HostRelease,
    cache: OffsetCache<D>,
}

impl DriverLayout<X64Decoder> {
    pub fn new(release: HostRelease) -> Self {
        Self::with_cache(release, OffsetCache::new())
    }
}

impl<D: Decode> DriverLayout<D> {
    pub const fn with_cache(release: HostRelease, cache: OffsetCache<D>) -> Self {
        Self { release, cache }
    }

    pub const fn release(&self) -> HostRelease {
        self.release
    }

    pub const fn cache(&self) -> &OffsetCache<D> {
        &self.cache
    }

    #[inline]
    pub fn offset(&self, field: Field) -> Option<u32> {
        self.cache.get(field)
    }

    /// Whether admin feature commands can be built.
    pub fn supports_feature_commands(&self) -> bool {
        COMMAND_FIELDS.iter().all(|&f| self.cache.has(f))
    }

    /// Resolve one field against the loaded image.
    pub fn resolve(&self, locator: &dyn FunctionLocator, field: Field) -> Probe {
        match field {
            Field::RequestController => self.cache.derive(
                Field::RequestController,
                Field::RequestResult,
                CONTROLLER_FROM_RESULT,
            ),
            Field::RequestPrpDescriptor => self.resolve_prp_descriptor(locator),
            _ => match signature_for(field, self.release) {
                Some((function, sig)) => self.cache.resolve(locator.locate(function), &sig),
                None => Probe::NotAttempted,
            },
        }
    }

    /// Resolve every catalogued field.
    ///
    /// Returns true when feature commands are usable. Optional fields that
    /// fail only disable the behavior that writes them.
    pub fn solve(&self, locator: &dyn FunctionLocator) -> bool {
        for field in Field::ALL {
            let probe = self.resolve(locator, field);
            debug!(%field, %probe, "layout probe");
        }

        let ok = self.supports_feature_commands();
        if ok {
            info!(release = %self.release, "driver layout solved");
        } else {
            info!(release = %self.release, "driver layout incomplete, feature commands unavailable");
        }
        ok
    }

    /// The identify entry point changed its arguments; newer images may
    /// still only carry the old symbol.
    fn resolve_prp_descriptor(&self, locator: &dyn FunctionLocator) -> Probe {
        let new_entry = locator.locate(FunctionId::IssueIdentifyCommandNew);
        let legacy_identify = new_entry.is_none() || !self.release.has_new_identify();
        let (function, sig) = prp_descriptor_signature(self.release, legacy_identify);
        let code = if function == FunctionId::IssueIdentifyCommandNew {
            new_entry
        } else {
            locator.locate(function)
        };
        self.cache.resolve(code, &sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CodeImage;

    const GET_STATUS: &[u8] = &[0x8B, 0x87, 0xA8, 0x00, 0x00, 0x00, 0xC3];
    const GET_OPCODE: &[u8] = &[0x0F, 0xB6, 0x87, 0x0A, 0x01, 0x00, 0x00, 0xC3];
    const IDENTIFY_SONOMA: &[u8] = &[0x4D, 0x89, 0xBE, 0xC0, 0x00, 0x00, 0x00, 0xC3];
    const IDENTIFY_LEGACY: &[u8] = &[0x4C, 0x89, 0xA3, 0xB8, 0x00, 0x00, 0x00, 0xC3];
    const FILTER: &[u8] = &[0x80, 0xBF, 0x69, 0x02, 0x00, 0x00, 0x00, 0xC3];

    fn image(parts: &[(FunctionId, &[u8])]) -> CodeImage {
        let mut bytes = Vec::new();
        let mut symbols = Vec::new();
        for (function, code) in parts {
            symbols.push((function.symbol(), bytes.len() as u64));
            bytes.extend_from_slice(code);
        }
        let mut image = CodeImage::new(0, bytes);
        for (name, addr) in symbols {
            image.define(name, addr);
        }
        image
    }

    #[test]
    fn test_solve_sonoma() {
        let image = image(&[
            (FunctionId::RequestGetStatus, GET_STATUS),
            (FunctionId::RequestGetOpcode, GET_OPCODE),
            (FunctionId::IssueIdentifyCommandNew, IDENTIFY_SONOMA),
            (FunctionId::FilterInterruptRequest, FILTER),
        ]);
        let layout = DriverLayout::new(HostRelease::Sonoma);
        assert!(layout.solve(&image));

        assert_eq!(layout.offset(Field::RequestResult), Some(0xAC));
        assert_eq!(layout.offset(Field::RequestController), Some(0xA0));
        assert_eq!(layout.offset(Field::RequestCommand), Some(0x10A));
        assert_eq!(layout.offset(Field::RequestPrpDescriptor), Some(0xC0));
        assert_eq!(layout.offset(Field::ControllerAns2MsiWorkaround), Some(0x269));
        assert_eq!(layout.offset(Field::ControllerProposedPowerState), None);
    }

    #[test]
    fn test_solve_falls_back_to_legacy_identify() {
        let image = image(&[
            (FunctionId::RequestGetStatus, GET_STATUS),
            (FunctionId::RequestGetOpcode, GET_OPCODE),
            (FunctionId::IssueIdentifyCommand, IDENTIFY_LEGACY),
        ]);
        let layout = DriverLayout::new(HostRelease::Sonoma);
        assert!(layout.solve(&image));
        assert_eq!(layout.offset(Field::RequestPrpDescriptor), Some(0xB8));
        assert_eq!(layout.offset(Field::ControllerAns2MsiWorkaround), None);
    }

    #[test]
    fn test_solve_incomplete() {
        let image = image(&[(FunctionId::RequestGetStatus, GET_STATUS)]);
        let layout = DriverLayout::new(HostRelease::Modern);
        assert!(!layout.solve(&image));
        assert!(!layout.supports_feature_commands());
        assert_eq!(layout.offset(Field::RequestController), Some(0xA0));
    }
}
