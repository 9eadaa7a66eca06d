//! Known driver fields, the functions that touch them, and their signatures.

use std::fmt;
use std::str::FromStr;

use crate::FieldSignature;

/// An opaque structure field whose offset is discovered at run time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Field {
    /// Request completion result (dword0), `u32`.
    RequestResult,
    /// Owning controller back-pointer in a request.
    RequestController,
    /// Submission queue entry embedded in a request.
    RequestCommand,
    /// Data buffer descriptor pointer in a request.
    RequestPrpDescriptor,
    /// Controller flag forcing interrupt masking at filter entry, `u8`.
    ControllerAns2MsiWorkaround,
    /// Power state the host proposes to the controller, `u32`.
    ControllerProposedPowerState,
}

impl Field {
    pub const COUNT: usize = 6;

    pub const ALL: [Self; Self::COUNT] = [
        Self::RequestResult,
        Self::RequestController,
        Self::RequestCommand,
        Self::RequestPrpDescriptor,
        Self::ControllerAns2MsiWorkaround,
        Self::ControllerProposedPowerState,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::RequestResult => "request.result",
            Self::RequestController => "request.controller",
            Self::RequestCommand => "request.command",
            Self::RequestPrpDescriptor => "request.prp_descriptor",
            Self::ControllerAns2MsiWorkaround => "controller.ans2_msi_workaround",
            Self::ControllerProposedPowerState => "controller.proposed_power_state",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|f| f.name()).collect();
                format!("unknown field '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Host OS release family. Selects release-specific code shapes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum HostRelease {
    /// 11.2 and earlier: old identify entry point.
    Legacy,
    /// 11.3 through 13.x.
    #[default]
    Modern,
    /// 14.0 and later.
    Sonoma,
}

impl HostRelease {
    /// Map a major.minor product version to a release family.
    pub const fn from_version(major: u32, minor: u32) -> Self {
        if major >= 14 {
            Self::Sonoma
        } else if major > 11 || (major == 11 && minor >= 3) {
            Self::Modern
        } else {
            Self::Legacy
        }
    }

    /// Whether the identify entry point takes the newer argument list.
    pub const fn has_new_identify(self) -> bool {
        !matches!(self, Self::Legacy)
    }
}

impl FromStr for HostRelease {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(Self::Legacy),
            "modern" => Ok(Self::Modern),
            "sonoma" => Ok(Self::Sonoma),
            _ => {
                let mut parts = s.split('.');
                let major = parts.next().unwrap_or(s);
                let minor = parts.next().unwrap_or("0");
                match (major.parse(), minor.parse()) {
                    (Ok(major), Ok(minor)) => Ok(Self::from_version(major, minor)),
                    _ => Err(format!("invalid host release '{s}'")),
                }
            }
        }
    }
}

impl fmt::Display for HostRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Legacy => "legacy",
            Self::Modern => "modern",
            Self::Sonoma => "sonoma",
        })
    }
}

/// Driver functions whose code is scanned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionId {
    RequestGetStatus,
    RequestGetOpcode,
    IssueIdentifyCommand,
    IssueIdentifyCommandNew,
    FilterInterruptRequest,
    ThreadEntry,
}

impl FunctionId {
    /// Mangled symbol name in the driver image.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::RequestGetStatus => "__ZN16AppleNVMeRequest9GetStatusEv",
            Self::RequestGetOpcode => "__ZN16AppleNVMeRequest9GetOpcodeEv",
            Self::IssueIdentifyCommand => {
                "__ZN16IONVMeController20IssueIdentifyCommandEP18IOMemoryDescriptorP16AppleNVMeRequestj"
            }
            Self::IssueIdentifyCommandNew => {
                "__ZN16IONVMeController20IssueIdentifyCommandEP18IOMemoryDescriptorjb"
            }
            Self::FilterInterruptRequest => {
                "__ZN16IONVMeController22FilterInterruptRequestEP28IOFilterInterruptEventSource"
            }
            Self::ThreadEntry => "__ZN16IONVMeController11ThreadEntryEv",
        }
    }
}

/// Distance from the result field back to the controller pointer.
pub const CONTROLLER_FROM_RESULT: i64 = -12;

/// `mov eax, [rdi+disp]`. The status getter reads 4 bytes before the result.
pub const REQUEST_RESULT: FieldSignature =
    FieldSignature::new(Field::RequestResult, 0x8B, 0, 7).with_adjustment(4);

/// `movzx eax, byte [rdi+disp]` reads the opcode, the first command byte.
pub const REQUEST_COMMAND: FieldSignature = FieldSignature::new(Field::RequestCommand, 0x0F, 0, 7);

/// `mov [r14+disp], r15`
pub const REQUEST_PRP_DESCRIPTOR_SONOMA: FieldSignature =
    FieldSignature::new(Field::RequestPrpDescriptor, 0x89, 7, 14);

/// `mov [rbx+disp], r15`
pub const REQUEST_PRP_DESCRIPTOR_MODERN: FieldSignature =
    FieldSignature::new(Field::RequestPrpDescriptor, 0x89, 7, 3);

/// `mov [rbx+disp], r12` in the old identify entry point.
pub const REQUEST_PRP_DESCRIPTOR_LEGACY: FieldSignature =
    FieldSignature::new(Field::RequestPrpDescriptor, 0x89, 4, 3);

/// `cmp byte [rdi+disp], 0` near the start of the interrupt filter.
pub const CONTROLLER_ANS2_MSI_WORKAROUND: FieldSignature =
    FieldSignature::new(Field::ControllerAns2MsiWorkaround, 0x80, 7, 7).with_budget(32);

/// `mov ecx, [rbx+disp]`
pub const CONTROLLER_PROPOSED_POWER_STATE: FieldSignature =
    FieldSignature::new(Field::ControllerProposedPowerState, 0x8B, 1, 3);

/// Signature and host function for the data buffer descriptor.
///
/// `legacy_identify` is set when only the old identify entry point exists,
/// regardless of the reported release.
pub const fn prp_descriptor_signature(
    release: HostRelease,
    legacy_identify: bool,
) -> (FunctionId, FieldSignature) {
    if legacy_identify || !release.has_new_identify() {
        return (
            FunctionId::IssueIdentifyCommand,
            REQUEST_PRP_DESCRIPTOR_LEGACY,
        );
    }
    match release {
        HostRelease::Sonoma => (
            FunctionId::IssueIdentifyCommandNew,
            REQUEST_PRP_DESCRIPTOR_SONOMA,
        ),
        HostRelease::Legacy | HostRelease::Modern => (
            FunctionId::IssueIdentifyCommandNew,
            REQUEST_PRP_DESCRIPTOR_MODERN,
        ),
    }
}

/// Signature and host function for a directly scanned field.
///
/// Returns `None` for fields derived from another field.
pub const fn signature_for(field: Field, release: HostRelease) -> Option<(FunctionId, FieldSignature)> {
    match field {
        Field::RequestResult => Some((FunctionId::RequestGetStatus, REQUEST_RESULT)),
        Field::RequestController => None,
        Field::RequestCommand => Some((FunctionId::RequestGetOpcode, REQUEST_COMMAND)),
        Field::RequestPrpDescriptor => Some(prp_descriptor_signature(release, false)),
        Field::ControllerAns2MsiWorkaround => Some((
            FunctionId::FilterInterruptRequest,
            CONTROLLER_ANS2_MSI_WORKAROUND,
        )),
        Field::ControllerProposedPowerState => {
            Some((FunctionId::ThreadEntry, CONTROLLER_PROPOSED_POWER_STATE))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_index_matches_all() {
        for (i, field) in Field::ALL.iter().enumerate() {
            assert_eq!(field.index(), i);
        }
    }

    #[test]
    fn test_field_from_str() {
        assert_eq!("request.result".parse::<Field>(), Ok(Field::RequestResult));
        assert!("request.bogus".parse::<Field>().is_err());
    }

    #[test]
    fn test_release_from_version() {
        assert_eq!(HostRelease::from_version(10, 15), HostRelease::Legacy);
        assert_eq!(HostRelease::from_version(11, 2), HostRelease::Legacy);
        assert_eq!(HostRelease::from_version(11, 3), HostRelease::Modern);
        assert_eq!(HostRelease::from_version(13, 6), HostRelease::Modern);
        assert_eq!(HostRelease::from_version(14, 0), HostRelease::Sonoma);
        assert_eq!("15.1".parse::<HostRelease>(), Ok(HostRelease::Sonoma));
        assert_eq!("12".parse::<HostRelease>(), Ok(HostRelease::Modern));
        assert_eq!("modern".parse::<HostRelease>(), Ok(HostRelease::Modern));
        assert!("x.y".parse::<HostRelease>().is_err());
    }

    #[test]
    fn test_release_from_patch_version() {
        assert_eq!("14.0.1".parse::<HostRelease>(), Ok(HostRelease::Sonoma));
        assert_eq!("11.2.3".parse::<HostRelease>(), Ok(HostRelease::Legacy));
        assert_eq!("11.3.1".parse::<HostRelease>(), Ok(HostRelease::Modern));
        assert!("14.x.1".parse::<HostRelease>().is_err());
    }

    #[test]
    fn test_prp_descriptor_variants() {
        let (func, sig) = prp_descriptor_signature(HostRelease::Sonoma, false);
        assert_eq!(func, FunctionId::IssueIdentifyCommandNew);
        assert_eq!((sig.reg, sig.rm), (7, 14));

        let (func, sig) = prp_descriptor_signature(HostRelease::Modern, false);
        assert_eq!(func, FunctionId::IssueIdentifyCommandNew);
        assert_eq!((sig.reg, sig.rm), (7, 3));

        let (func, sig) = prp_descriptor_signature(HostRelease::Sonoma, true);
        assert_eq!(func, FunctionId::IssueIdentifyCommand);
        assert_eq!((sig.reg, sig.rm), (4, 3));

        let (func, _) = prp_descriptor_signature(HostRelease::Legacy, false);
        assert_eq!(func, FunctionId::IssueIdentifyCommand);
    }

    #[test]
    fn test_catalog_budgets() {
        assert_eq!(CONTROLLER_ANS2_MSI_WORKAROUND.budget, 32);
        assert_eq!(REQUEST_RESULT.budget, crate::DEFAULT_BUDGET);
        assert_eq!(REQUEST_RESULT.adjustment, 4);
        assert!(signature_for(Field::RequestController, HostRelease::Modern).is_none());
    }
}
