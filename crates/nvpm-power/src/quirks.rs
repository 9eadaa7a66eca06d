//! Device quirks: behavior overrides for controllers that misbehave.
//!
//! Quirks come from three tables: PCI vendor/device IDs, identity strings
//! (vendor, model, firmware) from Identify Controller, and known bad
//! platform combinations keyed by OEM strings. Only `NO_APST`,
//! `NO_DEEPEST_PS` and `SIMPLE_SUSPEND` change power policy; the other bits
//! are carried for reporting.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Quirks(u64);

impl Quirks {
    pub const NONE: Self = Self(0);
    pub const STRIPE_SIZE: Self = Self(1 << 0);
    pub const IDENTIFY_CNS: Self = Self(1 << 1);
    pub const DEALLOCATE_ZEROES: Self = Self(1 << 2);
    pub const DELAY_BEFORE_CHK_RDY: Self = Self(1 << 3);
    /// Autonomous transitions must stay off.
    pub const NO_APST: Self = Self(1 << 4);
    /// The deepest power state must not be used.
    pub const NO_DEEPEST_PS: Self = Self(1 << 5);
    pub const LIGHTNVM: Self = Self(1 << 6);
    pub const MEDIUM_PRIO_SQ: Self = Self(1 << 7);
    pub const IGNORE_DEV_SUBNQN: Self = Self(1 << 8);
    pub const DISABLE_WRITE_ZEROES: Self = Self(1 << 9);
    /// Leave power management to the bus driver.
    pub const SIMPLE_SUSPEND: Self = Self(1 << 10);
    pub const SINGLE_VECTOR: Self = Self(1 << 11);
    pub const SQES_128_BYTES: Self = Self(1 << 12);
    pub const SHARED_TAGS: Self = Self(1 << 13);

    const NAMES: [(Self, &'static str); 14] = [
        (Self::STRIPE_SIZE, "stripe-size"),
        (Self::IDENTIFY_CNS, "identify-cns"),
        (Self::DEALLOCATE_ZEROES, "deallocate-zeroes"),
        (Self::DELAY_BEFORE_CHK_RDY, "delay-before-chk-rdy"),
        (Self::NO_APST, "no-apst"),
        (Self::NO_DEEPEST_PS, "no-deepest-ps"),
        (Self::LIGHTNVM, "lightnvm"),
        (Self::MEDIUM_PRIO_SQ, "medium-prio-sq"),
        (Self::IGNORE_DEV_SUBNQN, "ignore-dev-subnqn"),
        (Self::DISABLE_WRITE_ZEROES, "disable-write-zeroes"),
        (Self::SIMPLE_SUSPEND, "simple-suspend"),
        (Self::SINGLE_VECTOR, "single-vector"),
        (Self::SQES_128_BYTES, "128-bytes-sqes"),
        (Self::SHARED_TAGS, "shared-tags"),
    ];

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for Quirks {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Quirks {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Display for Quirks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (quirk, name) in Self::NAMES {
            if self.contains(quirk) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

const fn q(a: Quirks, b: Quirks) -> Quirks {
    a.union(b)
}

/// (vendor, device, quirks)
static PCI_QUIRKS: &[(u16, u16, Quirks)] = &[
    (0x8086, 0x0953, q(Quirks::STRIPE_SIZE, Quirks::DEALLOCATE_ZEROES)),
    (0x8086, 0x0a53, q(Quirks::STRIPE_SIZE, Quirks::DEALLOCATE_ZEROES)),
    (0x8086, 0x0a54, q(Quirks::STRIPE_SIZE, Quirks::DEALLOCATE_ZEROES)),
    (0x8086, 0x0a55, q(Quirks::STRIPE_SIZE, Quirks::DEALLOCATE_ZEROES)),
    (0x8086, 0xf1a5, q(Quirks::NO_DEEPEST_PS, Quirks::MEDIUM_PRIO_SQ)), // Intel 600P/P3100
    (0x8086, 0xf1a6, Quirks::IGNORE_DEV_SUBNQN),                        // Intel 760p/Pro 7600p
    (0x8086, 0x5845, q(Quirks::IDENTIFY_CNS, Quirks::DISABLE_WRITE_ZEROES)), // QEMU
    (0x1bb1, 0x0100, Quirks::DELAY_BEFORE_CHK_RDY), // Seagate Nytro
    (0x1c58, 0x0003, Quirks::DELAY_BEFORE_CHK_RDY), // HGST adapter
    (0x1c58, 0x0023, Quirks::DELAY_BEFORE_CHK_RDY), // WDC SN200 adapter
    (0x1c5f, 0x0540, Quirks::DELAY_BEFORE_CHK_RDY), // Memblaze Pblaze4
    (0x144d, 0xa821, Quirks::DELAY_BEFORE_CHK_RDY), // Samsung PM1725
    (0x144d, 0xa822, Quirks::DELAY_BEFORE_CHK_RDY), // Samsung PM1725a
    (0x1d1d, 0x1f1f, Quirks::LIGHTNVM),
    (0x1d1d, 0x2807, Quirks::LIGHTNVM), // CNEX WL
    (0x1d1d, 0x2601, Quirks::LIGHTNVM), // CNEX Granby
    (0x10ec, 0x5762, Quirks::IGNORE_DEV_SUBNQN), // ADATA SX6000LNP
    (0x1cc1, 0x8201, q(Quirks::NO_DEEPEST_PS, Quirks::IGNORE_DEV_SUBNQN)), // ADATA SX8200PNP
    (0x1d97, 0x2269, Quirks::IGNORE_DEV_SUBNQN), // Lexar NM760
    (0x1e49, 0x0021, Quirks::NO_DEEPEST_PS),     // ZHITAI TiPro5000
    (0x1e49, 0x0041, Quirks::NO_DEEPEST_PS),     // ZHITAI TiPro7000
    (0x2646, 0x2262, Quirks::NO_DEEPEST_PS),     // Kingston SKC2000
    (0x2646, 0x2263, Quirks::NO_DEEPEST_PS),     // Kingston A2000
    (0x2646, 0x5016, Quirks::DISABLE_WRITE_ZEROES),
    (0x2646, 0x5018, Quirks::DISABLE_WRITE_ZEROES),
    (0x2646, 0x501a, Quirks::DISABLE_WRITE_ZEROES),
    (0x2646, 0x501b, Quirks::DISABLE_WRITE_ZEROES),
    (0x2646, 0x501e, Quirks::DISABLE_WRITE_ZEROES),
    (0x126f, 0x2262, Quirks::NO_DEEPEST_PS), // Silicon Motion generic
    (0x1344, 0x5407, Quirks::IGNORE_DEV_SUBNQN),
    (0x144d, 0xa809, Quirks::DISABLE_WRITE_ZEROES),
    (0x144d, 0xa80b, Quirks::DISABLE_WRITE_ZEROES),
    (0x15b7, 0x2001, Quirks::DISABLE_WRITE_ZEROES), // Sandisk Skyhawk
    (0x1987, 0x5016, Quirks::IGNORE_DEV_SUBNQN),    // Phison E16
    (0x1987, 0x5019, Quirks::DISABLE_WRITE_ZEROES), // Phison E19
    (0x1987, 0x5021, Quirks::DISABLE_WRITE_ZEROES), // Phison E21
    (0x1c5c, 0x1504, Quirks::DISABLE_WRITE_ZEROES), // SK Hynix PC400
    (0x1c5c, 0x1d59, Quirks::DISABLE_WRITE_ZEROES), // SK Hynix BC901
    (0x1c5c, 0x2849, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x243b, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x2839, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x2204, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x2429, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x174a, Quirks::DISABLE_WRITE_ZEROES), // Gold P31
    (0x1c5c, 0x1639, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x1739, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x1959, Quirks::DISABLE_WRITE_ZEROES), // Platinum P41
    (0x1c5c, 0x1285, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x1327, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x1527, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x1339, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x1627, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x1283, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x1284, Quirks::DISABLE_WRITE_ZEROES),
    (0x1c5c, 0x1282, Quirks::DISABLE_WRITE_ZEROES),
    (0x1cc4, 0x6302, Quirks::DISABLE_WRITE_ZEROES), // UMIS 256G
    (0x1cc4, 0x6303, Quirks::DISABLE_WRITE_ZEROES), // UMIS 512G
];

/// Identity string entry. `None` strings and a zero vendor match anything.
struct IdentityQuirk {
    vid: u16,
    model: Option<&'static str>,
    firmware: Option<&'static str>,
    quirks: Quirks,
}

static IDENTITY_QUIRKS: &[IdentityQuirk] = &[
    // Toshiba dies with any APST state enabled.
    IdentityQuirk {
        vid: 0x1179,
        model: Some("THNSF5256GPUK TOSHIBA"),
        firmware: None,
        quirks: Quirks::NO_APST,
    },
    // LiteON CL1-3D*-Q11 suspend-to-idle race.
    IdentityQuirk {
        vid: 0x14a4,
        model: None,
        firmware: Some("22301111"),
        quirks: Quirks::SIMPLE_SUSPEND,
    },
    // Kingston E8FK11.T: no interrupt after resume.
    IdentityQuirk {
        vid: 0x2646,
        model: None,
        firmware: Some("E8FK11"),
        quirks: Quirks::SIMPLE_SUSPEND,
    },
    // Kingston A2000 5Z42105 hangs in the deepest state.
    IdentityQuirk {
        vid: 0x2646,
        model: None,
        firmware: Some("S5Z42105"),
        quirks: Quirks::NO_DEEPEST_PS,
    },
];

/// Quirks keyed by PCI vendor and device ID.
pub fn pci_quirks(vendor: u16, device: u16) -> Quirks {
    PCI_QUIRKS
        .iter()
        .filter(|(v, d, _)| *v == vendor && *d == device)
        .fold(Quirks::NONE, |acc, (_, _, quirks)| acc | *quirks)
}

/// Quirks keyed by identify vendor, model and firmware.
///
/// `model` and `firmware` are the raw space-padded identify fields.
pub fn identity_quirks(vid: u16, model: &[u8], firmware: &[u8]) -> Quirks {
    IDENTITY_QUIRKS
        .iter()
        .filter(|entry| {
            (entry.vid == 0 || entry.vid == vid)
                && id_matches(entry.model, model)
                && id_matches(entry.firmware, firmware)
        })
        .fold(Quirks::NONE, |acc, entry| acc | entry.quirks)
}

/// Table string must be a prefix followed only by space padding.
fn id_matches(expected: Option<&str>, id: &[u8]) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let expected = expected.as_bytes();
    id.starts_with(expected)
        && id[expected.len()..].iter().all(|&b| b == b' ')
}

/// OEM strings identifying the host platform.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlatformInfo {
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub board: Option<String>,
}

impl PlatformInfo {
    #[must_use]
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    #[must_use]
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    #[must_use]
    pub fn with_board(mut self, board: impl Into<String>) -> Self {
        self.board = Some(board.into());
        self
    }
}

/// Quirks for known bad device/platform combinations.
pub fn platform_quirks(vendor: u16, device: u16, platform: &PlatformInfo) -> Quirks {
    let oem = platform.vendor.as_deref();
    match (vendor, device) {
        // Samsung SM951/PM951/950 PRO drop off the bus in the deepest state
        // with APST on, seen only on two Dell laptops.
        (0x144d, 0xa802) => match (oem, platform.product.as_deref()) {
            (Some("Dell Inc."), Some("XPS 15 9550" | "Precision 5510")) => Quirks::NO_DEEPEST_PS,
            _ => Quirks::NONE,
        },
        // Samsung 960 EVO drops off the bus on two ASUS boards.
        (0x144d, 0xa804) => match (oem, platform.board.as_deref()) {
            (Some("ASUSTeK COMPUTER INC."), Some("PRIME B350M-A" | "PRIME Z370-A")) => {
                Quirks::NO_APST
            }
            _ => Quirks::NONE,
        },
        _ => Quirks::NONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad<const N: usize>(s: &str) -> [u8; N] {
        let mut out = [b' '; N];
        out[..s.len()].copy_from_slice(s.as_bytes());
        out
    }

    #[test]
    fn test_pci_quirks() {
        assert_eq!(
            pci_quirks(0x8086, 0xf1a5),
            Quirks::NO_DEEPEST_PS | Quirks::MEDIUM_PRIO_SQ
        );
        assert_eq!(pci_quirks(0x2646, 0x2263), Quirks::NO_DEEPEST_PS);
        assert_eq!(pci_quirks(0x1234, 0x5678), Quirks::NONE);
    }

    #[test]
    fn test_identity_quirks_model() {
        let mn = pad::<40>("THNSF5256GPUK TOSHIBA");
        let fr = pad::<8>("51055KLA");
        assert_eq!(identity_quirks(0x1179, &mn, &fr), Quirks::NO_APST);
        // Wrong vendor
        assert_eq!(identity_quirks(0x1180, &mn, &fr), Quirks::NONE);
        // Longer model is not a match
        let longer = pad::<40>("THNSF5256GPUK TOSHIBA X");
        assert_eq!(identity_quirks(0x1179, &longer, &fr), Quirks::NONE);
    }

    #[test]
    fn test_identity_quirks_firmware() {
        let mn = pad::<40>("KINGSTON SA2000M8500G");
        assert_eq!(
            identity_quirks(0x2646, &mn, &pad::<8>("S5Z42105")),
            Quirks::NO_DEEPEST_PS
        );
        assert_eq!(
            identity_quirks(0x2646, &mn, &pad::<8>("E8FK11")),
            Quirks::SIMPLE_SUSPEND
        );
        assert_eq!(identity_quirks(0x2646, &mn, &pad::<8>("E8FK11.T")), Quirks::NONE);
        assert_eq!(
            identity_quirks(0x14a4, &mn, b"22301111"),
            Quirks::SIMPLE_SUSPEND
        );
    }

    #[test]
    fn test_platform_quirks() {
        let dell = PlatformInfo::default()
            .with_vendor("Dell Inc.")
            .with_product("XPS 15 9550");
        assert_eq!(platform_quirks(0x144d, 0xa802, &dell), Quirks::NO_DEEPEST_PS);
        assert_eq!(platform_quirks(0x144d, 0xa804, &dell), Quirks::NONE);

        let asus = PlatformInfo::default()
            .with_vendor("ASUSTeK COMPUTER INC.")
            .with_board("PRIME Z370-A");
        assert_eq!(platform_quirks(0x144d, 0xa804, &asus), Quirks::NO_APST);

        assert_eq!(platform_quirks(0x144d, 0xa802, &PlatformInfo::default()), Quirks::NONE);
    }

    #[test]
    fn test_display() {
        assert_eq!(Quirks::NONE.to_string(), "none");
        assert_eq!(
            (Quirks::NO_APST | Quirks::NO_DEEPEST_PS).to_string(),
            "no-apst,no-deepest-ps"
        );
    }
}
