//! NVMe Identify Controller data.
//!
//! Only the identity strings, the APST capability bit and the power state
//! descriptor table are interpreted. Everything is little-endian.

use std::fmt;

use crate::{PowerError, Result};

/// Size of the Identify Controller data structure.
pub const IDENTIFY_SIZE: usize = 4096;
/// Maximum power state descriptors (NPSS is at most 31).
pub const MAX_POWER_STATES: usize = 32;

const VID: usize = 0;
const SSVID: usize = 2;
const SN: usize = 4;
const MN: usize = 24;
const FR: usize = 64;
const NPSS: usize = 263;
const APSTA: usize = 265;
const PSD: usize = 2048;
const PSD_SIZE: usize = 32;
/// End of the descriptor table; shorter buffers are rejected.
pub const PSD_TABLE_END: usize = PSD + MAX_POWER_STATES * PSD_SIZE;

const FLAG_MXPS: u8 = 1 << 0;
const FLAG_NOPS: u8 = 1 << 1;

/// Scale of the max power field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PowerScale {
    /// 0.01 W units.
    #[default]
    CentiWatts,
    /// 0.0001 W units.
    DeciMilliWatts,
}

/// One 32-byte power state descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PowerStateDescriptor {
    /// Maximum power in `scale` units.
    pub max_power: u16,
    pub scale: PowerScale,
    /// Non-operational: the device processes no I/O in this state.
    pub non_operational: bool,
    pub entry_latency_us: u32,
    pub exit_latency_us: u32,
}

impl PowerStateDescriptor {
    pub const fn operational(max_power: u16, entry_latency_us: u32, exit_latency_us: u32) -> Self {
        Self {
            max_power,
            scale: PowerScale::CentiWatts,
            non_operational: false,
            entry_latency_us,
            exit_latency_us,
        }
    }

    pub const fn non_operational(max_power: u16, entry_latency_us: u32, exit_latency_us: u32) -> Self {
        Self {
            max_power,
            scale: PowerScale::CentiWatts,
            non_operational: true,
            entry_latency_us,
            exit_latency_us,
        }
    }

    pub fn max_power_watts(&self) -> f64 {
        let unit = match self.scale {
            PowerScale::CentiWatts => 0.01,
            PowerScale::DeciMilliWatts => 0.0001,
        };
        f64::from(self.max_power) * unit
    }

    fn parse(raw: &[u8]) -> Self {
        let flags = raw[3];
        Self {
            max_power: le_u16(raw, 0),
            scale: if flags & FLAG_MXPS == 0 {
                PowerScale::CentiWatts
            } else {
                PowerScale::DeciMilliWatts
            },
            non_operational: flags & FLAG_NOPS != 0,
            entry_latency_us: le_u32(raw, 4),
            exit_latency_us: le_u32(raw, 8),
        }
    }

    fn encode(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.max_power.to_le_bytes());
        let mut flags = 0;
        if self.scale == PowerScale::DeciMilliWatts {
            flags |= FLAG_MXPS;
        }
        if self.non_operational {
            flags |= FLAG_NOPS;
        }
        out[3] = flags;
        out[4..8].copy_from_slice(&self.entry_latency_us.to_le_bytes());
        out[8..12].copy_from_slice(&self.exit_latency_us.to_le_bytes());
    }
}

impl fmt::Display for PowerStateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>7.4}W {} enlat={}us exlat={}us",
            self.max_power_watts(),
            if self.non_operational { "non-op" } else { "op    " },
            self.entry_latency_us,
            self.exit_latency_us
        )
    }
}

/// Parsed Identify Controller fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentifyController {
    pub vid: u16,
    pub ssvid: u16,
    /// Serial number, space padded.
    pub sn: [u8; 20],
    /// Model number, space padded.
    pub mn: [u8; 40],
    /// Firmware revision, space padded.
    pub fr: [u8; 8],
    /// Index of the deepest power state.
    pub npss: u8,
    /// Autonomous power state transitions supported.
    pub apsta: bool,
    pub psd: [PowerStateDescriptor; MAX_POWER_STATES],
}

impl Default for IdentifyController {
    fn default() -> Self {
        Self {
            vid: 0,
            ssvid: 0,
            sn: [b' '; 20],
            mn: [b' '; 40],
            fr: [b' '; 8],
            npss: 0,
            apsta: false,
            psd: [PowerStateDescriptor::default(); MAX_POWER_STATES],
        }
    }
}

impl IdentifyController {
    /// Parse Identify Controller data.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PSD_TABLE_END {
            return Err(PowerError::TooShort {
                len: data.len(),
                need: PSD_TABLE_END,
            });
        }

        let npss = data[NPSS];
        if usize::from(npss) >= MAX_POWER_STATES {
            return Err(PowerError::InvalidCapability(format!(
                "NPSS {npss} exceeds {}",
                MAX_POWER_STATES - 1
            )));
        }

        let mut psd = [PowerStateDescriptor::default(); MAX_POWER_STATES];
        for (i, desc) in psd.iter_mut().enumerate() {
            let start = PSD + i * PSD_SIZE;
            *desc = PowerStateDescriptor::parse(&data[start..start + PSD_SIZE]);
        }

        Ok(Self {
            vid: le_u16(data, VID),
            ssvid: le_u16(data, SSVID),
            sn: fixed(&data[SN..SN + 20]),
            mn: fixed(&data[MN..MN + 40]),
            fr: fixed(&data[FR..FR + 8]),
            npss,
            apsta: data[APSTA] & 1 != 0,
            psd,
        })
    }

    /// Serialize back to a full 4096-byte identify buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = vec![0u8; IDENTIFY_SIZE];
        data[VID..VID + 2].copy_from_slice(&self.vid.to_le_bytes());
        data[SSVID..SSVID + 2].copy_from_slice(&self.ssvid.to_le_bytes());
        data[SN..SN + 20].copy_from_slice(&self.sn);
        data[MN..MN + 40].copy_from_slice(&self.mn);
        data[FR..FR + 8].copy_from_slice(&self.fr);
        data[NPSS] = self.npss;
        data[APSTA] = u8::from(self.apsta);
        for (i, desc) in self.psd.iter().enumerate() {
            let start = PSD + i * PSD_SIZE;
            desc.encode(&mut data[start..start + PSD_SIZE]);
        }
        data
    }

    /// Set the model number, space padded.
    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.mn = padded(model);
        self
    }

    /// Set the firmware revision, space padded.
    #[must_use]
    pub fn with_firmware(mut self, firmware: &str) -> Self {
        self.fr = padded(firmware);
        self
    }

    #[must_use]
    pub fn with_serial(mut self, serial: &str) -> Self {
        self.sn = padded(serial);
        self
    }

    #[must_use]
    pub const fn with_vendor(mut self, vid: u16) -> Self {
        self.vid = vid;
        self
    }

    #[must_use]
    pub const fn with_apst(mut self, apsta: bool) -> Self {
        self.apsta = apsta;
        self
    }

    /// Set the descriptor table. NPSS becomes `states.len() - 1`.
    ///
    /// Extra descriptors beyond 32 are dropped.
    #[must_use]
    pub fn with_power_states(mut self, states: &[PowerStateDescriptor]) -> Self {
        let count = states.len().clamp(1, MAX_POWER_STATES);
        self.psd = [PowerStateDescriptor::default(); MAX_POWER_STATES];
        for (slot, desc) in self.psd.iter_mut().zip(states) {
            *slot = *desc;
        }
        self.npss = (count - 1) as u8;
        self
    }

    pub fn model(&self) -> String {
        trimmed(&self.mn)
    }

    pub fn firmware(&self) -> String {
        trimmed(&self.fr)
    }

    pub fn serial(&self) -> String {
        trimmed(&self.sn)
    }

    /// Descriptors `0..=npss`.
    pub fn power_states(&self) -> &[PowerStateDescriptor] {
        &self.psd[..=usize::from(self.npss).min(MAX_POWER_STATES - 1)]
    }
}

fn le_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn fixed<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&src[..N]);
    out
}

fn padded<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [b' '; N];
    let len = s.len().min(N);
    out[..len].copy_from_slice(&s.as_bytes()[..len]);
    out
}

fn trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches([' ', '\0'])
        .to_string()
}
