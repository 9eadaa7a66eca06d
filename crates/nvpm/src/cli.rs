//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nvpm::{Field, HostRelease};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "nvpm")]
#[command(about = "NVMe power management planner and driver layout probe")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub const fn log_directive(&self) -> &'static str {
        if self.verbose {
            "nvpm=debug"
        } else if self.silent {
            "nvpm=error"
        } else {
            "nvpm=info"
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan APST and host power levels from an Identify Controller dump
    Plan {
        /// Identify Controller data (4096 bytes)
        #[arg(long, value_name = "FILE")]
        identify: PathBuf,

        /// PCI vendor ID (hex)
        #[arg(long, value_parser = parse_hex_u16)]
        vendor_id: Option<u16>,

        /// PCI device ID (hex)
        #[arg(long, value_parser = parse_hex_u16)]
        device_id: Option<u16>,

        /// APST exit latency ceiling in microseconds (0 disables APST)
        #[arg(long, value_name = "US", default_value_t = nvpm_power::DEFAULT_PS_MAX_LATENCY_US)]
        max_latency: u64,

        /// Do not plan APST
        #[arg(long)]
        no_apst: bool,

        /// Platform vendor string
        #[arg(long)]
        oem_vendor: Option<String>,

        /// Platform product string
        #[arg(long)]
        oem_product: Option<String>,

        /// Platform board string
        #[arg(long)]
        oem_board: Option<String>,
    },

    /// Decode x86-64 instructions from a raw code dump
    Decode {
        /// Raw code bytes
        #[arg(long, value_name = "FILE")]
        code: PathBuf,

        /// Load address of the first byte (hex)
        #[arg(long, value_parser = parse_hex_u64, default_value = "0")]
        base: u64,

        /// Byte offset to start decoding at (hex)
        #[arg(long, value_parser = parse_hex_u64, default_value = "0")]
        offset: u64,

        /// Maximum number of instructions
        #[arg(short = 'n', long, default_value = "32")]
        count: usize,
    },

    /// Run one field signature against a raw code dump
    Probe {
        /// Raw code bytes of the function
        #[arg(long, value_name = "FILE")]
        code: PathBuf,

        /// Field name (e.g. request.result)
        #[arg(long)]
        field: Field,

        /// Host release: legacy, modern, sonoma or a version like 14.0
        #[arg(long, default_value = "modern")]
        release: HostRelease,

        /// Load address of the first byte (hex)
        #[arg(long, value_parser = parse_hex_u64, default_value = "0")]
        base: u64,

        /// Function entry address (hex, defaults to base)
        #[arg(long, value_parser = parse_hex_u64)]
        entry: Option<u64>,
    },
}

fn strip_hex(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    u16::from_str_radix(strip_hex(s), 16).map_err(|e| format!("invalid hex '{s}': {e}"))
}

fn parse_hex_u64(s: &str) -> Result<u64, String> {
    u64::from_str_radix(strip_hex(s), 16).map_err(|e| format!("invalid hex '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u16("0x144d"), Ok(0x144d));
        assert_eq!(parse_hex_u16("a802"), Ok(0xa802));
        assert!(parse_hex_u16("0x10000").is_err());
        assert_eq!(parse_hex_u64("0XFFFF0000"), Ok(0xFFFF_0000));
    }

    #[test]
    fn test_cli_probe() {
        let cli = Cli::parse_from([
            "nvpm",
            "probe",
            "--code",
            "f.bin",
            "--field",
            "request.result",
            "--release",
            "14.0",
            "--entry",
            "0x40",
        ]);
        let Commands::Probe {
            field,
            release,
            entry,
            base,
            ..
        } = cli.command
        else {
            panic!("expected probe");
        };
        assert_eq!(field, Field::RequestResult);
        assert_eq!(release, HostRelease::Sonoma);
        assert_eq!(entry, Some(0x40));
        assert_eq!(base, 0);
    }

    #[test]
    fn test_cli_log_directive() {
        let cli = Cli::parse_from(["nvpm", "-v", "plan", "--identify", "id.bin"]);
        assert_eq!(cli.log_directive(), "nvpm=debug");
        let cli = Cli::parse_from(["nvpm", "plan", "--identify", "id.bin", "-s"]);
        assert_eq!(cli.log_directive(), "nvpm=error");
        assert!(Cli::try_parse_from(["nvpm", "-v", "-s", "plan", "--identify", "x"]).is_err());
    }
}
