//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a seed as hex or decimal
fn parse_seed(s: &str) -> Result<u64, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u64>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "mtdabi")]
#[command(author, version, about = "MTD ioctl conformance runner", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Fixture file (RON format); defaults to the built-in nandsim recording
    #[arg(short, long, global = true)]
    pub fixture: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Module management options shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct ModprobeArgs {
    /// modprobe executable used to load and unload the device module
    #[arg(long, default_value = "modprobe")]
    pub modprobe: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the conformance suite (needs root)
    Run {
        /// Only run these scenarios (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        scenario: Vec<String>,

        /// Seed for random payloads, to replay a failing run
        #[arg(long, value_parser = parse_seed)]
        seed: Option<u64>,

        #[command(flatten)]
        modprobe: ModprobeArgs,
    },

    /// List scenarios
    List,

    /// Check that this host matches the fixture
    CheckEnv,

    /// Show what an MTD device reports and compare it with the fixture
    Info {
        /// Device node (defaults to the fixture's device)
        #[arg(short, long)]
        device: Option<PathBuf>,
    },

    /// Load the device module and verify the device enumerated as expected
    Provision {
        #[command(flatten)]
        modprobe: ModprobeArgs,
    },

    /// Unload the device module
    Teardown {
        #[command(flatten)]
        modprobe: ModprobeArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed("42"), Ok(42));
        assert_eq!(parse_seed("0x5eed"), Ok(0x5eed));
        assert!(parse_seed("seed").is_err());
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "mtdabi",
            "-vv",
            "run",
            "--scenario",
            "otp,lock",
            "--seed",
            "0x10",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                scenario,
                seed,
                modprobe,
            } => {
                assert_eq!(scenario, vec!["otp", "lock"]);
                assert_eq!(seed, Some(16));
                assert_eq!(modprobe.modprobe, PathBuf::from("modprobe"));
            }
            _ => panic!("expected run"),
        }
    }
}
