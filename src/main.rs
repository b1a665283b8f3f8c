//! mtdabi - MTD ioctl conformance runner
//!
//! Runs the conformance suite from `mtdabi-conformance` against a simulated
//! NAND device, and offers the pieces of a run (environment check, device
//! provisioning, descriptor dump) as separate commands for debugging a host.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use log::LevelFilter;
use mtdabi_conformance::{Fixture, Modprobe, NANDSIM};

use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG directives still win over -v
    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose))
        .parse_default_env()
        .init();

    let fixture = match load_fixture(cli.fixture.as_deref()) {
        Ok(fixture) => fixture,
        Err(e) => {
            eprintln!("Failed to load fixture: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run {
            scenario,
            seed,
            modprobe,
        } => commands::run_suite(&fixture, Modprobe::new(modprobe.modprobe), scenario, seed),
        Commands::List => {
            commands::list_scenarios();
            Ok(())
        }
        Commands::CheckEnv => commands::check_env(&fixture),
        Commands::Info { device } => {
            let device = device.unwrap_or_else(|| fixture.device.clone());
            commands::show_info(&device, &fixture)
        }
        Commands::Provision { modprobe } => {
            commands::provision(&fixture, Modprobe::new(modprobe.modprobe))
        }
        Commands::Teardown { modprobe } => {
            commands::teardown(&fixture, Modprobe::new(modprobe.modprobe))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Log level for a `-v` count
fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Load the fixture from a file, or fall back to the built-in recording
fn load_fixture(path: Option<&Path>) -> Result<Fixture, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let fixture = Fixture::load_file(path)?;
            log::info!("Using fixture {}", path.display());
            Ok(fixture)
        }
        None => Ok(NANDSIM.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_follows_verbosity() {
        assert_eq!(log_level(0), LevelFilter::Info);
        assert_eq!(log_level(1), LevelFilter::Debug);
        assert_eq!(log_level(2), LevelFilter::Trace);
        assert_eq!(log_level(5), LevelFilter::Trace);
    }

    #[test]
    fn test_verbose_logger_lets_debug_through() {
        let logger = env_logger::Builder::new()
            .filter_level(log_level(1))
            .build();
        let debug = log::Metadata::builder()
            .level(log::Level::Debug)
            .target("mtdabi_ioctl")
            .build();
        let trace = log::Metadata::builder()
            .level(log::Level::Trace)
            .target("mtdabi_ioctl")
            .build();
        assert!(log::Log::enabled(&logger, &debug));
        assert!(!log::Log::enabled(&logger, &trace));
    }
}
