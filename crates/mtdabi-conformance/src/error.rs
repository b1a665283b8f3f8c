//! Error types for the conformance harness
//!
//! Environment and provisioning errors are fatal for the whole run. Oracle
//! and device errors fail a single scenario.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

use mtdabi_ioctl::MtdError;

use crate::oracle::Outcome;

/// The host is not the environment the fixture was recorded on
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Kernel version: want '{want}' got '{got}'\nPlease use the Vagrant VM to run tests!")]
    KernelMismatch { want: String, got: String },

    #[error("Working directory is not '{}' (got '{}')\nPlease use the Vagrant VM to run tests!", .want.display(), .got.display())]
    WorkingDirMismatch { want: PathBuf, got: PathBuf },

    #[error("Can't query kernel release: {0}")]
    Uname(#[source] nix::errno::Errno),

    #[error("Failed to get working directory: {0}")]
    WorkingDir(#[source] io::Error),
}

/// Loading or unloading the simulated device failed
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Can't run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Can't read from '{}': {source}", .path.display())]
    Enumeration {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Simulated device not set up properly!\n{}: want '{want}'\ngot '{got}'", .path.display())]
    UnexpectedEnumeration {
        path: PathBuf,
        want: String,
        got: String,
    },
}

/// A fixture file could not be loaded
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Can't read fixture '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// An observed result differs from the pinned expectation
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("{what}: want {want}, got {got}")]
    OutcomeMismatch {
        what: String,
        want: Outcome,
        got: Outcome,
    },

    #[error("{what}: want {want}\ngot {got}")]
    ValueMismatch {
        what: String,
        want: String,
        got: String,
    },

    #[error("{what}: byte at {offset:#x} is {found:#04x}, want erased (0xff)")]
    NotErased {
        what: String,
        offset: usize,
        found: u8,
    },

    #[error("{what}: length mismatch, want {want} got {got}")]
    LengthMismatch {
        what: String,
        want: usize,
        got: usize,
    },

    #[error("{what}: first difference at {offset:#x}, want {want:#04x} got {got:#04x}")]
    BytesDiffer {
        what: String,
        offset: usize,
        want: u8,
        got: u8,
    },
}

/// A scenario failed
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Device error: {0}")]
    Device(#[from] MtdError),

    #[error("Reprovisioning failed: {0}")]
    Provision(#[from] ProvisionError),
}

/// The run could not be carried out
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Environment check failed: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Fixture error: {0}")]
    Fixture(#[from] FixtureError),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;
