//! mtdabi-conformance - MTD ioctl conformance suite
//!
//! Drives every request of [`mtdabi_ioctl`] against a simulated NAND device
//! (the `nandsim` kernel module) and compares each result, down to the exact
//! errno, with a pinned [`Fixture`].
//!
//! A run goes through these steps:
//!
//! 1. [`env::check`] refuses to start on any kernel other than the one the
//!    fixture was recorded on
//! 2. [`Provisioner::setup`] loads the module and checks `/proc/mtd`
//! 3. each selected [`Scenario`] opens its own [`DeviceSession`], drives its
//!    requests and checks them with the [`oracle`]
//! 4. [`Provisioner::teardown`] unloads the module
//!
//! [`Runner`] sequences all of this and returns a [`Report`].
//!
//! # Example
//!
//! ```ignore
//! use mtdabi_conformance::{Modprobe, RunOptions, Runner, NANDSIM};
//!
//! let report = Runner::new(&NANDSIM, Box::new(Modprobe::default()), RunOptions::default())
//!     .run()?;
//! println!("{}", report);
//! ```

pub mod env;
pub mod error;
pub mod fixture;
pub mod oracle;
pub mod provision;
pub mod runner;
pub mod scenarios;
pub mod session;

pub use error::{
    EnvironmentError, FixtureError, HarnessError, OracleError, ProvisionError, Result,
    ScenarioError,
};
pub use fixture::{Fixture, ModuleSpec, NANDSIM, PROC_MTD};
pub use oracle::Outcome;
pub use provision::{Modprobe, ModuleControl, Provisioner};
pub use runner::{Progress, Report, RunOptions, Runner, ScenarioReport};
pub use scenarios::{Scenario, ScenarioContext, CATALOG};
pub use session::DeviceSession;
