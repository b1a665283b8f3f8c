//! CLI command implementations
//!
//! `run` drives the whole suite. The other commands expose single steps of a
//! run so a host can be checked or a device inspected without running it.

mod info;
mod list;
mod run;
mod setup;

pub use info::show_info;
pub use list::list_scenarios;
pub use run::run_suite;
pub use setup::{check_env, provision, teardown};
