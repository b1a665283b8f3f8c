//! Run command implementation

use indicatif::{ProgressBar, ProgressStyle};
use mtdabi_conformance::{Fixture, Modprobe, Progress, RunOptions, Runner};
use std::time::Duration;

fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?)
}

/// Run the suite and print the report
pub fn run_suite(
    fixture: &Fixture,
    modprobe: Modprobe,
    only: Vec<String>,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = RunOptions { seed, only };

    let pb = ProgressBar::new_spinner();
    pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = Runner::new(fixture, Box::new(modprobe), options).run_with(|event| match event {
        Progress::Provisioning => pb.set_message(format!("Loading {}...", fixture.module.name)),
        Progress::Started { name, index, total } => {
            pb.set_message(format!("[{}/{}] {}", index + 1, total, name))
        }
        Progress::Finished(report) => {
            if !report.passed() {
                pb.println(format!("FAIL {}", report.name));
            }
        }
        Progress::TearingDown => pb.set_message(format!("Unloading {}...", fixture.module.name)),
    });
    pb.finish_and_clear();

    let report = result?;
    println!("{}", report);

    if !report.is_success() {
        return Err(format!(
            "{} of {} scenarios failed (replay with --seed {})",
            report.failed(),
            report.scenarios.len(),
            report.seed
        )
        .into());
    }
    Ok(())
}
