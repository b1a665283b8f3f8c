//! Suite runner
//!
//! Sequences a run: environment check, device setup, the selected scenarios
//! one after the other, then teardown. Environment and provisioning problems
//! abort the run; a failing scenario only fails itself.

use core::fmt;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::env;
use crate::error::{HarnessError, Result, ScenarioError};
use crate::fixture::Fixture;
use crate::provision::{ModuleControl, Provisioner};
use crate::scenarios::{Scenario, ScenarioContext, CATALOG};

/// What to run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Seed for random payloads; drawn fresh when unset
    pub seed: Option<u64>,
    /// Scenario names to run, in catalog order; empty runs all of them
    pub only: Vec<String>,
}

/// Progress events emitted while a run is under way
#[derive(Debug)]
pub enum Progress<'r> {
    /// The device is being brought up
    Provisioning,
    /// A scenario is about to start
    Started {
        name: &'static str,
        index: usize,
        total: usize,
    },
    /// A scenario finished
    Finished(&'r ScenarioReport),
    /// The device is being torn down
    TearingDown,
}

/// Result of one scenario
#[derive(Debug)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: &'static str,
    /// Wall time spent in the scenario
    pub elapsed: Duration,
    /// `None` when the scenario passed
    pub error: Option<ScenarioError>,
}

impl ScenarioReport {
    /// Whether the scenario passed
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Results of a whole run
#[derive(Debug)]
pub struct Report {
    /// Seed the random payloads were derived from
    pub seed: u64,
    /// Per-scenario results, in execution order
    pub scenarios: Vec<ScenarioReport>,
}

impl Report {
    /// Number of passed scenarios
    pub fn passed(&self) -> usize {
        self.scenarios.iter().filter(|s| s.passed()).count()
    }

    /// Number of failed scenarios
    pub fn failed(&self) -> usize {
        self.scenarios.len() - self.passed()
    }

    /// Whether every scenario passed
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for scenario in &self.scenarios {
            match &scenario.error {
                None => writeln!(f, "  ok    {} ({:.2?})", scenario.name, scenario.elapsed)?,
                Some(e) => writeln!(f, "  FAIL  {}: {}", scenario.name, e)?,
            }
        }
        write!(
            f,
            "{} scenarios, {} passed, {} failed (seed {})",
            self.scenarios.len(),
            self.passed(),
            self.failed(),
            self.seed
        )
    }
}

/// Runs scenarios against the device described by a fixture
pub struct Runner<'f> {
    fixture: &'f Fixture,
    provisioner: Provisioner,
    options: RunOptions,
    catalog: &'static [Scenario],
}

impl<'f> Runner<'f> {
    /// Runner for `fixture`, managing the device module through `control`
    pub fn new(fixture: &'f Fixture, control: Box<dyn ModuleControl>, options: RunOptions) -> Self {
        Self {
            fixture,
            provisioner: Provisioner::new(fixture, control),
            options,
            catalog: CATALOG,
        }
    }

    /// Run `catalog` instead of the built-in scenarios
    pub fn with_scenarios(mut self, catalog: &'static [Scenario]) -> Self {
        self.catalog = catalog;
        self
    }

    /// Run without progress reporting
    pub fn run(self) -> Result<Report> {
        self.run_with(|_| {})
    }

    /// Run, reporting progress to `observer`
    pub fn run_with<F>(mut self, mut observer: F) -> Result<Report>
    where
        F: FnMut(Progress<'_>),
    {
        let selected = select(self.catalog, &self.options.only)?;
        env::check(self.fixture)?;

        let seed = self.options.seed.unwrap_or_else(rand::random);
        info!("Running {} scenarios with seed {}", selected.len(), seed);

        observer(Progress::Provisioning);
        if let Err(e) = self.provisioner.setup() {
            self.abandon();
            return Err(e.into());
        }

        let total = selected.len();
        let mut scenarios = Vec::with_capacity(total);
        for (index, scenario) in selected.into_iter().enumerate() {
            observer(Progress::Started {
                name: scenario.name,
                index,
                total,
            });

            let report = match self.run_one(scenario, seed) {
                // The device may be gone; nothing after this can be trusted
                ScenarioReport {
                    error: Some(ScenarioError::Provision(e)),
                    ..
                } => {
                    error!("{}: device could not be brought back", scenario.name);
                    self.abandon();
                    return Err(HarnessError::Provision(e));
                }
                report => report,
            };

            observer(Progress::Finished(&report));
            scenarios.push(report);
        }

        observer(Progress::TearingDown);
        let report = Report { seed, scenarios };
        if let Err(e) = self.provisioner.teardown() {
            warn!(
                "Teardown failed after {} passed, {} failed",
                report.passed(),
                report.failed()
            );
            return Err(e.into());
        }
        Ok(report)
    }

    fn run_one(&mut self, scenario: &'static Scenario, seed: u64) -> ScenarioReport {
        info!("Scenario {}: {}", scenario.name, scenario.summary);
        let mut ctx = ScenarioContext::new(self.fixture, &mut self.provisioner, seed);

        let start = Instant::now();
        let result = (scenario.run)(&mut ctx);
        let elapsed = start.elapsed();

        match &result {
            Ok(()) => info!("Scenario {} passed in {:.2?}", scenario.name, elapsed),
            Err(e) => error!("Scenario {} failed: {}", scenario.name, e),
        }
        ScenarioReport {
            name: scenario.name,
            elapsed,
            error: result.err(),
        }
    }

    /// Best effort unload after a fatal error
    fn abandon(&mut self) {
        if self.provisioner.is_loaded() {
            if let Err(e) = self.provisioner.teardown() {
                warn!("Teardown after failure also failed: {}", e);
            }
        }
    }
}

/// Resolve scenario names against the catalog, keeping catalog order
fn select(catalog: &'static [Scenario], only: &[String]) -> Result<Vec<&'static Scenario>> {
    if let Some(unknown) = only
        .iter()
        .find(|name| !catalog.iter().any(|scenario| scenario.name == name.as_str()))
    {
        return Err(HarnessError::UnknownScenario(unknown.clone()));
    }
    Ok(catalog
        .iter()
        .filter(|scenario| only.is_empty() || only.iter().any(|name| name == scenario.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EnvironmentError, OracleError, ProvisionError};
    use crate::provision::tests::{fixture_at, FakeControl};
    use std::path::Path;

    fn pass(_: &mut ScenarioContext<'_>) -> core::result::Result<(), ScenarioError> {
        Ok(())
    }

    fn fail(_: &mut ScenarioContext<'_>) -> core::result::Result<(), ScenarioError> {
        Err(OracleError::LengthMismatch {
            what: "contents".to_string(),
            want: 1,
            got: 0,
        }
        .into())
    }

    // Cycles the module with a control that refuses the second load
    fn lose_device(ctx: &mut ScenarioContext<'_>) -> core::result::Result<(), ScenarioError> {
        ctx.provisioner.reprovision()?;
        Ok(())
    }

    fn enumeration_lost(_: &mut ScenarioContext<'_>) -> core::result::Result<(), ScenarioError> {
        Err(ProvisionError::Enumeration {
            path: "/proc/mtd".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .into())
    }

    static PASSING: &[Scenario] = &[
        Scenario {
            name: "first",
            summary: "passes",
            run: pass,
        },
        Scenario {
            name: "second",
            summary: "passes",
            run: pass,
        },
    ];

    static FAIL_THEN_PASS: &[Scenario] = &[
        Scenario {
            name: "broken",
            summary: "fails",
            run: fail,
        },
        Scenario {
            name: "after",
            summary: "passes",
            run: pass,
        },
    ];

    static RELOAD_FAILS: &[Scenario] = &[
        Scenario {
            name: "reload",
            summary: "loses the device",
            run: lose_device,
        },
        Scenario {
            name: "never",
            summary: "must not run",
            run: pass,
        },
    ];

    static DEVICE_GONE: &[Scenario] = &[
        Scenario {
            name: "gone",
            summary: "enumeration vanished",
            run: enumeration_lost,
        },
        Scenario {
            name: "never",
            summary: "must not run",
            run: pass,
        },
    ];

    /// Fixture the current host satisfies, with enumeration in `dir`
    fn host_fixture(dir: &Path) -> Fixture {
        let mut fixture = fixture_at(dir);
        fixture.kernel_release = env::kernel_release().unwrap();
        fixture.working_dir = None;
        fixture
    }

    fn started(events: &[String]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| e.strip_prefix("started "))
            .collect()
    }

    fn run_recording(
        fixture: &Fixture,
        control: FakeControl,
        catalog: &'static [Scenario],
    ) -> (Result<Report>, Vec<String>) {
        let mut events = Vec::new();
        let options = RunOptions {
            seed: Some(3),
            only: Vec::new(),
        };
        let result = Runner::new(fixture, Box::new(control), options)
            .with_scenarios(catalog)
            .run_with(|progress| match progress {
                Progress::Provisioning => events.push("provisioning".to_string()),
                Progress::Started { name, .. } => events.push(format!("started {}", name)),
                Progress::Finished(report) => events.push(format!("finished {}", report.name)),
                Progress::TearingDown => events.push("tearing down".to_string()),
            });
        (result, events)
    }

    #[test]
    fn test_passing_suite_unloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = host_fixture(dir.path());
        let control = FakeControl::writing(&fixture);
        let calls = control.calls.clone();

        let (result, events) = run_recording(&fixture, control, PASSING);
        let report = result.unwrap();
        assert!(report.is_success());
        assert_eq!(report.seed, 3);
        assert_eq!(started(&events), vec!["first", "second"]);
        assert_eq!(events.last().map(String::as_str), Some("tearing down"));

        let calls = calls.borrow();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("load nandsim"));
        assert_eq!(calls[1], "unload nandsim");
    }

    #[test]
    fn test_failing_scenario_does_not_stop_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = host_fixture(dir.path());
        let control = FakeControl::writing(&fixture);

        let (result, events) = run_recording(&fixture, control, FAIL_THEN_PASS);
        let report = result.unwrap();
        assert_eq!(started(&events), vec!["broken", "after"]);
        assert_eq!(report.failed(), 1);
        assert!(!report.scenarios[0].passed());
        assert!(report.scenarios[1].passed());
    }

    #[test]
    fn test_failed_reload_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = host_fixture(dir.path());
        let control = FakeControl {
            fail_load_after: Some(1),
            ..FakeControl::writing(&fixture)
        };
        let calls = control.calls.clone();

        let (result, events) = run_recording(&fixture, control, RELOAD_FAILS);
        assert!(matches!(result, Err(HarnessError::Provision(ProvisionError::Spawn { .. }))));
        assert_eq!(started(&events), vec!["reload"]);
        assert!(!events.iter().any(|e| e == "tearing down"));

        // Module already out after the failed reload, so nothing more to unload
        let calls = calls.borrow();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1], "unload nandsim");
        assert!(calls[2].starts_with("load nandsim"));
    }

    #[test]
    fn test_lost_device_is_unloaded_before_abort() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = host_fixture(dir.path());
        let control = FakeControl::writing(&fixture);
        let calls = control.calls.clone();

        let (result, events) = run_recording(&fixture, control, DEVICE_GONE);
        assert!(matches!(
            result,
            Err(HarnessError::Provision(ProvisionError::Enumeration { .. }))
        ));
        assert_eq!(started(&events), vec!["gone"]);
        assert_eq!(
            calls.borrow().last().map(String::as_str),
            Some("unload nandsim")
        );
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_unknown_name_checked_against_injected_catalog() {
        let only = vec!["otp".to_string()];
        assert!(matches!(
            select(PASSING, &only),
            Err(HarnessError::UnknownScenario(name)) if name == "otp"
        ));
    }

    #[test]
    fn test_select_all() {
        let all = select(CATALOG, &[]).unwrap();
        assert_eq!(all.len(), CATALOG.len());
    }

    #[test]
    fn test_select_keeps_catalog_order() {
        let only = vec!["otp".to_string(), "mem_get_info".to_string()];
        let names: Vec<_> = select(CATALOG, &only).unwrap().iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["mem_get_info", "otp"]);
    }

    #[test]
    fn test_unknown_scenario_rejected_before_anything_runs() {
        let fixture = Fixture::nandsim();
        let control = FakeControl::default();
        let calls = control.calls.clone();
        let options = RunOptions {
            seed: Some(1),
            only: vec!["mem_get_info".to_string(), "no_such_thing".to_string()],
        };

        let err = Runner::new(&fixture, Box::new(control), options)
            .run()
            .unwrap_err();
        assert!(matches!(err, HarnessError::UnknownScenario(name) if name == "no_such_thing"));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_foreign_kernel_aborts_before_provisioning() {
        let mut fixture = Fixture::nandsim();
        fixture.kernel_release = "0.0.0-not-this-kernel".to_string();
        let control = FakeControl::default();
        let calls = control.calls.clone();

        let mut events = 0;
        let err = Runner::new(&fixture, Box::new(control), RunOptions::default())
            .run_with(|_| events += 1)
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Environment(EnvironmentError::KernelMismatch { .. })
        ));
        assert!(calls.borrow().is_empty());
        assert_eq!(events, 0);
    }

    #[test]
    fn test_report_summary() {
        let report = Report {
            seed: 7,
            scenarios: vec![
                ScenarioReport {
                    name: "mem_get_info",
                    elapsed: Duration::from_millis(3),
                    error: None,
                },
                ScenarioReport {
                    name: "lock",
                    elapsed: Duration::from_millis(1),
                    error: Some(ScenarioError::Oracle(OracleError::LengthMismatch {
                        what: "x".to_string(),
                        want: 1,
                        got: 2,
                    })),
                },
            ],
        };
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());

        let text = report.to_string();
        assert!(text.contains("ok    mem_get_info"));
        assert!(text.contains("FAIL  lock"));
        assert!(text.ends_with("2 scenarios, 1 passed, 1 failed (seed 7)"));
    }

    #[test]
    fn test_empty_report_is_success() {
        let report = Report {
            seed: 0,
            scenarios: Vec::new(),
        };
        assert!(report.is_success());
    }
}
