//! Device provisioner
//!
//! Brings the simulated device up through a kernel module and confirms it
//! enumerated with the recorded geometry before anything touches it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

use crate::error::ProvisionError;
use crate::fixture::{Fixture, ModuleSpec};

/// Loads and unloads kernel modules
pub trait ModuleControl {
    /// Load `module` with its parameters
    fn load(&mut self, module: &ModuleSpec) -> Result<(), ProvisionError>;

    /// Unload `module`
    fn unload(&mut self, module: &ModuleSpec) -> Result<(), ProvisionError>;
}

/// `ModuleControl` backed by the `modprobe` command
#[derive(Debug, Clone)]
pub struct Modprobe {
    program: PathBuf,
}

impl Default for Modprobe {
    fn default() -> Self {
        Self::new("modprobe")
    }
}

impl Modprobe {
    /// Use the given modprobe executable
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[String]) -> Result<(), ProvisionError> {
        let command = format!("{} {}", self.program.display(), args.join(" "));
        debug!("Running '{}'", command);

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| ProvisionError::Spawn {
                command: command.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(ProvisionError::CommandFailed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl ModuleControl for Modprobe {
    fn load(&mut self, module: &ModuleSpec) -> Result<(), ProvisionError> {
        let mut args = vec![module.name.clone()];
        args.extend(module.args());
        self.run(&args)
    }

    fn unload(&mut self, module: &ModuleSpec) -> Result<(), ProvisionError> {
        self.run(&["-r".to_string(), module.name.clone()])
    }
}

/// Sets up and tears down the simulated device described by a fixture
pub struct Provisioner {
    control: Box<dyn ModuleControl>,
    module: ModuleSpec,
    proc_mtd_path: PathBuf,
    proc_mtd: String,
    loaded: bool,
}

impl Provisioner {
    /// Provisioner for `fixture` using `control` to manage the module
    pub fn new(fixture: &Fixture, control: Box<dyn ModuleControl>) -> Self {
        Self {
            control,
            module: fixture.module.clone(),
            proc_mtd_path: fixture.proc_mtd_path.clone(),
            proc_mtd: fixture.proc_mtd.clone(),
            loaded: false,
        }
    }

    /// Whether `setup` has loaded the module and `teardown` has not yet run
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Load the module and confirm the device enumerated as recorded
    pub fn setup(&mut self) -> Result<(), ProvisionError> {
        info!(
            "Loading {} {}",
            self.module.name,
            self.module.args().join(" ")
        );
        self.control.load(&self.module)?;
        self.loaded = true;

        verify_enumeration(&self.proc_mtd_path, &self.proc_mtd)?;
        debug!("{} matches fixture", self.proc_mtd_path.display());
        Ok(())
    }

    /// Unload the module
    pub fn teardown(&mut self) -> Result<(), ProvisionError> {
        info!("Unloading {}", self.module.name);
        self.control.unload(&self.module)?;
        self.loaded = false;
        Ok(())
    }

    /// Tear the device down and bring it back up with fresh state
    pub fn reprovision(&mut self) -> Result<(), ProvisionError> {
        warn!("Reprovisioning {}", self.module.name);
        self.teardown()?;
        self.setup()
    }
}

/// Compare the enumeration file against the expected text, byte for byte
pub fn verify_enumeration(path: &Path, want: &str) -> Result<(), ProvisionError> {
    let got = fs::read_to_string(path).map_err(|e| ProvisionError::Enumeration {
        path: path.to_path_buf(),
        source: e,
    })?;
    if got != want {
        return Err(ProvisionError::UnexpectedEnumeration {
            path: path.to_path_buf(),
            want: want.to_string(),
            got,
        });
    }
    Ok(())
}
