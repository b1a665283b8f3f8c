//! Environment guard
//!
//! The simulated device only behaves as recorded on the exact kernel the
//! fixture came from, so the run refuses to start anywhere else.

use std::path::Path;

use log::{debug, info};

use crate::error::EnvironmentError;
use crate::fixture::Fixture;

/// Check the running kernel and working directory against `fixture`
pub fn check(fixture: &Fixture) -> Result<(), EnvironmentError> {
    let release = kernel_release()?;
    check_kernel_release(&fixture.kernel_release, &release)?;

    if let Some(want) = &fixture.working_dir {
        let cwd = std::env::current_dir().map_err(EnvironmentError::WorkingDir)?;
        check_working_dir(want, &cwd)?;
    } else {
        debug!("Fixture does not pin a working directory");
    }

    info!("Environment matches fixture (kernel {})", release);
    Ok(())
}

/// Release string of the running kernel, as `uname -r` prints it
pub fn kernel_release() -> Result<String, EnvironmentError> {
    let uts = nix::sys::utsname::uname().map_err(EnvironmentError::Uname)?;
    Ok(uts.release().to_string_lossy().trim().to_string())
}

/// Compare a kernel release against the pinned one
pub fn check_kernel_release(want: &str, got: &str) -> Result<(), EnvironmentError> {
    if want != got.trim() {
        return Err(EnvironmentError::KernelMismatch {
            want: want.to_string(),
            got: got.trim().to_string(),
        });
    }
    Ok(())
}

/// Compare a working directory against the pinned one
pub fn check_working_dir(want: &Path, got: &Path) -> Result<(), EnvironmentError> {
    if want != got {
        return Err(EnvironmentError::WorkingDirMismatch {
            want: want.to_path_buf(),
            got: got.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_kernel_release_exact_match() {
        assert!(check_kernel_release("5.12.8-arch1-1", "5.12.8-arch1-1\n").is_ok());

        let err = check_kernel_release("5.12.8-arch1-1", "5.12.9-arch1-1").unwrap_err();
        match err {
            EnvironmentError::KernelMismatch { want, got } => {
                assert_eq!(want, "5.12.8-arch1-1");
                assert_eq!(got, "5.12.9-arch1-1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_kernel_release_is_not_a_prefix_match() {
        assert!(check_kernel_release("5.12", "5.12.8-arch1-1").is_err());
    }

    #[test]
    fn test_working_dir() {
        assert!(check_working_dir(Path::new("/vagrant"), Path::new("/vagrant")).is_ok());
        let err = check_working_dir(Path::new("/vagrant"), Path::new("/home/user")).unwrap_err();
        assert!(err.to_string().contains("Vagrant VM"));
    }

    #[test]
    fn test_running_kernel_is_reported() {
        let release = kernel_release().unwrap();
        assert!(!release.is_empty());
        assert_eq!(release, release.trim());
    }

    #[test]
    fn test_check_rejects_foreign_kernel() {
        let mut fixture = Fixture::nandsim();
        fixture.kernel_release = "0.0.0-not-this-kernel".to_string();
        fixture.working_dir = Some(PathBuf::from("/"));
        assert!(matches!(
            check(&fixture),
            Err(EnvironmentError::KernelMismatch { .. })
        ));
    }
}
