//! Device session
//!
//! One open handle on the device under test, owned by a single scenario.

use std::fs;

use log::{debug, trace};
use mtdabi_ioctl::{MtdConfig, MtdDevice, MtdError, MtdInfoUser};

use crate::fixture::Fixture;

/// Open handle on the device node plus the geometry read when it was opened
#[derive(Debug)]
pub struct DeviceSession {
    device: MtdDevice,
    geometry: MtdInfoUser,
}

impl DeviceSession {
    /// Open the fixture's device node `O_RDWR | O_SYNC` and read its geometry
    pub fn open(fixture: &Fixture) -> Result<Self, MtdError> {
        let device = MtdDevice::open(&MtdConfig::new(&fixture.device).with_sync(true))?;
        let geometry = device.info()?;
        debug!(
            "Session on {}: {:#x} bytes, {:#x} byte eraseblocks",
            device.path().display(),
            geometry.size,
            geometry.erasesize
        );
        Ok(Self { device, geometry })
    }

    /// The open device
    pub fn device(&self) -> &MtdDevice {
        &self.device
    }

    /// Geometry as reported when the session was opened
    pub fn geometry(&self) -> &MtdInfoUser {
        &self.geometry
    }

    /// Read `len` bytes at `offset` through this session's handle
    pub fn read_region(&self, offset: u64, len: usize) -> Result<Vec<u8>, MtdError> {
        let mut buf = vec![0u8; len];
        self.device.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Contents of the whole device, read through a separate open of the node
    pub fn snapshot(&self) -> Result<Vec<u8>, MtdError> {
        let path = self.device.path();
        let data = fs::read(path).map_err(|e| MtdError::Read {
            offset: 0,
            len: self.geometry.size as usize,
            source: e,
        })?;
        trace!("Read {} bytes from {}", data.len(), path.display());
        Ok(data)
    }

    /// Release the handle
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        debug!("Closing {}", self.device.path().display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device() {
        let mut fixture = Fixture::nandsim();
        fixture.device = "/nonexistent/mtd0".into();
        let err = DeviceSession::open(&fixture).unwrap_err();
        assert!(matches!(err, MtdError::Open { .. }));
    }

    #[test]
    fn test_open_requires_mtd_node() {
        // A regular file opens but refuses MEMGETINFO, so no session comes up
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut fixture = Fixture::nandsim();
        fixture.device = file.path().to_path_buf();
        let err = DeviceSession::open(&fixture).unwrap_err();
        assert_eq!(err.errno(), Some(mtdabi_ioctl::Errno::ENOTTY));
    }
}
