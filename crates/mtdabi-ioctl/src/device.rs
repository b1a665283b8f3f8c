//! Safe MTD device handle
//!
//! `MtdDevice` owns an open `/dev/mtdN` node and exposes one method per ioctl
//! request, plus positioned read/write through the character device itself.
//! Buffers handed to the kernel by address are borrowed for the duration of
//! the call, which keeps them alive and pinned while the kernel touches them.

use crate::abi::{
    EraseInfoUser, EraseInfoUser64, FileMode, MtdEccStats, MtdInfoUser, MtdOobBuf, MtdOobBuf64,
    MtdWriteReq, NandEcclayoutUser, NandOobinfo, OpsMode, OtpInfo, OtpMode, RegionInfoUser,
};
use crate::error::{MtdError, Result};
use crate::ioctl::{self, KernelLoff, Request};
use log::{debug, info, trace};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

/// Device root
const DEV_ROOT: &str = "/dev";

/// `OTPGETREGIONINFO` copies out up to one page of `otp_info` records
const OTP_INFO_PAGE: usize = 4096;

/// Configuration for opening an MTD character device
#[derive(Debug, Clone)]
pub struct MtdConfig {
    /// Device node path (e.g. "/dev/mtd0")
    pub path: PathBuf,
    /// Open with `O_SYNC`
    pub sync: bool,
}

impl MtdConfig {
    /// Create a configuration for the given device node
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync: false,
        }
    }

    /// Configuration for `/dev/mtd<dev_num>`
    pub fn from_index(dev_num: u32) -> Self {
        Self::new(format!("{}/mtd{}", DEV_ROOT, dev_num))
    }

    /// Open with `O_SYNC`
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// In-band and/or out-of-band data for a `MEMWRITE` request
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteRequest<'a> {
    /// Device offset of the first byte written
    pub start: u64,
    /// In-band data
    pub data: Option<&'a [u8]>,
    /// Out-of-band data
    pub oob: Option<&'a [u8]>,
    /// OOB placement mode
    pub mode: OpsMode,
}

impl<'a> WriteRequest<'a> {
    /// In-band only write at `start`
    pub fn data(start: u64, data: &'a [u8]) -> Self {
        Self {
            start,
            data: Some(data),
            ..Default::default()
        }
    }

    /// Attach out-of-band data
    pub fn with_oob(mut self, oob: &'a [u8]) -> Self {
        self.oob = Some(oob);
        self
    }

    /// Select the OOB placement mode
    pub fn with_mode(mut self, mode: OpsMode) -> Self {
        self.mode = mode;
        self
    }

    fn to_raw(self) -> MtdWriteReq {
        let (usr_data, len) = match self.data {
            Some(data) => (data.as_ptr() as u64, data.len() as u64),
            None => (0, 0),
        };
        let (usr_oob, ooblen) = match self.oob {
            Some(oob) => (oob.as_ptr() as u64, oob.len() as u64),
            None => (0, 0),
        };
        MtdWriteReq {
            start: self.start,
            len,
            ooblen,
            usr_data,
            usr_oob,
            mode: self.mode as u8,
            padding: [0; 7],
        }
    }
}

/// Open MTD character device
///
/// # Example
///
/// ```ignore
/// use mtdabi_ioctl::{MtdConfig, MtdDevice, EraseInfoUser};
///
/// let mtd = MtdDevice::open(&MtdConfig::from_index(0))?;
/// let info = mtd.info()?;
/// mtd.erase(&EraseInfoUser { start: 0, length: info.erasesize })?;
/// ```
#[derive(Debug)]
pub struct MtdDevice {
    /// Device file handle
    file: File,
    /// Path the device was opened from
    path: PathBuf,
}

impl MtdDevice {
    /// Open an MTD device read-write
    pub fn open(config: &MtdConfig) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if config.sync {
            options.custom_flags(libc::O_SYNC);
        }

        let file = options.open(&config.path).map_err(|e| MtdError::Open {
            path: config.path.display().to_string(),
            source: e,
        })?;

        info!(
            "Opened {} (sync={})",
            config.path.display(),
            config.sync
        );

        Ok(Self {
            file,
            path: config.path.clone(),
        })
    }

    /// Path of the device node
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check(&self, request: Request, ret: ioctl::IoctlResult) -> Result<i32> {
        match ret {
            Ok(value) => {
                trace!("{}: {} -> {}", self.path.display(), request, value);
                Ok(value)
            }
            Err(errno) => {
                debug!("{}: {} -> {:?}", self.path.display(), request, errno);
                Err(MtdError::Ioctl { request, errno })
            }
        }
    }

    /// `MEMGETINFO`
    pub fn info(&self) -> Result<MtdInfoUser> {
        let mut info = MtdInfoUser::default();
        // SAFETY: valid fd and an exclusively borrowed mtd_info_user
        let ret = unsafe { ioctl::mem_get_info(self.as_raw_fd(), &mut info) };
        self.check(Request::MemGetInfo, ret)?;
        Ok(info)
    }

    /// `MEMERASE`
    pub fn erase(&self, region: &EraseInfoUser) -> Result<()> {
        debug!(
            "{}: erase {:#x}+{:#x}",
            self.path.display(),
            region.start,
            region.length
        );
        // SAFETY: valid fd and a borrowed erase_info_user
        let ret = unsafe { ioctl::mem_erase(self.as_raw_fd(), region) };
        self.check(Request::MemErase, ret).map(drop)
    }

    /// `MEMERASE64`
    pub fn erase64(&self, region: &EraseInfoUser64) -> Result<()> {
        debug!(
            "{}: erase64 {:#x}+{:#x}",
            self.path.display(),
            region.start,
            region.length
        );
        // SAFETY: valid fd and a borrowed erase_info_user64
        let ret = unsafe { ioctl::mem_erase64(self.as_raw_fd(), region) };
        self.check(Request::MemErase64, ret).map(drop)
    }

    /// `MEMREADOOB`: fill `buf` with OOB data starting at `start`
    ///
    /// Returns the length the kernel reports as read.
    pub fn read_oob(&self, start: u32, buf: &mut [u8]) -> Result<u32> {
        let mut req = MtdOobBuf {
            start,
            length: oob_len(Request::MemReadOob, buf.len())?,
            ptr: buf.as_mut_ptr(),
        };
        // SAFETY: req.ptr points into `buf`, which stays mutably borrowed
        // for the call and is `length` bytes long
        let ret = unsafe { ioctl::mem_read_oob(self.as_raw_fd(), &mut req) };
        self.check(Request::MemReadOob, ret)?;
        Ok(req.length)
    }

    /// `MEMWRITEOOB`: write `data` to the OOB area starting at `start`
    ///
    /// Returns the length the kernel reports as written.
    pub fn write_oob(&self, start: u32, data: &[u8]) -> Result<u32> {
        let mut req = MtdOobBuf {
            start,
            length: oob_len(Request::MemWriteOob, data.len())?,
            // The kernel only reads through this pointer
            ptr: data.as_ptr() as *mut u8,
        };
        // SAFETY: req.ptr points into `data`, borrowed for the call
        let ret = unsafe { ioctl::mem_write_oob(self.as_raw_fd(), &mut req) };
        self.check(Request::MemWriteOob, ret)?;
        Ok(req.length)
    }

    /// `MEMREADOOB64`
    pub fn read_oob64(&self, start: u64, buf: &mut [u8]) -> Result<u32> {
        let mut req = MtdOobBuf64 {
            start,
            pad: 0,
            length: oob_len(Request::MemReadOob64, buf.len())?,
            usr_ptr: buf.as_mut_ptr() as u64,
        };
        // SAFETY: usr_ptr addresses `buf`, mutably borrowed for the call
        let ret = unsafe { ioctl::mem_read_oob64(self.as_raw_fd(), &mut req) };
        self.check(Request::MemReadOob64, ret)?;
        Ok(req.length)
    }

    /// `MEMWRITEOOB64`
    pub fn write_oob64(&self, start: u64, data: &[u8]) -> Result<u32> {
        let mut req = MtdOobBuf64 {
            start,
            pad: 0,
            length: oob_len(Request::MemWriteOob64, data.len())?,
            usr_ptr: data.as_ptr() as u64,
        };
        // SAFETY: usr_ptr addresses `data`, borrowed for the call
        let ret = unsafe { ioctl::mem_write_oob64(self.as_raw_fd(), &mut req) };
        self.check(Request::MemWriteOob64, ret)?;
        Ok(req.length)
    }

    /// `MEMLOCK`
    pub fn lock(&self, region: &EraseInfoUser) -> Result<()> {
        // SAFETY: valid fd and a borrowed erase_info_user
        let ret = unsafe { ioctl::mem_lock(self.as_raw_fd(), region) };
        self.check(Request::MemLock, ret).map(drop)
    }

    /// `MEMUNLOCK`
    pub fn unlock(&self, region: &EraseInfoUser) -> Result<()> {
        // SAFETY: valid fd and a borrowed erase_info_user
        let ret = unsafe { ioctl::mem_unlock(self.as_raw_fd(), region) };
        self.check(Request::MemUnlock, ret).map(drop)
    }

    /// `MEMISLOCKED`: whether any part of `region` is locked
    pub fn is_locked(&self, region: &EraseInfoUser) -> Result<bool> {
        // SAFETY: valid fd and a borrowed erase_info_user
        let ret = unsafe { ioctl::mem_is_locked(self.as_raw_fd(), region) };
        self.check(Request::MemIsLocked, ret).map(|locked| locked > 0)
    }

    /// `MEMGETREGIONCOUNT`
    pub fn region_count(&self) -> Result<i32> {
        let mut count: libc::c_int = 0;
        // SAFETY: valid fd and an exclusively borrowed int
        let ret = unsafe { ioctl::mem_get_region_count(self.as_raw_fd(), &mut count) };
        self.check(Request::MemGetRegionCount, ret)?;
        Ok(count)
    }

    /// `MEMGETREGIONINFO` for erase region `index`
    pub fn region_info(&self, index: u32) -> Result<RegionInfoUser> {
        let mut region = RegionInfoUser {
            regionindex: index,
            ..Default::default()
        };
        // SAFETY: valid fd and an exclusively borrowed region_info_user
        let ret = unsafe { ioctl::mem_get_region_info(self.as_raw_fd(), &mut region) };
        self.check(Request::MemGetRegionInfo, ret)?;
        Ok(region)
    }

    /// `MEMGETOOBSEL`
    pub fn oob_sel(&self) -> Result<NandOobinfo> {
        let mut oobinfo = NandOobinfo::default();
        // SAFETY: valid fd and an exclusively borrowed nand_oobinfo
        let ret = unsafe { ioctl::mem_get_oob_sel(self.as_raw_fd(), &mut oobinfo) };
        self.check(Request::MemGetOobSel, ret)?;
        Ok(oobinfo)
    }

    /// `MEMGETBADBLOCK`: whether the eraseblock containing `offset` is bad
    pub fn is_bad_block(&self, offset: i64) -> Result<bool> {
        let offset: KernelLoff = offset;
        // SAFETY: valid fd and a borrowed loff_t
        let ret = unsafe { ioctl::mem_get_bad_block(self.as_raw_fd(), &offset) };
        self.check(Request::MemGetBadBlock, ret).map(|bad| bad > 0)
    }

    /// `MEMSETBADBLOCK`: permanently mark the eraseblock containing `offset` bad
    pub fn mark_bad_block(&self, offset: i64) -> Result<()> {
        info!("{}: marking block at {:#x} bad", self.path.display(), offset);
        let offset: KernelLoff = offset;
        // SAFETY: valid fd and a borrowed loff_t
        let ret = unsafe { ioctl::mem_set_bad_block(self.as_raw_fd(), &offset) };
        self.check(Request::MemSetBadBlock, ret).map(drop)
    }

    /// `OTPSELECT`
    pub fn otp_select(&self, mode: OtpMode) -> Result<()> {
        let mode = mode as libc::c_int;
        // SAFETY: valid fd and a borrowed int
        let ret = unsafe { ioctl::otp_select(self.as_raw_fd(), &mode) };
        self.check(Request::OtpSelect, ret).map(drop)
    }

    /// `OTPGETREGIONCOUNT`
    pub fn otp_region_count(&self) -> Result<i32> {
        let mut count: libc::c_int = 0;
        // SAFETY: valid fd and an exclusively borrowed int
        let ret = unsafe { ioctl::otp_get_region_count(self.as_raw_fd(), &mut count) };
        self.check(Request::OtpGetRegionCount, ret)?;
        Ok(count)
    }

    /// `OTPGETREGIONINFO`: the first `count` OTP regions of the selected area
    ///
    /// The kernel copies out as many records as the chip reports, bounded by
    /// one page, regardless of what the caller expects; the buffer handed
    /// over is always page sized.
    pub fn otp_region_info(&self, count: usize) -> Result<Vec<OtpInfo>> {
        let capacity = OTP_INFO_PAGE / core::mem::size_of::<OtpInfo>();
        let mut regions = vec![OtpInfo::default(); capacity.max(count)];
        // SAFETY: `regions` holds at least a page worth of otp_info records
        let ret = unsafe { ioctl::otp_get_region_info(self.as_raw_fd(), regions.as_mut_ptr()) };
        self.check(Request::OtpGetRegionInfo, ret)?;
        regions.truncate(count);
        Ok(regions)
    }

    /// `OTPLOCK`
    pub fn otp_lock(&self, region: &OtpInfo) -> Result<()> {
        // SAFETY: valid fd and a borrowed otp_info
        let ret = unsafe { ioctl::otp_lock(self.as_raw_fd(), region) };
        self.check(Request::OtpLock, ret).map(drop)
    }

    /// `ECCGETLAYOUT`
    pub fn ecc_layout(&self) -> Result<NandEcclayoutUser> {
        let mut layout = NandEcclayoutUser::default();
        // SAFETY: valid fd and an exclusively borrowed nand_ecclayout_user
        let ret = unsafe { ioctl::ecc_get_layout(self.as_raw_fd(), &mut layout) };
        self.check(Request::EccGetLayout, ret)?;
        Ok(layout)
    }

    /// `ECCGETSTATS`
    pub fn ecc_stats(&self) -> Result<MtdEccStats> {
        let mut stats = MtdEccStats::default();
        // SAFETY: valid fd and an exclusively borrowed mtd_ecc_stats
        let ret = unsafe { ioctl::ecc_get_stats(self.as_raw_fd(), &mut stats) };
        self.check(Request::EccGetStats, ret)?;
        Ok(stats)
    }

    /// `MTDFILEMODE`
    pub fn set_file_mode(&self, mode: FileMode) -> Result<()> {
        debug!("{}: file mode {:?}", self.path.display(), mode);
        // SAFETY: integer argument, no memory is shared
        let ret = unsafe { ioctl::mtd_file_mode(self.as_raw_fd(), mode as libc::c_ulong) };
        self.check(Request::MtdFileMode, ret).map(drop)
    }

    /// `MEMWRITE`
    ///
    /// Not supported by flashes without OOB, e.g. NOR.
    pub fn write_req(&self, req: &WriteRequest<'_>) -> Result<()> {
        debug!(
            "{}: write {:#x} data={} oob={} mode={:?}",
            self.path.display(),
            req.start,
            req.data.map_or(0, <[u8]>::len),
            req.oob.map_or(0, <[u8]>::len),
            req.mode
        );
        let mut raw = req.to_raw();
        // SAFETY: usr_data/usr_oob address the slices borrowed by `req`,
        // which outlive the call
        let ret = unsafe { ioctl::mem_write(self.as_raw_fd(), &mut raw) };
        self.check(Request::MemWrite, ret).map(drop)
    }

    /// Read `buf.len()` bytes at `offset` through the character device
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file
            .read_exact_at(buf, offset)
            .map_err(|e| MtdError::Read {
                offset,
                len: buf.len(),
                source: e,
            })
    }

    /// Write `data` at `offset` through the character device
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file
            .write_all_at(data, offset)
            .map_err(|e| MtdError::Write {
                offset,
                len: data.len(),
                source: e,
            })
    }
}

impl AsRawFd for MtdDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

fn oob_len(request: Request, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| MtdError::BufferTooLarge { request, len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Errno;
    use std::io::Write;

    #[test]
    fn test_config_from_index() {
        let config = MtdConfig::from_index(3).with_sync(true);
        assert_eq!(config.path, PathBuf::from("/dev/mtd3"));
        assert!(config.sync);
    }

    #[test]
    fn test_write_request_embeds_buffers() {
        let data = [0xA5u8; 64];
        let oob = [0x5Au8; 8];
        let raw = WriteRequest::data(0x8000, &data)
            .with_oob(&oob)
            .with_mode(OpsMode::AutoOob)
            .to_raw();

        assert_eq!(raw.start, 0x8000);
        assert_eq!(raw.len, 64);
        assert_eq!(raw.ooblen, 8);
        assert_eq!(raw.usr_data, data.as_ptr() as u64);
        assert_eq!(raw.usr_oob, oob.as_ptr() as u64);
        assert_eq!(raw.mode, 1);
        assert_eq!(raw.padding, [0; 7]);
    }

    #[test]
    fn test_write_request_without_oob() {
        let data = [0u8; 16];
        let raw = WriteRequest::data(0, &data).to_raw();
        assert_eq!(raw.usr_oob, 0);
        assert_eq!(raw.ooblen, 0);
        assert_eq!(raw.mode, OpsMode::PlaceOob as u8);
    }

    #[test]
    fn test_open_missing_node() {
        let err = MtdDevice::open(&MtdConfig::new("/nonexistent/mtd99")).unwrap_err();
        assert!(matches!(err, MtdError::Open { .. }));
        assert_eq!(err.errno(), None);
    }

    #[test]
    fn test_ioctl_on_regular_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xFFu8; 32]).unwrap();
        let mtd = MtdDevice::open(&MtdConfig::new(file.path())).unwrap();

        let err = mtd.info().unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ENOTTY));
        assert!(matches!(
            err,
            MtdError::Ioctl {
                request: Request::MemGetInfo,
                ..
            }
        ));

        let mut buf = [0u8; 16];
        mtd.read_at(8, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xFF));

        let err = mtd.read_at(24, &mut buf).unwrap_err();
        assert!(matches!(err, MtdError::Read { offset: 24, len: 16, .. }));
    }
}
