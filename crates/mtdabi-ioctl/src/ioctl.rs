//! MTD ioctl opcode catalog and raw forwarding calls
//!
//! Each `Request` pairs a kernel opcode with the argument struct it carries.
//! The numeric codes are built with nix's `request_code_*` macros so they
//! follow the target's `_IOC` encoding. The raw calls go through
//! `libc::ioctl` directly and surface the untouched errno.
//!
//! Some direction bits in `mtd-abi.h` do not describe the actual data flow
//! (`OTPSELECT` is `_IOR` but read by the kernel, `OTPGETREGIONCOUNT` is `_IOW`
//! but written by it). The encoding is ABI and is kept as the header has it;
//! the raw call signatures below follow the real data flow instead.

use core::fmt;
use core::mem::size_of;
use std::os::unix::io::RawFd;

use libc::{c_int, c_ulong, c_void};
use nix::sys::ioctl::ioctl_num_type;
use nix::{request_code_none, request_code_read, request_code_readwrite, request_code_write};

use crate::abi::{
    EraseInfoUser, EraseInfoUser64, MtdEccStats, MtdInfoUser, MtdOobBuf, MtdOobBuf64,
    MtdWriteReq, NandEcclayoutUser, NandOobinfo, OtpInfo, RegionInfoUser,
};
use crate::error::Errno;

/// ioctl magic for MTD character devices
const MTD_IOC_MAGIC: u8 = b'M';

/// `__kernel_loff_t`
pub type KernelLoff = i64;

/// Every MTD ioctl request defined by the v5.12 uAPI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    MemGetInfo,
    MemErase,
    MemWriteOob,
    MemReadOob,
    MemLock,
    MemUnlock,
    MemGetRegionCount,
    MemGetRegionInfo,
    MemGetOobSel,
    MemGetBadBlock,
    MemSetBadBlock,
    OtpSelect,
    OtpGetRegionCount,
    OtpGetRegionInfo,
    OtpLock,
    EccGetLayout,
    EccGetStats,
    MtdFileMode,
    MemErase64,
    MemWriteOob64,
    MemReadOob64,
    MemIsLocked,
    MemWrite,
}

impl Request {
    /// All requests in opcode order
    pub const ALL: [Request; 23] = [
        Request::MemGetInfo,
        Request::MemErase,
        Request::MemWriteOob,
        Request::MemReadOob,
        Request::MemLock,
        Request::MemUnlock,
        Request::MemGetRegionCount,
        Request::MemGetRegionInfo,
        Request::MemGetOobSel,
        Request::MemGetBadBlock,
        Request::MemSetBadBlock,
        Request::OtpSelect,
        Request::OtpGetRegionCount,
        Request::OtpGetRegionInfo,
        Request::OtpLock,
        Request::EccGetLayout,
        Request::EccGetStats,
        Request::MtdFileMode,
        Request::MemErase64,
        Request::MemWriteOob64,
        Request::MemReadOob64,
        Request::MemIsLocked,
        Request::MemWrite,
    ];

    /// Sequence number within the `'M'` ioctl space
    pub const fn nr(self) -> u8 {
        match self {
            Request::MemGetInfo => 1,
            Request::MemErase => 2,
            Request::MemWriteOob => 3,
            Request::MemReadOob => 4,
            Request::MemLock => 5,
            Request::MemUnlock => 6,
            Request::MemGetRegionCount => 7,
            Request::MemGetRegionInfo => 8,
            // 9 was MEMSETOOBSEL, removed from the uAPI
            Request::MemGetOobSel => 10,
            Request::MemGetBadBlock => 11,
            Request::MemSetBadBlock => 12,
            Request::OtpSelect => 13,
            Request::OtpGetRegionCount => 14,
            Request::OtpGetRegionInfo => 15,
            Request::OtpLock => 16,
            Request::EccGetLayout => 17,
            Request::EccGetStats => 18,
            Request::MtdFileMode => 19,
            Request::MemErase64 => 20,
            Request::MemWriteOob64 => 21,
            Request::MemReadOob64 => 22,
            Request::MemIsLocked => 23,
            Request::MemWrite => 24,
        }
    }

    /// Encoded request number as passed to `ioctl(2)`
    pub const fn code(self) -> ioctl_num_type {
        let m = MTD_IOC_MAGIC;
        let nr = self.nr();
        match self {
            Request::MemGetInfo => request_code_read!(m, nr, size_of::<MtdInfoUser>()),
            Request::MemErase => request_code_write!(m, nr, size_of::<EraseInfoUser>()),
            Request::MemWriteOob => request_code_readwrite!(m, nr, size_of::<MtdOobBuf>()),
            Request::MemReadOob => request_code_readwrite!(m, nr, size_of::<MtdOobBuf>()),
            Request::MemLock => request_code_write!(m, nr, size_of::<EraseInfoUser>()),
            Request::MemUnlock => request_code_write!(m, nr, size_of::<EraseInfoUser>()),
            Request::MemGetRegionCount => request_code_read!(m, nr, size_of::<c_int>()),
            Request::MemGetRegionInfo => {
                request_code_readwrite!(m, nr, size_of::<RegionInfoUser>())
            }
            Request::MemGetOobSel => request_code_read!(m, nr, size_of::<NandOobinfo>()),
            Request::MemGetBadBlock => request_code_write!(m, nr, size_of::<KernelLoff>()),
            Request::MemSetBadBlock => request_code_write!(m, nr, size_of::<KernelLoff>()),
            Request::OtpSelect => request_code_read!(m, nr, size_of::<c_int>()),
            Request::OtpGetRegionCount => request_code_write!(m, nr, size_of::<c_int>()),
            Request::OtpGetRegionInfo => request_code_write!(m, nr, size_of::<OtpInfo>()),
            Request::OtpLock => request_code_read!(m, nr, size_of::<OtpInfo>()),
            Request::EccGetLayout => request_code_read!(m, nr, size_of::<NandEcclayoutUser>()),
            Request::EccGetStats => request_code_read!(m, nr, size_of::<MtdEccStats>()),
            Request::MtdFileMode => request_code_none!(m, nr),
            Request::MemErase64 => request_code_write!(m, nr, size_of::<EraseInfoUser64>()),
            Request::MemWriteOob64 => request_code_readwrite!(m, nr, size_of::<MtdOobBuf64>()),
            Request::MemReadOob64 => request_code_readwrite!(m, nr, size_of::<MtdOobBuf64>()),
            Request::MemIsLocked => request_code_read!(m, nr, size_of::<EraseInfoUser>()),
            Request::MemWrite => request_code_readwrite!(m, nr, size_of::<MtdWriteReq>()),
        }
    }

    /// Kernel macro name of this request
    pub const fn name(self) -> &'static str {
        match self {
            Request::MemGetInfo => "MEMGETINFO",
            Request::MemErase => "MEMERASE",
            Request::MemWriteOob => "MEMWRITEOOB",
            Request::MemReadOob => "MEMREADOOB",
            Request::MemLock => "MEMLOCK",
            Request::MemUnlock => "MEMUNLOCK",
            Request::MemGetRegionCount => "MEMGETREGIONCOUNT",
            Request::MemGetRegionInfo => "MEMGETREGIONINFO",
            Request::MemGetOobSel => "MEMGETOOBSEL",
            Request::MemGetBadBlock => "MEMGETBADBLOCK",
            Request::MemSetBadBlock => "MEMSETBADBLOCK",
            Request::OtpSelect => "OTPSELECT",
            Request::OtpGetRegionCount => "OTPGETREGIONCOUNT",
            Request::OtpGetRegionInfo => "OTPGETREGIONINFO",
            Request::OtpLock => "OTPLOCK",
            Request::EccGetLayout => "ECCGETLAYOUT",
            Request::EccGetStats => "ECCGETSTATS",
            Request::MtdFileMode => "MTDFILEMODE",
            Request::MemErase64 => "MEMERASE64",
            Request::MemWriteOob64 => "MEMWRITEOOB64",
            Request::MemReadOob64 => "MEMREADOOB64",
            Request::MemIsLocked => "MEMISLOCKED",
            Request::MemWrite => "MEMWRITE",
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a raw ioctl: the non-negative return value or the errno
pub type IoctlResult = std::result::Result<c_int, Errno>;

/// Issue `request` with a pointer argument
///
/// # Safety
/// `fd` must be an open MTD character device and `arg` must point to memory
/// laid out as the request's argument struct, valid for the whole call and
/// writable where the kernel writes.
pub unsafe fn call_ptr(fd: RawFd, request: Request, arg: *mut c_void) -> IoctlResult {
    let ret = libc::ioctl(fd, request.code(), arg);
    if ret < 0 {
        Err(Errno::last())
    } else {
        Ok(ret)
    }
}

/// Issue `request` with an integer argument
///
/// # Safety
/// `fd` must be an open MTD character device.
pub unsafe fn call_int(fd: RawFd, request: Request, arg: c_ulong) -> IoctlResult {
    let ret = libc::ioctl(fd, request.code(), arg);
    if ret < 0 {
        Err(Errno::last())
    } else {
        Ok(ret)
    }
}

macro_rules! mtd_ioctl {
    ($(#[$attr:meta])* $name:ident, $request:ident, in $ty:ty) => {
        $(#[$attr])*
        ///
        /// # Safety
        /// `fd` must be an open MTD device and `arg` must be valid for reads
        /// for the duration of the call.
        pub unsafe fn $name(fd: RawFd, arg: *const $ty) -> IoctlResult {
            call_ptr(fd, Request::$request, arg as *mut c_void)
        }
    };
    ($(#[$attr:meta])* $name:ident, $request:ident, out $ty:ty) => {
        $(#[$attr])*
        ///
        /// # Safety
        /// `fd` must be an open MTD device and `arg` must be valid for reads
        /// and writes for the duration of the call.
        pub unsafe fn $name(fd: RawFd, arg: *mut $ty) -> IoctlResult {
            call_ptr(fd, Request::$request, arg as *mut c_void)
        }
    };
}

mtd_ioctl!(
    /// `MEMGETINFO`: get MTD characteristics
    mem_get_info, MemGetInfo, out MtdInfoUser
);
mtd_ioctl!(
    /// `MEMERASE`: erase a segment (32-bit offsets)
    mem_erase, MemErase, in EraseInfoUser
);
mtd_ioctl!(
    /// `MEMWRITEOOB`: write out-of-band data; the kernel writes back the length
    mem_write_oob, MemWriteOob, out MtdOobBuf
);
mtd_ioctl!(
    /// `MEMREADOOB`: read out-of-band data; the kernel writes back the length
    mem_read_oob, MemReadOob, out MtdOobBuf
);
mtd_ioctl!(
    /// `MEMLOCK`: lock a range (chips with lock support only)
    mem_lock, MemLock, in EraseInfoUser
);
mtd_ioctl!(
    /// `MEMUNLOCK`: unlock a range (chips with lock support only)
    mem_unlock, MemUnlock, in EraseInfoUser
);
mtd_ioctl!(
    /// `MEMGETREGIONCOUNT`: number of erase regions
    mem_get_region_count, MemGetRegionCount, out c_int
);
mtd_ioctl!(
    /// `MEMGETREGIONINFO`: describe the erase region selected by `regionindex`
    mem_get_region_info, MemGetRegionInfo, out RegionInfoUser
);
mtd_ioctl!(
    /// `MEMGETOOBSEL`: legacy OOB/ECC placement
    mem_get_oob_sel, MemGetOobSel, out NandOobinfo
);
mtd_ioctl!(
    /// `MEMGETBADBLOCK`: returns 1 if the eraseblock at the offset is bad
    mem_get_bad_block, MemGetBadBlock, in KernelLoff
);
mtd_ioctl!(
    /// `MEMSETBADBLOCK`: mark the eraseblock at the offset bad
    mem_set_bad_block, MemSetBadBlock, in KernelLoff
);
mtd_ioctl!(
    /// `OTPSELECT`: select the OTP area (`MTD_OTP_*`)
    otp_select, OtpSelect, in c_int
);
mtd_ioctl!(
    /// `OTPGETREGIONCOUNT`: number of OTP regions in the selected area
    otp_get_region_count, OtpGetRegionCount, out c_int
);
mtd_ioctl!(
    /// `OTPGETREGIONINFO`: fill an array of `otp_info`, up to one page
    otp_get_region_info, OtpGetRegionInfo, out OtpInfo
);
mtd_ioctl!(
    /// `OTPLOCK`: lock a user OTP range (file must be in `MTD_FILE_MODE_OTP_USER`)
    otp_lock, OtpLock, in OtpInfo
);
mtd_ioctl!(
    /// `ECCGETLAYOUT`: ECC layout (deprecated)
    ecc_get_layout, EccGetLayout, out NandEcclayoutUser
);
mtd_ioctl!(
    /// `ECCGETSTATS`: corrected/uncorrected error counters
    ecc_get_stats, EccGetStats, out MtdEccStats
);
mtd_ioctl!(
    /// `MEMERASE64`: erase a segment (64-bit offsets)
    mem_erase64, MemErase64, in EraseInfoUser64
);
mtd_ioctl!(
    /// `MEMWRITEOOB64`: write out-of-band data (64-bit offsets)
    mem_write_oob64, MemWriteOob64, out MtdOobBuf64
);
mtd_ioctl!(
    /// `MEMREADOOB64`: read out-of-band data (64-bit offsets)
    mem_read_oob64, MemReadOob64, out MtdOobBuf64
);
mtd_ioctl!(
    /// `MEMISLOCKED`: returns 1 if any part of the range is locked
    mem_is_locked, MemIsLocked, in EraseInfoUser
);
mtd_ioctl!(
    /// `MEMWRITE`: generic in-band and/or out-of-band write
    mem_write, MemWrite, out MtdWriteReq
);

/// `MTDFILEMODE`: set the access mode of this file descriptor
///
/// # Safety
/// `fd` must be an open MTD device.
pub unsafe fn mtd_file_mode(fd: RawFd, mode: c_ulong) -> IoctlResult {
    call_int(fd, Request::MtdFileMode, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_numbers_are_unique() {
        for (i, a) in Request::ALL.iter().enumerate() {
            for b in &Request::ALL[i + 1..] {
                assert_ne!(a.nr(), b.nr(), "{} and {}", a, b);
                assert_ne!(a.code(), b.code(), "{} and {}", a, b);
            }
        }
    }

    #[test]
    fn test_request_order() {
        let nrs: Vec<u8> = Request::ALL.iter().map(|r| r.nr()).collect();
        let mut sorted = nrs.clone();
        sorted.sort_unstable();
        assert_eq!(nrs, sorted);
        assert_eq!(Request::MemWrite.nr(), 24);
        assert_eq!(Request::MemGetOobSel.nr(), 10);
    }

    #[test]
    fn test_request_names() {
        assert_eq!(Request::MemGetInfo.to_string(), "MEMGETINFO");
        assert_eq!(Request::MemErase64.to_string(), "MEMERASE64");
        assert_eq!(Request::MtdFileMode.to_string(), "MTDFILEMODE");
    }

    /// Values as generated by the kernel headers with the generic `_IOC`
    /// encoding on a 64-bit target
    #[test]
    #[cfg(all(
        target_os = "linux",
        target_pointer_width = "64",
        any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64")
    ))]
    fn test_request_codes_match_kernel_headers() {
        let expected: [(Request, u32); 23] = [
            (Request::MemGetInfo, 0x8020_4d01),
            (Request::MemErase, 0x4008_4d02),
            (Request::MemWriteOob, 0xc010_4d03),
            (Request::MemReadOob, 0xc010_4d04),
            (Request::MemLock, 0x4008_4d05),
            (Request::MemUnlock, 0x4008_4d06),
            (Request::MemGetRegionCount, 0x8004_4d07),
            (Request::MemGetRegionInfo, 0xc010_4d08),
            (Request::MemGetOobSel, 0x80c8_4d0a),
            (Request::MemGetBadBlock, 0x4008_4d0b),
            (Request::MemSetBadBlock, 0x4008_4d0c),
            (Request::OtpSelect, 0x8004_4d0d),
            (Request::OtpGetRegionCount, 0x4004_4d0e),
            (Request::OtpGetRegionInfo, 0x400c_4d0f),
            (Request::OtpLock, 0x800c_4d10),
            (Request::EccGetLayout, 0x8148_4d11),
            (Request::EccGetStats, 0x8010_4d12),
            (Request::MtdFileMode, 0x0000_4d13),
            (Request::MemErase64, 0x4010_4d14),
            (Request::MemWriteOob64, 0xc018_4d15),
            (Request::MemReadOob64, 0xc018_4d16),
            (Request::MemIsLocked, 0x8008_4d17),
            (Request::MemWrite, 0xc030_4d18),
        ];
        for (request, code) in expected {
            assert_eq!(request.code() as u64, code as u64, "{}", request);
        }
    }
}
