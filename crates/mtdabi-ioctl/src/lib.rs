//! mtdabi-ioctl - Linux MTD (Memory Technology Device) ioctl bindings
//!
//! This crate exposes the MTD character device ABI from
//! `include/uapi/mtd/mtd-abi.h` (Linux v5.12) as typed calls. MTD devices are
//! exposed at `/dev/mtdN` and accept ioctls for geometry queries, erase,
//! out-of-band access, bad block management, ECC and OTP introspection.
//!
//! # Layers
//!
//! - [`abi`]: `#[repr(C)]` mirrors of the uAPI structs and typed constants
//! - [`ioctl`]: the opcode catalog and one raw `unsafe fn` per opcode
//! - [`device`]: [`MtdDevice`], a safe handle with one method per opcode
//!
//! Every call forwards exactly one ioctl. There is no buffering, retry or
//! translation layer: a failed request surfaces the kernel's errno untouched
//! in [`MtdError::Ioctl`], including kernel-internal codes such as
//! `ENOTSUPP` (524).
//!
//! # Example
//!
//! ```ignore
//! use mtdabi_ioctl::{EraseInfoUser, MtdConfig, MtdDevice};
//!
//! let mtd = MtdDevice::open(&MtdConfig::from_index(0).with_sync(true))?;
//! let info = mtd.info()?;
//! println!("{} bytes, {} byte eraseblocks", info.size, info.erasesize);
//!
//! mtd.erase(&EraseInfoUser { start: 0, length: info.erasesize })?;
//!
//! let mut oob = vec![0u8; info.oobsize as usize];
//! mtd.read_oob(0, &mut oob)?;
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with MTD character device support (`CONFIG_MTD_CHAR`)
//! - Read/write access to `/dev/mtdN` (usually root)

pub mod abi;
pub mod device;
pub mod error;
pub mod ioctl;

// Re-exports
pub use abi::{
    EraseInfoUser, EraseInfoUser64, FileMode, MtdEccStats, MtdFlags, MtdInfoUser, MtdOobBuf,
    MtdOobBuf64, MtdType, MtdWriteReq, NandEcclayoutUser, NandOobfree, NandOobinfo, OpsMode,
    OtpInfo, OtpMode, RegionInfoUser,
};
pub use device::{MtdConfig, MtdDevice, WriteRequest};
pub use error::{Errno, MtdError, Result};
pub use ioctl::Request;
