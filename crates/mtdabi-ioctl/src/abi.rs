//! Userspace-visible MTD structures and constants
//!
//! Mirrors `include/uapi/mtd/mtd-abi.h` as of Linux v5.12. Every struct here
//! is handed to the kernel by pointer, so field order, width and padding must
//! match the C definition exactly. The layout tests at the bottom of this file
//! pin sizes and offsets for LP64 targets.

use bitflags::bitflags;
use core::fmt;

use crate::error::MtdError;

/// Maximum number of free OOB areas reported by `ECCGETLAYOUT`
pub const MTD_MAX_OOBFREE_ENTRIES: usize = 8;
/// Maximum number of ECC byte positions reported by `ECCGETLAYOUT`
pub const MTD_MAX_ECCPOS_ENTRIES: usize = 64;

/// `struct erase_info_user`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EraseInfoUser {
    pub start: u32,
    pub length: u32,
}

/// `struct erase_info_user64`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EraseInfoUser64 {
    pub start: u64,
    pub length: u64,
}

/// `struct mtd_oob_buf`
///
/// The buffer address is a native pointer, so this struct is 16 bytes on
/// 64-bit targets and 12 bytes on 32-bit ones.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtdOobBuf {
    pub start: u32,
    pub length: u32,
    pub ptr: *mut u8,
}

impl Default for MtdOobBuf {
    fn default() -> Self {
        Self {
            start: 0,
            length: 0,
            ptr: core::ptr::null_mut(),
        }
    }
}

/// `struct mtd_oob_buf64`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MtdOobBuf64 {
    pub start: u64,
    pub pad: u32,
    pub length: u32,
    pub usr_ptr: u64,
}

/// `struct mtd_write_req`, the argument of `MEMWRITE`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MtdWriteReq {
    pub start: u64,
    pub len: u64,
    pub ooblen: u64,
    pub usr_data: u64,
    pub usr_oob: u64,
    pub mode: u8,
    pub padding: [u8; 7],
}

/// `struct mtd_info_user`, returned by `MEMGETINFO`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MtdInfoUser {
    pub type_: u8,
    pub flags: u32,
    pub size: u32,
    pub erasesize: u32,
    pub writesize: u32,
    pub oobsize: u32,
    pub padding: u64,
}

impl MtdInfoUser {
    /// Decode the device type byte
    pub fn mtd_type(&self) -> Result<MtdType, MtdError> {
        MtdType::try_from(self.type_)
    }

    /// Decode the capability flags, keeping bits this crate has no name for
    pub fn mtd_flags(&self) -> MtdFlags {
        MtdFlags::from_bits_retain(self.flags)
    }

    /// Number of erase blocks on the device
    pub fn block_count(&self) -> u32 {
        if self.erasesize == 0 {
            return 0;
        }
        self.size / self.erasesize
    }
}

/// `struct region_info_user`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionInfoUser {
    pub offset: u32,
    pub erasesize: u32,
    pub numblocks: u32,
    pub regionindex: u32,
}

/// `struct otp_info`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OtpInfo {
    pub start: u32,
    pub length: u32,
    pub locked: u32,
}

/// `struct nand_oobinfo` (legacy, returned by `MEMGETOOBSEL`)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NandOobinfo {
    pub useecc: u32,
    pub eccbytes: u32,
    pub oobfree: [[u32; 2]; 8],
    pub eccpos: [u32; 32],
}

/// `struct nand_oobfree`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NandOobfree {
    pub offset: u32,
    pub length: u32,
}

/// `struct nand_ecclayout_user` (deprecated, returned by `ECCGETLAYOUT`)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NandEcclayoutUser {
    pub eccbytes: u32,
    pub eccpos: [u32; MTD_MAX_ECCPOS_ENTRIES],
    pub oobavail: u32,
    pub oobfree: [NandOobfree; MTD_MAX_OOBFREE_ENTRIES],
}

// [u32; 64] has no Default impl
impl Default for NandEcclayoutUser {
    fn default() -> Self {
        Self {
            eccbytes: 0,
            eccpos: [0; MTD_MAX_ECCPOS_ENTRIES],
            oobavail: 0,
            oobfree: [NandOobfree::default(); MTD_MAX_OOBFREE_ENTRIES],
        }
    }
}

/// `struct mtd_ecc_stats`, returned by `ECCGETSTATS`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MtdEccStats {
    pub corrected: u32,
    pub failed: u32,
    pub badblocks: u32,
    pub bbtblocks: u32,
}

/// MTD device type (`MTD_ABSENT` .. `MTD_MLCNANDFLASH`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MtdType {
    Absent = 0,
    Ram = 1,
    Rom = 2,
    NorFlash = 3,
    NandFlash = 4,
    DataFlash = 6,
    UbiVolume = 7,
    MlcNandFlash = 8,
}

impl TryFrom<u8> for MtdType {
    type Error = MtdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => MtdType::Absent,
            1 => MtdType::Ram,
            2 => MtdType::Rom,
            3 => MtdType::NorFlash,
            4 => MtdType::NandFlash,
            6 => MtdType::DataFlash,
            7 => MtdType::UbiVolume,
            8 => MtdType::MlcNandFlash,
            other => {
                return Err(MtdError::UnknownValue {
                    what: "MTD type",
                    value: other as u32,
                })
            }
        })
    }
}

impl fmt::Display for MtdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MtdType::Absent => "absent",
            MtdType::Ram => "ram",
            MtdType::Rom => "rom",
            MtdType::NorFlash => "nor",
            MtdType::NandFlash => "nand",
            MtdType::DataFlash => "dataflash",
            MtdType::UbiVolume => "ubi",
            MtdType::MlcNandFlash => "mlc-nand",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// MTD capability flags (`mtd_info_user.flags`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MtdFlags: u32 {
        /// Device is writeable
        const WRITEABLE     = 0x400;
        /// Single bits can be flipped
        const BIT_WRITEABLE = 0x800;
        /// No erase necessary
        const NO_ERASE      = 0x1000;
        /// Always locked after reset
        const POWERUP_LOCK  = 0x2000;

        const CAP_ROM       = 0;
        const CAP_RAM       = Self::WRITEABLE.bits() | Self::BIT_WRITEABLE.bits() | Self::NO_ERASE.bits();
        const CAP_NORFLASH  = Self::WRITEABLE.bits() | Self::BIT_WRITEABLE.bits();
        const CAP_NANDFLASH = Self::WRITEABLE.bits();
    }
}

/// Operation mode for `MEMWRITE` (`MTD_OPS_*`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpsMode {
    /// OOB data are placed at the given offset
    #[default]
    PlaceOob = 0,
    /// OOB data are automatically placed at the free areas
    AutoOob = 1,
    /// Data are transferred as-is, with no error correction
    Raw = 2,
}

impl TryFrom<u8> for OpsMode {
    type Error = MtdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => OpsMode::PlaceOob,
            1 => OpsMode::AutoOob,
            2 => OpsMode::Raw,
            other => {
                return Err(MtdError::UnknownValue {
                    what: "MTD ops mode",
                    value: other as u32,
                })
            }
        })
    }
}

/// OTP area selected by `OTPSELECT` (`MTD_OTP_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OtpMode {
    Off = 0,
    Factory = 1,
    User = 2,
}

impl TryFrom<i32> for OtpMode {
    type Error = MtdError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => OtpMode::Off,
            1 => OtpMode::Factory,
            2 => OtpMode::User,
            other => {
                return Err(MtdError::UnknownValue {
                    what: "OTP mode",
                    value: other as u32,
                })
            }
        })
    }
}

/// Per file descriptor access mode set by `MTDFILEMODE` (`MTD_FILE_MODE_*`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FileMode {
    #[default]
    Normal = 0,
    OtpFactory = 1,
    OtpUser = 2,
    Raw = 3,
}

impl TryFrom<u32> for FileMode {
    type Error = MtdError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => FileMode::Normal,
            1 => FileMode::OtpFactory,
            2 => FileMode::OtpUser,
            3 => FileMode::Raw,
            other => {
                return Err(MtdError::UnknownValue {
                    what: "MTD file mode",
                    value: other,
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{align_of, offset_of, size_of};

    #[test]
    fn test_fixed_width_struct_sizes() {
        assert_eq!(size_of::<EraseInfoUser>(), 8);
        assert_eq!(size_of::<EraseInfoUser64>(), 16);
        assert_eq!(size_of::<MtdOobBuf64>(), 24);
        assert_eq!(size_of::<MtdWriteReq>(), 48);
        assert_eq!(size_of::<MtdInfoUser>(), 32);
        assert_eq!(size_of::<RegionInfoUser>(), 16);
        assert_eq!(size_of::<OtpInfo>(), 12);
        assert_eq!(size_of::<NandOobinfo>(), 200);
        assert_eq!(size_of::<NandOobfree>(), 8);
        assert_eq!(size_of::<NandEcclayoutUser>(), 328);
        assert_eq!(size_of::<MtdEccStats>(), 16);
    }

    #[test]
    fn test_pointer_width_oob_buf() {
        assert_eq!(offset_of!(MtdOobBuf, ptr), 8);
        assert_eq!(align_of::<MtdOobBuf>(), align_of::<*mut u8>());
        #[cfg(target_pointer_width = "64")]
        assert_eq!(size_of::<MtdOobBuf>(), 16);
        #[cfg(target_pointer_width = "32")]
        assert_eq!(size_of::<MtdOobBuf>(), 12);
    }

    #[test]
    fn test_mtd_info_user_offsets() {
        assert_eq!(offset_of!(MtdInfoUser, type_), 0);
        assert_eq!(offset_of!(MtdInfoUser, flags), 4);
        assert_eq!(offset_of!(MtdInfoUser, size), 8);
        assert_eq!(offset_of!(MtdInfoUser, erasesize), 12);
        assert_eq!(offset_of!(MtdInfoUser, writesize), 16);
        assert_eq!(offset_of!(MtdInfoUser, oobsize), 20);
        assert_eq!(offset_of!(MtdInfoUser, padding), 24);
    }

    #[test]
    fn test_oob_buf64_offsets() {
        assert_eq!(offset_of!(MtdOobBuf64, start), 0);
        assert_eq!(offset_of!(MtdOobBuf64, pad), 8);
        assert_eq!(offset_of!(MtdOobBuf64, length), 12);
        assert_eq!(offset_of!(MtdOobBuf64, usr_ptr), 16);
    }

    #[test]
    fn test_write_req_offsets() {
        assert_eq!(offset_of!(MtdWriteReq, start), 0);
        assert_eq!(offset_of!(MtdWriteReq, len), 8);
        assert_eq!(offset_of!(MtdWriteReq, ooblen), 16);
        assert_eq!(offset_of!(MtdWriteReq, usr_data), 24);
        assert_eq!(offset_of!(MtdWriteReq, usr_oob), 32);
        assert_eq!(offset_of!(MtdWriteReq, mode), 40);
        assert_eq!(offset_of!(MtdWriteReq, padding), 41);
    }

    #[test]
    fn test_ecc_layout_offsets() {
        assert_eq!(offset_of!(NandOobinfo, oobfree), 8);
        assert_eq!(offset_of!(NandOobinfo, eccpos), 72);
        assert_eq!(offset_of!(NandEcclayoutUser, eccpos), 4);
        assert_eq!(offset_of!(NandEcclayoutUser, oobavail), 260);
        assert_eq!(offset_of!(NandEcclayoutUser, oobfree), 264);
    }

    #[test]
    fn test_mtd_type_conversion() {
        assert_eq!(MtdType::try_from(4).unwrap(), MtdType::NandFlash);
        assert_eq!(MtdType::try_from(3).unwrap(), MtdType::NorFlash);
        assert!(matches!(
            MtdType::try_from(5),
            Err(MtdError::UnknownValue { value: 5, .. })
        ));
    }

    #[test]
    fn test_nand_capabilities() {
        let info = MtdInfoUser {
            type_: 4,
            flags: 0x400,
            size: 0x200_0000,
            erasesize: 0x4000,
            writesize: 0x200,
            oobsize: 0x10,
            padding: 0,
        };
        assert_eq!(info.mtd_type().unwrap(), MtdType::NandFlash);
        assert_eq!(info.mtd_flags(), MtdFlags::CAP_NANDFLASH);
        assert!(!info.mtd_flags().contains(MtdFlags::NO_ERASE));
        assert_eq!(info.block_count(), 2048);
    }

    #[test]
    fn test_file_mode_values() {
        assert_eq!(FileMode::Normal as u32, 0);
        assert_eq!(FileMode::Raw as u32, 3);
        assert_eq!(FileMode::try_from(2).unwrap(), FileMode::OtpUser);
        assert!(FileMode::try_from(4).is_err());
    }

    #[test]
    fn test_mode_conversions() {
        assert_eq!(OpsMode::default(), OpsMode::PlaceOob);
        assert_eq!(OpsMode::try_from(1).unwrap(), OpsMode::AutoOob);
        assert!(OpsMode::try_from(3).is_err());

        assert_eq!(OtpMode::try_from(2).unwrap(), OtpMode::User);
        assert!(matches!(
            OtpMode::try_from(-1),
            Err(MtdError::UnknownValue { what: "OTP mode", .. })
        ));
    }
}
