//! Pinned expectations for a simulated MTD device
//!
//! A [`Fixture`] records everything the suite compares against: the host it
//! was recorded on, how the simulated device is provisioned, the expected
//! `/proc/mtd` listing and every descriptor the device reports. It is built
//! once at harness start and never mutated afterwards.
//!
//! Fixtures are either the built-in [`NANDSIM`] recording or loaded from a RON
//! file with the same shape:
//!
//! ```text
//! (
//!     kernel_release: "5.12.8-arch1-1",
//!     working_dir: Some("/vagrant"),
//!     device: "/dev/mtd0",
//!     module: (name: "nandsim", params: [("first_id_byte", "0x20")]),
//!     proc_mtd: "dev:    size   erasesize  name\n...",
//!     info: (mtd_type: 4, flags: 0x400, size: 0x2000000, erasesize: 0x4000,
//!            writesize: 0x200, oobsize: 0x10),
//!     region_count: 0,
//!     oob_sel: (useecc: 2, eccbytes: 6, oobfree: [(8, 8)], eccpos: [0, 1, 2, 3, 6, 7]),
//!     ecc_layout: (eccbytes: 6, eccpos: [0, 1, 2, 3, 6, 7], oobavail: 8, oobfree: [(8, 8)]),
//!     ecc_stats: (corrected: 0, failed: 0, badblocks: 0, bbtblocks: 0),
//! )
//! ```
//!
//! Arrays shorter than the kernel struct are zero-filled.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::Deserialize;

use mtdabi_ioctl::{MtdEccStats, MtdInfoUser, NandEcclayoutUser, NandOobfree, NandOobinfo};

use crate::error::FixtureError;

/// Default device enumeration file
pub const PROC_MTD: &str = "/proc/mtd";

/// 32 MiB, 512 byte page NAND created by
/// `modprobe nandsim first_id_byte=0x20 second_id_byte=0x35` on 5.12.8-arch1-1.
/// It cannot be locked and has a single, uniform erase region.
pub static NANDSIM: Lazy<Fixture> = Lazy::new(Fixture::nandsim);

/// Kernel module that provides the simulated device
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModuleSpec {
    /// Module name as given to modprobe
    pub name: String,
    /// `key=value` parameters, in order
    #[serde(default)]
    pub params: Vec<(String, String)>,
}

impl ModuleSpec {
    /// Parameters rendered as `key=value` arguments
    pub fn args(&self) -> Vec<String> {
        self.params
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }
}

/// Pinned expectations for one simulated device on one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    /// `uname -r` of the host the fixture was recorded on
    pub kernel_release: String,
    /// Required working directory, if any
    pub working_dir: Option<PathBuf>,
    /// Device node under test
    pub device: PathBuf,
    /// Module providing the device
    pub module: ModuleSpec,
    /// Device enumeration file
    pub proc_mtd_path: PathBuf,
    /// Exact expected contents of the enumeration file
    pub proc_mtd: String,
    /// `MEMGETINFO`
    pub info: MtdInfoUser,
    /// `MEMGETREGIONCOUNT`
    pub region_count: i32,
    /// `MEMGETOOBSEL`
    pub oob_sel: NandOobinfo,
    /// `ECCGETLAYOUT`
    pub ecc_layout: NandEcclayoutUser,
    /// `ECCGETSTATS` on a device that has seen no bit errors
    pub ecc_stats: MtdEccStats,
}

impl Fixture {
    /// The built-in nandsim recording
    pub fn nandsim() -> Self {
        let mut oob_sel = NandOobinfo {
            useecc: 0x2,
            eccbytes: 0x6,
            ..Default::default()
        };
        oob_sel.oobfree[0] = [0x8, 0x8];
        oob_sel.eccpos[..6].copy_from_slice(&[0x0, 0x1, 0x2, 0x3, 0x6, 0x7]);

        let mut ecc_layout = NandEcclayoutUser {
            eccbytes: 0x6,
            oobavail: 0x8,
            ..Default::default()
        };
        ecc_layout.eccpos[..6].copy_from_slice(&[0x0, 0x1, 0x2, 0x3, 0x6, 0x7]);
        ecc_layout.oobfree[0] = NandOobfree {
            offset: 0x8,
            length: 0x8,
        };

        Self {
            kernel_release: "5.12.8-arch1-1".to_string(),
            working_dir: Some(PathBuf::from("/vagrant")),
            device: PathBuf::from("/dev/mtd0"),
            module: ModuleSpec {
                name: "nandsim".to_string(),
                params: vec![
                    ("first_id_byte".to_string(), "0x20".to_string()),
                    ("second_id_byte".to_string(), "0x35".to_string()),
                ],
            },
            proc_mtd_path: PathBuf::from(PROC_MTD),
            proc_mtd: "dev:    size   erasesize  name\n\
                       mtd0: 02000000 00004000 \"NAND simulator partition 0\"\n"
                .to_string(),
            info: MtdInfoUser {
                type_: 0x4,
                flags: 0x400,
                size: 0x200_0000,
                erasesize: 0x4000,
                writesize: 0x200,
                oobsize: 0x10,
                padding: 0,
            },
            region_count: 0,
            oob_sel,
            ecc_layout,
            ecc_stats: MtdEccStats::default(),
        }
    }

    /// Load a fixture from a RON file
    pub fn load_file(path: &Path) -> Result<Self, FixtureError> {
        let content = fs::read_to_string(path).map_err(|e| FixtureError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let fixture = Self::from_ron(&content)?;
        log::debug!("Loaded fixture from {}", path.display());
        Ok(fixture)
    }

    /// Parse a fixture from RON text
    pub fn from_ron(content: &str) -> Result<Self, FixtureError> {
        let def: FixtureDef = ron::from_str(content)?;
        Self::try_from(def)
    }

    /// Erase block size in bytes
    pub fn erase_size(&self) -> u32 {
        self.info.erasesize
    }

    /// Total device size in bytes
    pub fn device_size(&self) -> u32 {
        self.info.size
    }
}

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

#[derive(Debug, Deserialize)]
struct FixtureDef {
    kernel_release: String,
    #[serde(default)]
    working_dir: Option<PathBuf>,
    device: PathBuf,
    module: ModuleSpec,
    #[serde(default = "default_proc_mtd_path")]
    proc_mtd_path: PathBuf,
    proc_mtd: String,
    info: InfoDef,
    #[serde(default)]
    region_count: i32,
    oob_sel: OobSelDef,
    ecc_layout: EccLayoutDef,
    #[serde(default)]
    ecc_stats: EccStatsDef,
}

fn default_proc_mtd_path() -> PathBuf {
    PathBuf::from(PROC_MTD)
}

#[derive(Debug, Deserialize)]
struct InfoDef {
    mtd_type: u8,
    flags: u32,
    size: u32,
    erasesize: u32,
    writesize: u32,
    oobsize: u32,
}

#[derive(Debug, Deserialize)]
struct OobSelDef {
    useecc: u32,
    eccbytes: u32,
    #[serde(default)]
    oobfree: Vec<(u32, u32)>,
    #[serde(default)]
    eccpos: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct EccLayoutDef {
    eccbytes: u32,
    #[serde(default)]
    eccpos: Vec<u32>,
    oobavail: u32,
    #[serde(default)]
    oobfree: Vec<(u32, u32)>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EccStatsDef {
    corrected: u32,
    failed: u32,
    badblocks: u32,
    bbtblocks: u32,
}

/// Copy `src` into the front of `dst`, rejecting overlong input
fn fill<T: Copy>(field: &str, dst: &mut [T], src: &[T]) -> Result<(), FixtureError> {
    if src.len() > dst.len() {
        return Err(FixtureError::Validation(format!(
            "{} has {} entries, at most {} allowed",
            field,
            src.len(),
            dst.len()
        )));
    }
    dst[..src.len()].copy_from_slice(src);
    Ok(())
}

impl TryFrom<FixtureDef> for Fixture {
    type Error = FixtureError;

    fn try_from(def: FixtureDef) -> Result<Self, Self::Error> {
        let info = MtdInfoUser {
            type_: def.info.mtd_type,
            flags: def.info.flags,
            size: def.info.size,
            erasesize: def.info.erasesize,
            writesize: def.info.writesize,
            oobsize: def.info.oobsize,
            padding: 0,
        };
        if info.erasesize == 0 || info.size % info.erasesize != 0 {
            return Err(FixtureError::Validation(format!(
                "device size {:#x} is not a multiple of erase size {:#x}",
                info.size, info.erasesize
            )));
        }
        if def.region_count < 0 {
            return Err(FixtureError::Validation(format!(
                "negative region count {}",
                def.region_count
            )));
        }

        let mut oob_sel = NandOobinfo {
            useecc: def.oob_sel.useecc,
            eccbytes: def.oob_sel.eccbytes,
            ..Default::default()
        };
        let oobfree: Vec<[u32; 2]> = def
            .oob_sel
            .oobfree
            .iter()
            .map(|&(offset, length)| [offset, length])
            .collect();
        fill("oob_sel.oobfree", &mut oob_sel.oobfree, &oobfree)?;
        fill("oob_sel.eccpos", &mut oob_sel.eccpos, &def.oob_sel.eccpos)?;

        let mut ecc_layout = NandEcclayoutUser {
            eccbytes: def.ecc_layout.eccbytes,
            oobavail: def.ecc_layout.oobavail,
            ..Default::default()
        };
        let oobfree: Vec<NandOobfree> = def
            .ecc_layout
            .oobfree
            .iter()
            .map(|&(offset, length)| NandOobfree { offset, length })
            .collect();
        fill("ecc_layout.oobfree", &mut ecc_layout.oobfree, &oobfree)?;
        fill("ecc_layout.eccpos", &mut ecc_layout.eccpos, &def.ecc_layout.eccpos)?;

        Ok(Fixture {
            kernel_release: def.kernel_release,
            working_dir: def.working_dir,
            device: def.device,
            module: def.module,
            proc_mtd_path: def.proc_mtd_path,
            proc_mtd: def.proc_mtd,
            info,
            region_count: def.region_count,
            oob_sel,
            ecc_layout,
            ecc_stats: MtdEccStats {
                corrected: def.ecc_stats.corrected,
                failed: def.ecc_stats.failed,
                badblocks: def.ecc_stats.badblocks,
                bbtblocks: def.ecc_stats.bbtblocks,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHIPPED: &str = include_str!("../../../fixtures/nandsim-5.12.ron");

    #[test]
    fn test_shipped_fixture_matches_builtin() {
        let fixture = Fixture::from_ron(SHIPPED).unwrap();
        assert_eq!(fixture, *NANDSIM);
    }

    #[test]
    fn test_builtin_geometry() {
        let fixture = Fixture::nandsim();
        assert_eq!(fixture.device_size(), 32 * 1024 * 1024);
        assert_eq!(fixture.erase_size(), 16 * 1024);
        assert_eq!(fixture.info.block_count(), 2048);
        assert_eq!(
            fixture.module.args(),
            vec!["first_id_byte=0x20", "second_id_byte=0x35"]
        );
        assert!(fixture
            .proc_mtd
            .ends_with("mtd0: 02000000 00004000 \"NAND simulator partition 0\"\n"));
    }

    #[test]
    fn test_minimal_fixture_defaults() {
        let ron = r#"
        (
            kernel_release: "6.1.0",
            device: "/dev/mtd1",
            module: (name: "nandsim"),
            proc_mtd: "",
            info: (mtd_type: 4, flags: 0x400, size: 0x100000, erasesize: 0x20000,
                   writesize: 0x800, oobsize: 0x40),
            oob_sel: (useecc: 0, eccbytes: 0),
            ecc_layout: (eccbytes: 0, oobavail: 0),
        )
        "#;
        let fixture = Fixture::from_ron(ron).unwrap();
        assert_eq!(fixture.working_dir, None);
        assert_eq!(fixture.proc_mtd_path, PathBuf::from(PROC_MTD));
        assert_eq!(fixture.region_count, 0);
        assert_eq!(fixture.ecc_stats, MtdEccStats::default());
        assert!(fixture.module.params.is_empty());
        assert_eq!(fixture.ecc_layout, NandEcclayoutUser::default());
    }

    #[test]
    fn test_overlong_eccpos_rejected() {
        let eccpos: Vec<String> = (0..33).map(|i| i.to_string()).collect();
        let ron = format!(
            r#"(
                kernel_release: "x",
                device: "/dev/mtd0",
                module: (name: "nandsim"),
                proc_mtd: "",
                info: (mtd_type: 4, flags: 0, size: 0x4000, erasesize: 0x4000,
                       writesize: 0x200, oobsize: 0x10),
                oob_sel: (useecc: 0, eccbytes: 0, eccpos: [{}]),
                ecc_layout: (eccbytes: 0, oobavail: 0),
            )"#,
            eccpos.join(", ")
        );
        let err = Fixture::from_ron(&ron).unwrap_err();
        assert!(matches!(err, FixtureError::Validation(msg) if msg.contains("oob_sel.eccpos")));
    }

    #[test]
    fn test_misaligned_geometry_rejected() {
        let ron = r#"(
            kernel_release: "x",
            device: "/dev/mtd0",
            module: (name: "nandsim"),
            proc_mtd: "",
            info: (mtd_type: 4, flags: 0, size: 0x5000, erasesize: 0x4000,
                   writesize: 0x200, oobsize: 0x10),
            oob_sel: (useecc: 0, eccbytes: 0),
            ecc_layout: (eccbytes: 0, oobavail: 0),
        )"#;
        assert!(matches!(
            Fixture::from_ron(ron),
            Err(FixtureError::Validation(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Fixture::load_file(Path::new("/nonexistent/fixture.ron")).unwrap_err();
        assert!(matches!(err, FixtureError::Io { .. }));
    }
}
