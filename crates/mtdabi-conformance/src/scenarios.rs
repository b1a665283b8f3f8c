//! Scenario catalog
//!
//! Each scenario drives one ioctl, or a small group of related ones, against
//! the simulated device and checks every result against the fixture. They
//! are independent: each opens its own session and leaves the device fully
//! erased (or freshly reprovisioned) behind it.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use mtdabi_ioctl::{
    EraseInfoUser, EraseInfoUser64, Errno, FileMode, MtdInfoUser, OtpInfo, OtpMode, WriteRequest,
};

use crate::error::{OracleError, ScenarioError};
use crate::fixture::Fixture;
use crate::oracle::{expect_bytes, expect_eq, expect_erased, expect_errno, expect_len, expect_ok};
use crate::provision::Provisioner;
use crate::session::DeviceSession;

/// Signature shared by all scenarios
pub type ScenarioFn = fn(&mut ScenarioContext<'_>) -> Result<(), ScenarioError>;

/// A named, independent check
#[derive(Clone, Copy)]
pub struct Scenario {
    /// Short identifier, used to select scenarios on the command line
    pub name: &'static str,
    /// One-line description
    pub summary: &'static str,
    /// Body
    pub run: ScenarioFn,
}

impl core::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("summary", &self.summary)
            .finish()
    }
}

/// Every scenario, in execution order
pub static CATALOG: &[Scenario] = &[
    Scenario {
        name: "mem_get_info",
        summary: "MEMGETINFO reports the recorded geometry",
        run: mem_get_info,
    },
    Scenario {
        name: "pwrite",
        summary: "Positioned write of one eraseblock reads back unchanged",
        run: pwrite,
    },
    Scenario {
        name: "mem_write",
        summary: "MEMWRITE of two eraseblocks reads back unchanged",
        run: mem_write,
    },
    Scenario {
        name: "read_write_oob",
        summary: "MEMREADOOB/MEMWRITEOOB round trip on an erased page",
        run: read_write_oob,
    },
    Scenario {
        name: "read_write_oob64",
        summary: "MEMREADOOB64/MEMWRITEOOB64 round trip on an erased page",
        run: read_write_oob64,
    },
    Scenario {
        name: "lock",
        summary: "MEMISLOCKED/MEMLOCK/MEMUNLOCK are unsupported",
        run: lock,
    },
    Scenario {
        name: "mem_get_region",
        summary: "MEMGETREGIONCOUNT and MEMGETREGIONINFO on a uniform device",
        run: mem_get_region,
    },
    Scenario {
        name: "mem_erase",
        summary: "MEMERASE and MEMERASE64 erase exactly the requested block",
        run: mem_erase,
    },
    Scenario {
        name: "mem_get_oob_sel",
        summary: "MEMGETOOBSEL reports the recorded legacy layout",
        run: mem_get_oob_sel,
    },
    Scenario {
        name: "mem_bad_block",
        summary: "MEMSETBADBLOCK makes erases over the block fail",
        run: mem_bad_block,
    },
    Scenario {
        name: "ecc",
        summary: "ECCGETLAYOUT and ECCGETSTATS report the recorded values",
        run: ecc,
    },
    Scenario {
        name: "otp",
        summary: "OTP requests fail on a device without OTP",
        run: otp,
    },
    Scenario {
        name: "mtd_file_mode",
        summary: "MTDFILEMODE accepts normal, raw, then normal again",
        run: mtd_file_mode,
    },
];

/// Look up a scenario by name
pub fn find(name: &str) -> Option<&'static Scenario> {
    CATALOG.iter().find(|scenario| scenario.name == name)
}

/// What a scenario gets to work with
pub struct ScenarioContext<'a> {
    /// Pinned expectations
    pub fixture: &'a Fixture,
    /// For scenarios that leave the device in a state only a reload clears
    pub provisioner: &'a mut Provisioner,
    rng: StdRng,
}

impl<'a> ScenarioContext<'a> {
    /// Context whose random payloads are derived from `seed`
    pub fn new(fixture: &'a Fixture, provisioner: &'a mut Provisioner, seed: u64) -> Self {
        Self {
            fixture,
            provisioner,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `len` random bytes
    pub fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.rng.fill_bytes(&mut buf);
        buf
    }

    /// Open a session on the device under test
    ///
    /// Offsets in the scenarios come from the fixture, so a device whose
    /// geometry differs is refused before anything is written to it.
    pub fn open_session(&self) -> Result<DeviceSession, ScenarioError> {
        let session = DeviceSession::open(self.fixture)?;
        expect_geometry(self.fixture, session.geometry())?;
        Ok(session)
    }

    fn erase_size(&self) -> usize {
        self.fixture.erase_size() as usize
    }
}

fn expect_geometry(fixture: &Fixture, got: &MtdInfoUser) -> Result<(), OracleError> {
    expect_eq("geometry at open", &fixture.info, got)
}

/// Erase the whole device and confirm every byte reads back erased
fn erase_whole_device(session: &DeviceSession) -> Result<(), ScenarioError> {
    let size = session.geometry().size;
    expect_ok(
        "MEMERASE whole device",
        session.device().erase(&EraseInfoUser {
            start: 0,
            length: size,
        }),
    )?;
    let contents = session.snapshot()?;
    expect_len("device contents", size as usize, &contents)?;
    expect_erased("device after MEMERASE", &contents)?;
    Ok(())
}

fn mem_get_info(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let got = expect_ok("MEMGETINFO", session.device().info())?;
    expect_eq("MEMGETINFO", &ctx.fixture.info, &got)?;
    let mtd_type = got.mtd_type()?;
    debug!("{} with {} eraseblocks", mtd_type, got.block_count());
    Ok(())
}

fn pwrite(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let block = ctx.erase_size();
    erase_whole_device(&session)?;

    let data = ctx.random_bytes(block);
    expect_ok("pwrite", session.device().write_at(block as u64, &data))?;

    let got = session.read_region(block as u64, block)?;
    expect_bytes("second eraseblock after pwrite", &data, &got)?;

    erase_whole_device(&session)
}

fn mem_write(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let block = ctx.erase_size();
    erase_whole_device(&session)?;

    let data = ctx.random_bytes(block * 2);
    let request = WriteRequest::data((block * 2) as u64, &data);
    expect_ok("MEMWRITE", session.device().write_req(&request))?;

    let got = session.read_region((block * 2) as u64, block * 2)?;
    expect_bytes("third and fourth eraseblocks after MEMWRITE", &data, &got)?;

    erase_whole_device(&session)
}

fn read_write_oob(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let oobsize = ctx.fixture.info.oobsize as usize;
    erase_whole_device(&session)?;

    let mut erased = vec![0u8; oobsize];
    let len = expect_ok("MEMREADOOB", session.device().read_oob(0, &mut erased))?;
    expect_eq("MEMREADOOB length", &(oobsize as u32), &len)?;
    expect_erased("OOB of first page", &erased)?;

    let junk = ctx.random_bytes(oobsize);
    let len = expect_ok("MEMWRITEOOB", session.device().write_oob(0, &junk))?;
    expect_eq("MEMWRITEOOB length", &(oobsize as u32), &len)?;

    let mut readback = vec![0u8; oobsize];
    expect_ok("MEMREADOOB", session.device().read_oob(0, &mut readback))?;
    expect_bytes("OOB read back", &junk, &readback)?;

    erase_whole_device(&session)
}

fn read_write_oob64(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let oobsize = ctx.fixture.info.oobsize as usize;
    erase_whole_device(&session)?;

    let mut erased = vec![0u8; oobsize];
    let len = expect_ok("MEMREADOOB64", session.device().read_oob64(0, &mut erased))?;
    expect_eq("MEMREADOOB64 length", &(oobsize as u32), &len)?;
    expect_erased("OOB of first page", &erased)?;

    let junk = ctx.random_bytes(oobsize);
    let len = expect_ok("MEMWRITEOOB64", session.device().write_oob64(0, &junk))?;
    expect_eq("MEMWRITEOOB64 length", &(oobsize as u32), &len)?;

    let mut readback = vec![0u8; oobsize];
    expect_ok("MEMREADOOB64", session.device().read_oob64(0, &mut readback))?;
    expect_bytes("OOB read back", &junk, &readback)?;

    erase_whole_device(&session)
}

fn lock(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let whole = EraseInfoUser {
        start: 0,
        length: ctx.fixture.device_size(),
    };
    let mtd = session.device();

    expect_errno("MEMISLOCKED", Errno::EOPNOTSUPP, mtd.is_locked(&whole))?;
    // The MTD core answers these two with its internal ENOTSUPP
    expect_errno("MEMLOCK", Errno::ENOTSUPP, mtd.lock(&whole))?;
    expect_errno("MEMUNLOCK", Errno::ENOTSUPP, mtd.unlock(&whole))?;
    Ok(())
}

fn mem_get_region(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let mtd = session.device();

    let count = expect_ok("MEMGETREGIONCOUNT", mtd.region_count())?;
    expect_eq("MEMGETREGIONCOUNT", &ctx.fixture.region_count, &count)?;

    let count = count as u32;
    for index in 0..count {
        let region = expect_ok("MEMGETREGIONINFO", mtd.region_info(index))?;
        debug!(
            "Region {}: {:#x} + {} x {:#x}",
            index, region.offset, region.numblocks, region.erasesize
        );
    }
    // One past the last region, which is index 0 on a uniform device
    expect_errno(
        "MEMGETREGIONINFO past last region",
        Errno::EINVAL,
        mtd.region_info(count),
    )
}

fn mem_erase(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let block = ctx.erase_size();
    let mtd = session.device();
    erase_whole_device(&session)?;

    let data = ctx.random_bytes(block * 3);
    expect_ok("pwrite", mtd.write_at(0, &data))?;
    let got = session.read_region(0, block * 3)?;
    expect_bytes("first three eraseblocks", &data, &got)?;

    expect_ok(
        "MEMERASE first eraseblock",
        mtd.erase(&EraseInfoUser {
            start: 0,
            length: block as u32,
        }),
    )?;
    let got = session.read_region(0, block * 3)?;
    expect_erased("first eraseblock after MEMERASE", &got[..block])?;
    expect_bytes(
        "eraseblocks after the MEMERASE range",
        &data[block..],
        &got[block..],
    )?;

    expect_ok(
        "MEMERASE64 second eraseblock",
        mtd.erase64(&EraseInfoUser64 {
            start: block as u64,
            length: block as u64,
        }),
    )?;
    let got = session.read_region(0, block * 3)?;
    expect_erased("first two eraseblocks after MEMERASE64", &got[..block * 2])?;
    expect_bytes(
        "eraseblock after the MEMERASE64 range",
        &data[block * 2..],
        &got[block * 2..],
    )?;

    erase_whole_device(&session)
}

fn mem_get_oob_sel(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let got = expect_ok("MEMGETOOBSEL", session.device().oob_sel())?;
    expect_eq("MEMGETOOBSEL", &ctx.fixture.oob_sel, &got)?;
    Ok(())
}

fn mem_bad_block(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let mut marked = false;
    let result = corrupt_second_block(&session, ctx.fixture, &mut marked);

    session.close();
    restore_after(ctx.provisioner, marked, result)
}

/// Reload the module if the device was left with a bad-block mark
///
/// The mark lives until the module is reloaded, so this runs whatever the
/// scenario's own result. A failed reload takes precedence over that result.
fn restore_after(
    provisioner: &mut Provisioner,
    marked: bool,
    result: Result<(), ScenarioError>,
) -> Result<(), ScenarioError> {
    if marked {
        provisioner.reprovision()?;
    }
    result
}

fn corrupt_second_block(
    session: &DeviceSession,
    fixture: &Fixture,
    marked: &mut bool,
) -> Result<(), ScenarioError> {
    let mtd = session.device();
    let block = i64::from(fixture.erase_size());

    let bad = expect_ok("MEMGETBADBLOCK", mtd.is_bad_block(block))?;
    debug!("Block at {:#x} bad before marking: {}", block, bad);

    expect_ok("MEMSETBADBLOCK", mtd.mark_bad_block(block))?;
    *marked = true;

    // Querying stays successful after marking; the reported state is not pinned
    let bad = expect_ok("MEMGETBADBLOCK after MEMSETBADBLOCK", mtd.is_bad_block(block))?;
    info!("Block at {:#x} reported bad after marking: {}", block, bad);

    expect_ok(
        "MEMERASE64 of the block after the bad one",
        mtd.erase64(&EraseInfoUser64 {
            start: block as u64 * 2,
            length: block as u64,
        }),
    )?;

    expect_errno(
        "MEMERASE over the bad block",
        Errno::EIO,
        mtd.erase(&EraseInfoUser {
            start: 0,
            length: fixture.device_size(),
        }),
    )
}

fn ecc(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let mtd = session.device();

    let layout = expect_ok("ECCGETLAYOUT", mtd.ecc_layout())?;
    expect_eq("ECCGETLAYOUT", &ctx.fixture.ecc_layout, &layout)?;

    let stats = expect_ok("ECCGETSTATS", mtd.ecc_stats())?;
    expect_eq("ECCGETSTATS", &ctx.fixture.ecc_stats, &stats)?;
    Ok(())
}

fn otp(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let mtd = session.device();

    expect_errno("OTPSELECT", Errno::EOPNOTSUPP, mtd.otp_select(OtpMode::User))?;
    expect_errno("OTPGETREGIONCOUNT", Errno::EINVAL, mtd.otp_region_count())?;
    expect_errno("OTPGETREGIONINFO", Errno::EINVAL, mtd.otp_region_info(1))?;
    expect_errno("OTPLOCK", Errno::EINVAL, mtd.otp_lock(&OtpInfo::default()))?;
    Ok(())
}

fn mtd_file_mode(ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
    let session = ctx.open_session()?;
    let mtd = session.device();

    expect_ok("MTDFILEMODE normal", mtd.set_file_mode(FileMode::Normal))?;
    expect_ok("MTDFILEMODE raw", mtd.set_file_mode(FileMode::Raw))?;
    expect_ok(
        "MTDFILEMODE normal after raw",
        mtd.set_file_mode(FileMode::Normal),
    )?;
    Ok(())
}
