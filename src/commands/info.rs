//! Info command implementation
//!
//! Dumps what a device reports through the read-only requests, marking each
//! descriptor that differs from the fixture. Requests the device rejects are
//! shown with their errno instead of aborting the dump.

use mtdabi_conformance::Fixture;
use mtdabi_ioctl::{MtdConfig, MtdDevice, MtdError, MtdInfoUser};
use std::fmt::Debug;
use std::path::Path;

/// Print everything `device` reports
pub fn show_info(device: &Path, fixture: &Fixture) -> Result<(), Box<dyn std::error::Error>> {
    let mtd = MtdDevice::open(&MtdConfig::new(device))?;
    let info = mtd.info()?;

    println!("MTD Device Information");
    println!("======================");
    println!();
    print_geometry(device, &info);
    println!("Fixture:         {}", verdict(&fixture.info, &info));
    println!();

    match mtd.region_count() {
        Ok(0) => println!("Erase regions:   none (uniform)"),
        Ok(count) => {
            println!("Erase regions:   {}", count);
            for index in 0..count as u32 {
                match mtd.region_info(index) {
                    Ok(region) => println!(
                        "  [{}] offset {:#010x}, {} x {:#x} bytes",
                        index, region.offset, region.numblocks, region.erasesize
                    ),
                    Err(e) => println!("  [{}] {}", index, e),
                }
            }
        }
        Err(e) => println!("Erase regions:   {}", e),
    }

    show_descriptor("OOB selection", mtd.oob_sel(), &fixture.oob_sel);
    show_descriptor("ECC layout", mtd.ecc_layout(), &fixture.ecc_layout);
    show_descriptor("ECC stats", mtd.ecc_stats(), &fixture.ecc_stats);

    let blocks = info.block_count();
    let mut bad = Vec::new();
    for block in 0..blocks {
        let offset = i64::from(block) * i64::from(info.erasesize);
        if mtd.is_bad_block(offset)? {
            bad.push(offset);
        }
    }
    println!();
    if bad.is_empty() {
        println!("Bad blocks:      none of {}", blocks);
    } else {
        println!("Bad blocks:      {} of {}", bad.len(), blocks);
        for offset in bad {
            println!("  {:#010x}", offset);
        }
    }

    Ok(())
}

fn print_geometry(device: &Path, info: &MtdInfoUser) {
    println!("Device:          {}", device.display());
    match info.mtd_type() {
        Ok(mtd_type) => println!("Type:            {}", mtd_type),
        Err(e) => println!("Type:            {}", e),
    }
    println!("Flags:           {:?}", info.mtd_flags());
    println!(
        "Size:            {} bytes ({} KiB / {} MiB)",
        info.size,
        info.size / 1024,
        info.size / (1024 * 1024)
    );
    println!(
        "Erase size:      {} bytes ({} blocks)",
        info.erasesize,
        info.block_count()
    );
    println!("Write size:      {} bytes", info.writesize);
    println!("OOB size:        {} bytes", info.oobsize);
}

fn show_descriptor<T: PartialEq + Debug>(label: &str, got: Result<T, MtdError>, want: &T) {
    println!();
    match got {
        Ok(value) => {
            println!("{} ({}):", label, verdict(want, &value));
            println!("{:#x?}", value);
        }
        Err(e) => println!("{}: {}", label, e),
    }
}

fn verdict<T: PartialEq>(want: &T, got: &T) -> &'static str {
    if want == got {
        "matches"
    } else {
        "DIFFERS"
    }
}
