//! Single steps of a run

use mtdabi_conformance::{env, Fixture, Modprobe, Provisioner};

/// Check the host against the fixture
pub fn check_env(fixture: &Fixture) -> Result<(), Box<dyn std::error::Error>> {
    env::check(fixture)?;
    println!("Host matches fixture (kernel {})", fixture.kernel_release);
    Ok(())
}

/// Bring the simulated device up and leave it loaded
pub fn provision(fixture: &Fixture, modprobe: Modprobe) -> Result<(), Box<dyn std::error::Error>> {
    env::check(fixture)?;
    let mut provisioner = Provisioner::new(fixture, Box::new(modprobe));
    provisioner.setup()?;
    println!(
        "{} loaded, {} is ready",
        fixture.module.name,
        fixture.device.display()
    );
    Ok(())
}

/// Unload the simulated device
pub fn teardown(fixture: &Fixture, modprobe: Modprobe) -> Result<(), Box<dyn std::error::Error>> {
    let mut provisioner = Provisioner::new(fixture, Box::new(modprobe));
    provisioner.teardown()?;
    println!("{} unloaded", fixture.module.name);
    Ok(())
}
