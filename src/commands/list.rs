//! List command implementation

use mtdabi_conformance::CATALOG;

/// List all scenarios in execution order
pub fn list_scenarios() {
    println!("Scenarios:");
    println!();

    let width = CATALOG.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for scenario in CATALOG {
        println!("  {:<width$}  {}", scenario.name, scenario.summary, width = width);
    }
}
