//! Print the live SCST configuration in `scst.conf` format
//!
//! Usage: `cargo run --example dump_config [-- <settings.toml>]`
//!
//! The optional TOML file overrides the sysfs root, e.g. to read a copy of
//! `/sys/kernel/scst_tgt` taken from another machine.

use scst_config::{render, Config, Scanner};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let system = Scanner::new(config.layout()).scan()?;
    eprintln!(
        "SCST {}: {} handlers, {} drivers",
        system.version,
        system.handlers.len(),
        system.drivers.len()
    );
    print!("{}", render(&system)?);
    Ok(())
}
