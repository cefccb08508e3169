//! Export a block device over iSCSI
//!
//! Usage:
//! `cargo run --example export_target -- <device-path> <target-iqn> [initiator-iqn]`
//!
//! Opens the device on the `vdisk_blockio` handler, creates the target with
//! one lun, optionally restricts it to a single initiator, enables it and
//! saves `/etc/scst.conf`. Every command written is printed.

use scst_config::{Config, Manager, SysfsExecutor};
use std::path::Path;

const HANDLER: &str = "vdisk_blockio";
const DRIVER: &str = "iscsi";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        let program = args.first().map(String::as_str).unwrap_or("export_target");
        eprintln!("Usage: {} <device-path> <target-iqn> [initiator-iqn]", program);
        std::process::exit(1);
    }
    let filename = &args[1];
    let iqn = &args[2];
    let initiator = args.get(3);

    let device = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or("device path has no file name")?
        .replace('.', "_");

    let manager = Manager::new(Config::default(), SysfsExecutor)?;

    if manager.devices().iter().all(|d| d.name != device) {
        println!("{}", manager.open_device(HANDLER, &device, filename)?.audit);
    }
    println!("{}", manager.create_target(DRIVER, iqn)?.audit);

    match initiator {
        Some(initiator) => {
            println!("{}", manager.create_group(DRIVER, iqn, "allowed")?.audit);
            println!(
                "{}",
                manager.create_lun(DRIVER, iqn, Some("allowed"), &device, 0)?.audit
            );
            println!(
                "{}",
                manager.add_initiator(DRIVER, iqn, "allowed", initiator)?.audit
            );
        }
        None => {
            println!("{}", manager.create_lun(DRIVER, iqn, None, &device, 0)?.audit);
        }
    }

    let enabled = manager.enable_target(DRIVER, iqn)?;
    println!("{}", enabled.audit);
    println!("Target {} enabled, rel_tgt_id {}", iqn, enabled.value.id);

    let saved = manager.save_to_cfg()?;
    println!("Saved {}", saved.display());
    Ok(())
}
