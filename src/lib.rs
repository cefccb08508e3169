//! SCST target configuration in Rust
//!
//! This library models the configuration of the SCST kernel SCSI target
//! (handlers, devices, target drivers, targets, initiator groups, luns and
//! initiators). It can parse and write `scst.conf`, rebuild the same model
//! from the live `/sys/kernel/scst_tgt` tree, and apply changes to the live
//! tree while keeping a cached copy consistent.
//!
//! # Example
//!
//! ```no_run
//! use scst_config::{Config, Manager, SysfsExecutor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let manager = Manager::new(config, SysfsExecutor)?;
//!
//! let target = manager.create_target("iscsi", "iqn.2024-01.example:t1")?;
//! println!("{}", target.audit);
//!
//! manager.create_lun("iscsi", "iqn.2024-01.example:t1", None, "disk1", 0)?;
//! manager.enable_target("iscsi", "iqn.2024-01.example:t1")?;
//! manager.save_to_cfg()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod manager;
pub mod model;
pub mod parser;
pub mod render;
pub mod scanner;
pub mod storage;
pub mod sysfs;

pub use config::Config;
pub use error::{ResourceKind, ScstError, ScstResult};
pub use executor::{Executor, SysfsExecutor};
pub use manager::{Audited, AuditedError, Manager, ManagerResult};
pub use model::{Device, Driver, Group, Handler, Lun, System, Target};
pub use parser::{parse, parse_file};
pub use render::render;
pub use scanner::Scanner;
pub use storage::{Inventory, Pool, Snapshot, Volume};

/// Version of this library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
