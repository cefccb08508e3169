//! SCST resource model
//!
//! The in-memory picture of an SCST configuration, as produced by the
//! configuration parser or the kernel scanner:
//!
//! ```text
//! System
//! ├── Handler (vdisk_blockio)
//! │   └── Device (disk1: filename, size)
//! └── Driver (copy_manager, iscsi)
//!     └── Target (iqn...: enabled, rel_tgt_id)
//!         ├── Lun (direct)
//!         └── Group
//!             ├── Lun
//!             └── Initiator
//! ```
//!
//! Names are unique within their parent, so name-keyed children live in
//! `BTreeMap`s. Luns and initiators keep their order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the housekeeping copy-manager target driver
pub const COPY_MANAGER: &str = "copy_manager";

/// Name of the single target owned by the copy-manager driver
pub const COPY_MANAGER_TGT: &str = "copy_manager_tgt";

/// Whole SCST configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    /// SCST version string (informational)
    pub version: String,
    /// Storage handlers by name
    pub handlers: BTreeMap<String, Handler>,
    /// Target drivers by name
    pub drivers: BTreeMap<String, Driver>,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver(&self, name: &str) -> Option<&Driver> {
        self.drivers.get(name)
    }

    pub fn driver_mut(&mut self, name: &str) -> Option<&mut Driver> {
        self.drivers.get_mut(name)
    }

    /// Find a device by name in any handler
    pub fn find_device(&self, name: &str) -> Option<&Device> {
        self.handlers.values().find_map(|h| h.devices.get(name))
    }

    /// The copy-manager target, if the copy-manager driver is loaded
    pub fn copy_manager_target(&self) -> Option<&Target> {
        self.drivers
            .get(COPY_MANAGER)
            .and_then(|d| d.targets.get(COPY_MANAGER_TGT))
    }

    pub fn copy_manager_target_mut(&mut self) -> Option<&mut Target> {
        self.drivers
            .get_mut(COPY_MANAGER)
            .and_then(|d| d.targets.get_mut(COPY_MANAGER_TGT))
    }
}

/// SCST device handler, e.g. `vdisk_blockio`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handler {
    pub name: String,
    pub devices: BTreeMap<String, Device>,
}

impl Handler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            devices: BTreeMap::new(),
        }
    }
}

/// Virtual device exported through a handler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    /// Backing block device or file
    pub filename: String,
    /// Size in bytes as reported by the kernel
    pub size: u64,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Target driver, e.g. `iscsi` or `copy_manager`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub name: String,
    pub enabled: bool,
    pub targets: BTreeMap<String, Target>,
}

impl Driver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: false,
            targets: BTreeMap::new(),
        }
    }

    pub fn is_copy_manager(&self) -> bool {
        self.name == COPY_MANAGER
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    pub fn target_mut(&mut self, name: &str) -> Option<&mut Target> {
        self.targets.get_mut(name)
    }
}

/// SCSI target endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Target name, an IQN for iSCSI
    pub name: String,
    pub enabled: bool,
    /// Relative target id, 0 until the target is first enabled
    pub id: u64,
    pub groups: BTreeMap<String, Group>,
    /// Luns visible to every initiator not matched by a group
    pub luns: Vec<Lun>,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
        self.groups.get_mut(name)
    }
}

/// Initiator access group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub luns: Vec<Lun>,
    /// Initiator names, IQNs for iSCSI
    pub initiators: Vec<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Logical unit mapping a lun number to a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lun {
    pub id: u64,
    /// Device name, resolved across all handlers
    pub device: String,
}

impl Lun {
    pub fn new(id: u64, device: impl Into<String>) -> Self {
        Self {
            id,
            device: device.into(),
        }
    }
}

/// Remove the lun with `id`, returning it
pub(crate) fn take_lun(luns: &mut Vec<Lun>, id: u64) -> Option<Lun> {
    let pos = luns.iter().position(|l| l.id == id)?;
    Some(luns.remove(pos))
}
