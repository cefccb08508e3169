//! Live SCST scanner
//!
//! Rebuilds a [`System`] from the sysfs tree. The result has the same shape
//! as the parser output for an equivalent configuration file.

use crate::error::{ScstError, ScstResult};
use crate::model::{Device, Driver, Group, Handler, System, Target};
use crate::sysfs::{read_dirs, read_files, read_flag, read_header, read_luns, read_number, Layout, MGMT};

/// Reads the live SCST configuration
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    layout: Layout,
}

impl Scanner {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Scan the whole tree
    ///
    /// Only a missing root is an error; unreadable attributes come back as
    /// empty strings and zeros.
    pub fn scan(&self) -> ScstResult<System> {
        let root = self.layout.root();
        if !root.is_dir() {
            return Err(ScstError::SubsystemAbsent(root.to_path_buf()));
        }

        let mut system = System::new();
        system.version = read_header(self.layout.version());

        for name in read_dirs(self.layout.handlers(), &[]) {
            let handler = self.scan_handler(&name);
            system.handlers.insert(name, handler);
        }

        for name in read_dirs(self.layout.targets(), &[]) {
            let driver = self.scan_driver(&name);
            system.drivers.insert(name, driver);
        }

        log::debug!(
            "Scanned SCST {} at {}: {} handlers, {} drivers",
            system.version,
            root.display(),
            system.handlers.len(),
            system.drivers.len()
        );
        Ok(system)
    }

    fn scan_handler(&self, name: &str) -> Handler {
        let mut handler = Handler::new(name);
        for dev in read_dirs(self.layout.handler(name), &[]) {
            let device = self.scan_device(name, &dev);
            handler.devices.insert(dev, device);
        }
        handler
    }

    /// Read one device of a handler
    pub fn scan_device(&self, handler: &str, name: &str) -> Device {
        let dir = self.layout.device(handler, name);
        Device {
            name: name.to_string(),
            filename: read_header(dir.join("filename")),
            size: read_number(dir.join("size")),
        }
    }

    fn scan_driver(&self, name: &str) -> Driver {
        let mut driver = Driver::new(name);
        driver.enabled = read_flag(self.layout.driver(name).join("enabled"));
        for tgt in read_dirs(self.layout.driver(name), &[]) {
            let target = self.scan_target(name, &tgt);
            driver.targets.insert(tgt, target);
        }
        driver
    }

    fn scan_target(&self, driver: &str, name: &str) -> Target {
        let mut target = Target::new(name);
        target.luns = read_luns(self.layout.luns(driver, name, None));

        for g in read_dirs(self.layout.ini_groups(driver, name), &[]) {
            let group = Group {
                name: g.clone(),
                luns: read_luns(self.layout.luns(driver, name, Some(&g))),
                initiators: read_files(self.layout.initiators(driver, name, &g), &[MGMT]),
            };
            target.groups.insert(g, group);
        }

        target.id = self.rel_tgt_id(driver, name);
        target.enabled = read_flag(self.layout.target_enabled(driver, name));
        target
    }

    /// Kernel-assigned relative target id, 0 if not yet assigned
    pub fn rel_tgt_id(&self, driver: &str, target: &str) -> u64 {
        read_number(self.layout.rel_tgt_id(driver, target))
    }
}
