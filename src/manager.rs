//! Cached SCST manager
//!
//! [`Manager`] keeps one [`System`] in memory and applies changes to the live
//! tree through an [`Executor`]. Every change follows the same steps:
//!
//! 1. check preconditions against the cache under the read lock
//! 2. build the `mgmt` command and its audit line (`echo "<cmd>" > <path>`)
//! 3. write the command; on failure the cache is left untouched
//! 4. update the cache under the write lock
//!
//! The live write in step 3 is not covered by any lock. Two callers racing
//! to create the same name can both pass step 1; whichever reaches step 4
//! first commits first. Nothing is rolled back if step 4 finds the entity
//! gone; the caller gets `NotFound` with the audit line of the write that
//! did happen.

use crate::config::Config;
use crate::error::{ResourceKind, ScstError, ScstResult};
use crate::executor::Executor;
use crate::model::{
    take_lun, Device, Driver, Group, Handler, Lun, System, Target, COPY_MANAGER, COPY_MANAGER_TGT,
};
use crate::render::render;
use crate::scanner::Scanner;
use crate::sysfs::{read_luns, Layout};
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Successful change together with the command that made it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audited<T> {
    pub value: T,
    /// Shell equivalent of the command written, for history and logs
    pub audit: String,
}

/// Failed change together with the command that was attempted
#[derive(Debug, Error)]
#[error("{error} [{audit}]")]
pub struct AuditedError {
    #[source]
    pub error: ScstError,
    pub audit: String,
}

/// Result of a manager change
pub type ManagerResult<T> = Result<Audited<T>, AuditedError>;

/// Literal command for a management endpoint
#[derive(Debug)]
struct MgmtCommand {
    path: PathBuf,
    cmd: String,
}

impl MgmtCommand {
    fn new(path: PathBuf, cmd: impl Into<String>) -> Self {
        Self {
            path,
            cmd: cmd.into(),
        }
    }

    fn audit(&self) -> String {
        format!("echo \"{}\" > {}", self.cmd, self.path.display())
    }
}

/// Owns the cached configuration and mutates the live SCST tree
pub struct Manager<E: Executor> {
    config: Config,
    layout: Layout,
    scanner: Scanner,
    executor: E,
    system: RwLock<System>,
}

impl<E: Executor> Manager<E> {
    /// Create a manager from a fresh scan of the live tree
    pub fn new(config: Config, executor: E) -> ScstResult<Self> {
        let scanner = Scanner::new(config.layout());
        let system = scanner.scan()?;
        Ok(Self::with_system(config, executor, system))
    }

    /// Create a manager around an already built system
    pub fn with_system(config: Config, executor: E, system: System) -> Self {
        let layout = config.layout();
        Self {
            scanner: Scanner::new(layout.clone()),
            layout,
            config,
            executor,
            system: RwLock::new(system),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn read(&self) -> RwLockReadGuard<'_, System> {
        self.system.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, System> {
        self.system.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the cache with a fresh scan
    pub fn refresh(&self) -> ScstResult<()> {
        let system = self.scanner.scan()?;
        *self.write() = system;
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Snapshot of the whole cached configuration
    pub fn system(&self) -> System {
        self.read().clone()
    }

    pub fn handlers(&self) -> Vec<Handler> {
        self.read().handlers.values().cloned().collect()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.read()
            .handlers
            .values()
            .flat_map(|h| h.devices.values().cloned())
            .collect()
    }

    pub fn drivers(&self) -> Vec<Driver> {
        self.read().drivers.values().cloned().collect()
    }

    pub fn targets(&self) -> Vec<Target> {
        self.read()
            .drivers
            .values()
            .flat_map(|d| d.targets.values().cloned())
            .collect()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.read()
            .drivers
            .values()
            .flat_map(|d| d.targets.values())
            .flat_map(|t| t.groups.values().cloned())
            .collect()
    }

    /// Luns of the copy-manager target, i.e. every lun the kernel knows of
    pub fn luns(&self) -> Vec<Lun> {
        self.read()
            .copy_manager_target()
            .map(|t| t.luns.clone())
            .unwrap_or_default()
    }

    // ========================================================================
    // Devices
    // ========================================================================

    /// Open a device on a handler, backed by `filename`
    pub fn open_device(&self, handler: &str, name: &str, filename: &str) -> ManagerResult<Device> {
        let command = MgmtCommand::new(
            self.layout.handler_mgmt(handler),
            format!("add_device {} filename={}", name, filename),
        );
        let result = self.try_open_device(&command, handler, name, filename);
        finish(result, &command)
    }

    fn try_open_device(
        &self,
        command: &MgmtCommand,
        handler: &str,
        name: &str,
        filename: &str,
    ) -> ScstResult<Device> {
        {
            let system = self.read();
            let h = lookup_handler(&system, handler)?;
            if h.devices.contains_key(name) {
                return Err(ScstError::already_exists(ResourceKind::Device, name));
            }
        }

        self.apply(command)?;

        let device = Device {
            name: name.to_string(),
            filename: filename.to_string(),
            size: self.scanner.scan_device(handler, name).size,
        };

        let mut system = self.write();
        let h = lookup_handler_mut(&mut system, handler)?;
        h.devices.insert(name.to_string(), device.clone());
        Ok(device)
    }

    /// Close a device of a handler
    pub fn close_device(&self, handler: &str, name: &str) -> ManagerResult<Device> {
        let command = MgmtCommand::new(
            self.layout.handler_mgmt(handler),
            format!("del_device {}", name),
        );
        let result = self.try_close_device(&command, handler, name);
        finish(result, &command)
    }

    fn try_close_device(&self, command: &MgmtCommand, handler: &str, name: &str) -> ScstResult<Device> {
        {
            let system = self.read();
            let h = lookup_handler(&system, handler)?;
            if !h.devices.contains_key(name) {
                return Err(ScstError::not_found(ResourceKind::Device, name));
            }
        }

        self.apply(command)?;

        let mut system = self.write();
        lookup_handler_mut(&mut system, handler)?
            .devices
            .remove(name)
            .ok_or_else(|| ScstError::not_found(ResourceKind::Device, name))
    }

    // ========================================================================
    // Targets
    // ========================================================================

    /// Add a target to a driver
    pub fn create_target(&self, driver: &str, name: &str) -> ManagerResult<Target> {
        let command = MgmtCommand::new(
            self.layout.driver_mgmt(driver),
            format!("add_target {}", name),
        );
        let result = self.try_create_target(&command, driver, name);
        finish(result, &command)
    }

    fn try_create_target(&self, command: &MgmtCommand, driver: &str, name: &str) -> ScstResult<Target> {
        {
            let system = self.read();
            if lookup_driver(&system, driver)?.targets.contains_key(name) {
                return Err(ScstError::already_exists(ResourceKind::Target, name));
            }
        }

        self.apply(command)?;

        let target = Target::new(name);
        let mut system = self.write();
        lookup_driver_mut(&mut system, driver)?
            .targets
            .insert(name.to_string(), target.clone());
        Ok(target)
    }

    /// Remove a target from a driver
    pub fn delete_target(&self, driver: &str, name: &str) -> ManagerResult<Target> {
        let command = MgmtCommand::new(
            self.layout.driver_mgmt(driver),
            format!("del_target {}", name),
        );
        let result = self.try_delete_target(&command, driver, name);
        finish(result, &command)
    }

    fn try_delete_target(&self, command: &MgmtCommand, driver: &str, name: &str) -> ScstResult<Target> {
        {
            let system = self.read();
            lookup_target(&system, driver, name)?;
        }

        self.apply(command)?;

        let mut system = self.write();
        lookup_driver_mut(&mut system, driver)?
            .targets
            .remove(name)
            .ok_or_else(|| ScstError::not_found(ResourceKind::Target, name))
    }

    /// Enable a target
    ///
    /// The first enable makes the kernel assign a relative target id; it is
    /// read back once and kept from then on.
    pub fn enable_target(&self, driver: &str, name: &str) -> ManagerResult<Target> {
        let command = MgmtCommand::new(self.layout.target_enabled(driver, name), "1");
        let result = self.try_enable_target(&command, driver, name);
        finish(result, &command)
    }

    fn try_enable_target(&self, command: &MgmtCommand, driver: &str, name: &str) -> ScstResult<Target> {
        let needs_id = {
            let system = self.read();
            lookup_target(&system, driver, name)?.id == 0
        };

        self.apply(command)?;

        let id = if needs_id {
            self.scanner.rel_tgt_id(driver, name)
        } else {
            0
        };

        let mut system = self.write();
        let target = lookup_target_mut(&mut system, driver, name)?;
        if target.id == 0 {
            target.id = id;
        }
        target.enabled = true;
        Ok(target.clone())
    }

    /// Disable a target, keeping its relative target id
    pub fn disable_target(&self, driver: &str, name: &str) -> ManagerResult<Target> {
        let command = MgmtCommand::new(self.layout.target_enabled(driver, name), "0");
        let result = self.try_disable_target(&command, driver, name);
        finish(result, &command)
    }

    fn try_disable_target(&self, command: &MgmtCommand, driver: &str, name: &str) -> ScstResult<Target> {
        {
            let system = self.read();
            lookup_target(&system, driver, name)?;
        }

        self.apply(command)?;

        let mut system = self.write();
        let target = lookup_target_mut(&mut system, driver, name)?;
        target.enabled = false;
        Ok(target.clone())
    }

    // ========================================================================
    // Groups
    // ========================================================================

    /// Create an initiator group on a target
    pub fn create_group(&self, driver: &str, target: &str, name: &str) -> ManagerResult<Group> {
        let command = MgmtCommand::new(
            self.layout.ini_groups_mgmt(driver, target),
            format!("create {}", name),
        );
        let result = self.try_create_group(&command, driver, target, name);
        finish(result, &command)
    }

    fn try_create_group(
        &self,
        command: &MgmtCommand,
        driver: &str,
        target: &str,
        name: &str,
    ) -> ScstResult<Group> {
        {
            let system = self.read();
            if lookup_target(&system, driver, target)?.groups.contains_key(name) {
                return Err(ScstError::already_exists(ResourceKind::Group, name));
            }
        }

        self.apply(command)?;

        let group = Group::new(name);
        let mut system = self.write();
        lookup_target_mut(&mut system, driver, target)?
            .groups
            .insert(name.to_string(), group.clone());
        Ok(group)
    }

    /// Delete an initiator group from a target
    pub fn delete_group(&self, driver: &str, target: &str, name: &str) -> ManagerResult<Group> {
        let command = MgmtCommand::new(
            self.layout.ini_groups_mgmt(driver, target),
            format!("del {}", name),
        );
        let result = self.try_delete_group(&command, driver, target, name);
        finish(result, &command)
    }

    fn try_delete_group(
        &self,
        command: &MgmtCommand,
        driver: &str,
        target: &str,
        name: &str,
    ) -> ScstResult<Group> {
        {
            let system = self.read();
            lookup_group(&system, driver, target, name)?;
        }

        self.apply(command)?;

        let mut system = self.write();
        lookup_target_mut(&mut system, driver, target)?
            .groups
            .remove(name)
            .ok_or_else(|| ScstError::not_found(ResourceKind::Group, name))
    }

    // ========================================================================
    // Luns
    // ========================================================================

    /// Map `device` as lun `id` on a target, or on one of its groups
    ///
    /// The device may belong to any handler.
    pub fn create_lun(
        &self,
        driver: &str,
        target: &str,
        group: Option<&str>,
        device: &str,
        id: u64,
    ) -> ManagerResult<Lun> {
        let command = MgmtCommand::new(
            self.layout.luns_mgmt(driver, target, group),
            format!("add {} {}", device, id),
        );
        let result = self.try_create_lun(&command, driver, target, group, device, id);
        finish(result, &command)
    }

    fn try_create_lun(
        &self,
        command: &MgmtCommand,
        driver: &str,
        target: &str,
        group: Option<&str>,
        device: &str,
        id: u64,
    ) -> ScstResult<Lun> {
        {
            let system = self.read();
            let t = lookup_target(&system, driver, target)?;
            if system.find_device(device).is_none() {
                return Err(ScstError::not_found(ResourceKind::Device, device));
            }
            let luns = match group {
                Some(g) => &lookup_group_in(t, g)?.luns,
                None => &t.luns,
            };
            if luns.iter().any(|l| l.id == id) {
                return Err(ScstError::already_exists(ResourceKind::Lun, id.to_string()));
            }
        }

        self.apply(command)?;

        let lun = Lun::new(id, device);
        {
            let mut system = self.write();
            let t = lookup_target_mut(&mut system, driver, target)?;
            match group {
                Some(g) => lookup_group_in_mut(t, g)?.luns.push(lun.clone()),
                None => t.luns.push(lun.clone()),
            }
        }

        self.reload_copy_manager();
        Ok(lun)
    }

    /// Unmap lun `id` from a target, or from one of its groups
    pub fn delete_lun(
        &self,
        driver: &str,
        target: &str,
        group: Option<&str>,
        id: u64,
    ) -> ManagerResult<Lun> {
        let command = MgmtCommand::new(
            self.layout.luns_mgmt(driver, target, group),
            format!("del {}", id),
        );
        let result = self.try_delete_lun(&command, driver, target, group, id);
        finish(result, &command)
    }

    fn try_delete_lun(
        &self,
        command: &MgmtCommand,
        driver: &str,
        target: &str,
        group: Option<&str>,
        id: u64,
    ) -> ScstResult<Lun> {
        {
            let system = self.read();
            let t = lookup_target(&system, driver, target)?;
            let luns = match group {
                Some(g) => &lookup_group_in(t, g)?.luns,
                None => &t.luns,
            };
            if !luns.iter().any(|l| l.id == id) {
                return Err(ScstError::not_found(ResourceKind::Lun, id.to_string()));
            }
        }

        self.apply(command)?;

        let removed = {
            let mut system = self.write();
            let t = lookup_target_mut(&mut system, driver, target)?;
            let luns = match group {
                Some(g) => &mut lookup_group_in_mut(t, g)?.luns,
                None => &mut t.luns,
            };
            take_lun(luns, id)
        };

        self.reload_copy_manager();
        removed.ok_or_else(|| ScstError::not_found(ResourceKind::Lun, id.to_string()))
    }

    /// Rebuild the copy-manager lun list from the live tree
    ///
    /// The kernel adds every mapped device to `copy_manager_tgt` on its own,
    /// so its luns are mirrored rather than tracked.
    fn reload_copy_manager(&self) {
        if self.read().copy_manager_target().is_none() {
            return;
        }

        let luns = read_luns(self.layout.luns(COPY_MANAGER, COPY_MANAGER_TGT, None));

        let mut system = self.write();
        if let Some(target) = system.copy_manager_target_mut() {
            log::debug!("Reloaded {} copy manager luns", luns.len());
            target.luns = luns;
        }
    }

    // ========================================================================
    // Initiators
    // ========================================================================

    /// Allow an initiator into a group
    pub fn add_initiator(
        &self,
        driver: &str,
        target: &str,
        group: &str,
        initiator: &str,
    ) -> ManagerResult<String> {
        let command = MgmtCommand::new(
            self.layout.initiators_mgmt(driver, target, group),
            format!("add {}", initiator),
        );
        let result = self.try_add_initiator(&command, driver, target, group, initiator);
        finish(result, &command)
    }

    fn try_add_initiator(
        &self,
        command: &MgmtCommand,
        driver: &str,
        target: &str,
        group: &str,
        initiator: &str,
    ) -> ScstResult<String> {
        {
            let system = self.read();
            let g = lookup_group(&system, driver, target, group)?;
            if g.initiators.iter().any(|i| i == initiator) {
                return Err(ScstError::already_exists(ResourceKind::Initiator, initiator));
            }
        }

        self.apply(command)?;

        let mut system = self.write();
        lookup_group_mut(&mut system, driver, target, group)?
            .initiators
            .push(initiator.to_string());
        Ok(initiator.to_string())
    }

    /// Remove an initiator from a group
    pub fn del_initiator(
        &self,
        driver: &str,
        target: &str,
        group: &str,
        initiator: &str,
    ) -> ManagerResult<String> {
        let command = MgmtCommand::new(
            self.layout.initiators_mgmt(driver, target, group),
            format!("del {}", initiator),
        );
        let result = self.try_del_initiator(&command, driver, target, group, initiator);
        finish(result, &command)
    }

    fn try_del_initiator(
        &self,
        command: &MgmtCommand,
        driver: &str,
        target: &str,
        group: &str,
        initiator: &str,
    ) -> ScstResult<String> {
        {
            let system = self.read();
            let g = lookup_group(&system, driver, target, group)?;
            if !g.initiators.iter().any(|i| i == initiator) {
                return Err(ScstError::not_found(ResourceKind::Initiator, initiator));
            }
        }

        self.apply(command)?;

        let mut system = self.write();
        let g = lookup_group_mut(&mut system, driver, target, group)?;
        g.initiators.retain(|i| i != initiator);
        Ok(initiator.to_string())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Render the cached configuration to the configured file
    pub fn save_to_cfg(&self) -> ScstResult<PathBuf> {
        let text = render(&self.read())?;
        let path = self.config.config_file.clone();
        self.executor
            .write(&path, text.as_bytes())
            .map_err(|source| ScstError::CommandFailed {
                command: format!("write config {}", path.display()),
                source,
            })?;
        log::info!("Saved SCST configuration to {}", path.display());
        Ok(path)
    }

    fn apply(&self, command: &MgmtCommand) -> ScstResult<()> {
        self.executor
            .write(&command.path, command.cmd.as_bytes())
            .map_err(|source| ScstError::CommandFailed {
                command: command.audit(),
                source,
            })
    }
}

fn finish<T>(result: ScstResult<T>, command: &MgmtCommand) -> ManagerResult<T> {
    let audit = command.audit();
    match result {
        Ok(value) => {
            log::info!("{}", audit);
            Ok(Audited { value, audit })
        }
        Err(error) => {
            log::warn!("{}: {}", audit, error);
            Err(AuditedError { error, audit })
        }
    }
}

fn lookup_handler<'a>(system: &'a System, name: &str) -> ScstResult<&'a Handler> {
    system
        .handlers
        .get(name)
        .ok_or_else(|| ScstError::not_found(ResourceKind::Handler, name))
}

fn lookup_handler_mut<'a>(system: &'a mut System, name: &str) -> ScstResult<&'a mut Handler> {
    system
        .handlers
        .get_mut(name)
        .ok_or_else(|| ScstError::not_found(ResourceKind::Handler, name))
}

fn lookup_driver<'a>(system: &'a System, name: &str) -> ScstResult<&'a Driver> {
    system
        .driver(name)
        .ok_or_else(|| ScstError::not_found(ResourceKind::Driver, name))
}

fn lookup_driver_mut<'a>(system: &'a mut System, name: &str) -> ScstResult<&'a mut Driver> {
    system
        .driver_mut(name)
        .ok_or_else(|| ScstError::not_found(ResourceKind::Driver, name))
}

fn lookup_target<'a>(system: &'a System, driver: &str, name: &str) -> ScstResult<&'a Target> {
    lookup_driver(system, driver)?
        .target(name)
        .ok_or_else(|| ScstError::not_found(ResourceKind::Target, name))
}

fn lookup_target_mut<'a>(
    system: &'a mut System,
    driver: &str,
    name: &str,
) -> ScstResult<&'a mut Target> {
    lookup_driver_mut(system, driver)?
        .target_mut(name)
        .ok_or_else(|| ScstError::not_found(ResourceKind::Target, name))
}

fn lookup_group_in<'a>(target: &'a Target, name: &str) -> ScstResult<&'a Group> {
    target
        .group(name)
        .ok_or_else(|| ScstError::not_found(ResourceKind::Group, name))
}

fn lookup_group_in_mut<'a>(target: &'a mut Target, name: &str) -> ScstResult<&'a mut Group> {
    target
        .group_mut(name)
        .ok_or_else(|| ScstError::not_found(ResourceKind::Group, name))
}

fn lookup_group<'a>(
    system: &'a System,
    driver: &str,
    target: &str,
    name: &str,
) -> ScstResult<&'a Group> {
    lookup_group_in(lookup_target(system, driver, target)?, name)
}

fn lookup_group_mut<'a>(
    system: &'a mut System,
    driver: &str,
    target: &str,
    name: &str,
) -> ScstResult<&'a mut Group> {
    lookup_group_in_mut(lookup_target_mut(system, driver, target)?, name)
}
