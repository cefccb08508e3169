//! Fake SCST sysfs tree shared by the integration tests
//!
//! `FakeScst` lays out a live tree inside a temporary directory and doubles
//! as an [`Executor`] that interprets `mgmt` commands the way the kernel
//! would, so a manager can be driven against it and rescanned afterwards.

#![allow(dead_code)]

use scst_config::model::{COPY_MANAGER, COPY_MANAGER_TGT};
use scst_config::{Config, Executor};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct FakeScst {
    dir: TempDir,
    writes: Mutex<Vec<(PathBuf, String)>>,
    commands: Mutex<Vec<String>>,
    outputs: Mutex<Vec<(String, String)>>,
    fail_writes: bool,
}

impl FakeScst {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("scst_tgt");
        fs::create_dir_all(root.join("handlers")).unwrap();
        fs::create_dir_all(root.join("targets")).unwrap();
        fs::write(root.join("version"), "3.7.0\n").unwrap();
        Self {
            dir,
            writes: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
            fail_writes: false,
        }
    }

    /// Same tree, but every write is refused
    pub fn failing(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("scst_tgt")
    }

    pub fn config(&self) -> Config {
        Config::default()
            .root(self.root())
            .config_file(self.dir.path().join("scst.conf"))
    }

    pub fn saved_config(&self) -> String {
        fs::read_to_string(self.dir.path().join("scst.conf")).unwrap()
    }

    /// Every write issued so far, as `(path, data)`
    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        self.writes.lock().unwrap().clone()
    }

    /// Every command run so far
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Canned stdout for a command
    pub fn output(&self, command: &str, stdout: &str) {
        self.outputs
            .lock()
            .unwrap()
            .push((command.to_string(), stdout.to_string()));
    }

    // ------------------------------------------------------------------------
    // Tree builders
    // ------------------------------------------------------------------------

    pub fn handler(&self, handler: &str) -> &Self {
        let dir = self.root().join("handlers").join(handler);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("mgmt"), "").unwrap();
        self
    }

    pub fn device(&self, handler: &str, name: &str, filename: &str, size: u64) -> &Self {
        self.handler(handler);
        let dir = self.root().join("handlers").join(handler).join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("filename"), format!("{}\n[key]\n", filename)).unwrap();
        fs::write(dir.join("size"), format!("{}\n", size)).unwrap();
        self
    }

    pub fn driver(&self, driver: &str, enabled: bool) -> &Self {
        let dir = self.root().join("targets").join(driver);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("mgmt"), "").unwrap();
        fs::write(dir.join("enabled"), flag(enabled)).unwrap();
        self
    }

    pub fn target(&self, driver: &str, target: &str, enabled: bool, id: u64) -> &Self {
        let dir = self.root().join("targets").join(driver).join(target);
        fs::create_dir_all(dir.join("luns")).unwrap();
        fs::create_dir_all(dir.join("ini_groups")).unwrap();
        fs::write(dir.join("luns").join("mgmt"), "").unwrap();
        fs::write(dir.join("ini_groups").join("mgmt"), "").unwrap();
        fs::write(dir.join("enabled"), flag(enabled)).unwrap();
        fs::write(dir.join("rel_tgt_id"), format!("{}\n", id)).unwrap();
        self
    }

    pub fn copy_manager(&self) -> &Self {
        self.driver(COPY_MANAGER, false);
        self.target(COPY_MANAGER, COPY_MANAGER_TGT, false, 0)
    }

    pub fn group(&self, driver: &str, target: &str, group: &str) -> &Self {
        let dir = self.group_dir(driver, target, group);
        fs::create_dir_all(dir.join("luns")).unwrap();
        fs::create_dir_all(dir.join("initiators")).unwrap();
        fs::write(dir.join("luns").join("mgmt"), "").unwrap();
        fs::write(dir.join("initiators").join("mgmt"), "").unwrap();
        self
    }

    pub fn lun(&self, driver: &str, target: &str, group: Option<&str>, id: u64, device: &str) -> &Self {
        let luns = match group {
            Some(g) => self.group_dir(driver, target, g).join("luns"),
            None => self.root().join("targets").join(driver).join(target).join("luns"),
        };
        self.map_lun(&luns, id, device).unwrap();
        self
    }

    pub fn initiator(&self, driver: &str, target: &str, group: &str, initiator: &str) -> &Self {
        let dir = self.group_dir(driver, target, group).join("initiators");
        fs::write(dir.join(initiator), "").unwrap();
        self
    }

    fn group_dir(&self, driver: &str, target: &str, group: &str) -> PathBuf {
        self.root()
            .join("targets")
            .join(driver)
            .join(target)
            .join("ini_groups")
            .join(group)
    }

    fn copy_manager_luns(&self) -> PathBuf {
        self.root()
            .join("targets")
            .join(COPY_MANAGER)
            .join(COPY_MANAGER_TGT)
            .join("luns")
    }

    fn device_dir(&self, device: &str) -> io::Result<PathBuf> {
        for entry in fs::read_dir(self.root().join("handlers"))? {
            let candidate = entry?.path().join(device);
            if candidate.is_dir() {
                return Ok(candidate);
            }
        }
        Err(io::Error::new(io::ErrorKind::NotFound, device.to_string()))
    }

    fn map_lun(&self, luns: &Path, id: u64, device: &str) -> io::Result<()> {
        let target = self.device_dir(device)?;
        let dir = luns.join(id.to_string());
        fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, dir.join("device"))?;
        Ok(())
    }

    /// The copy manager maps every device that gets mapped anywhere
    fn mirror_add(&self, device: &str) -> io::Result<()> {
        let luns = self.copy_manager_luns();
        if !luns.is_dir() {
            return Ok(());
        }
        let mut next = 0;
        for entry in fs::read_dir(&luns)? {
            let entry = entry?;
            let Ok(id) = entry.file_name().to_string_lossy().parse::<u64>() else {
                continue;
            };
            let link = fs::read_link(entry.path().join("device"))?;
            if link.ends_with(device) {
                return Ok(());
            }
            next = next.max(id + 1);
        }
        self.map_lun(&luns, next, device)
    }

    fn mirror_del(&self, device: &str) -> io::Result<()> {
        let luns = self.copy_manager_luns();
        if !luns.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(&luns)? {
            let entry = entry?;
            if let Ok(link) = fs::read_link(entry.path().join("device")) {
                if link.ends_with(device) {
                    fs::remove_dir_all(entry.path())?;
                }
            }
        }
        Ok(())
    }

    fn next_rel_tgt_id(&self) -> u64 {
        let mut max = 0;
        let targets = self.root().join("targets");
        for driver in fs::read_dir(targets).unwrap().flatten() {
            for target in fs::read_dir(driver.path()).unwrap().flatten() {
                let id = fs::read_to_string(target.path().join("rel_tgt_id"))
                    .ok()
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .unwrap_or(0);
                max = max.max(id);
            }
        }
        max + 1
    }

    /// Apply one command the way SCST would
    fn apply(&self, path: &Path, data: &str) -> io::Result<()> {
        let dir = path.parent().unwrap_or(path);
        let file = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let words: Vec<&str> = data.split_whitespace().collect();
        let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let grand = dir
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        let invalid = || io::Error::new(io::ErrorKind::InvalidInput, data.to_string());

        if file == "enabled" {
            fs::write(path, format!("{}\n", data))?;
            let id_file = dir.join("rel_tgt_id");
            let current = fs::read_to_string(&id_file).unwrap_or_default();
            if data == "1" && current.trim() == "0" {
                fs::write(&id_file, format!("{}\n", self.next_rel_tgt_id()))?;
            }
            return Ok(());
        }

        if file != "mgmt" {
            return fs::write(path, data);
        }

        match (grand, dir_name, words.as_slice()) {
            ("handlers", _, ["add_device", name, filename]) => {
                let filename = filename.strip_prefix("filename=").ok_or_else(invalid)?;
                fs::create_dir_all(dir.join(name))?;
                fs::write(dir.join(name).join("filename"), format!("{}\n", filename))?;
                fs::write(dir.join(name).join("size"), "4096\n")?;
            }
            ("handlers", _, ["del_device", name]) => fs::remove_dir_all(dir.join(name))?,
            ("targets", driver, ["add_target", name]) => {
                if dir.join(name).exists() {
                    return Err(io::Error::new(io::ErrorKind::AlreadyExists, name.to_string()));
                }
                self.target(driver, name, false, 0);
            }
            ("targets", _, ["del_target", name]) => fs::remove_dir_all(dir.join(name))?,
            (_, "ini_groups", ["create", name]) => {
                fs::create_dir_all(dir.join(name).join("luns"))?;
                fs::create_dir_all(dir.join(name).join("initiators"))?;
                fs::write(dir.join(name).join("luns").join(MGMT), "")?;
                fs::write(dir.join(name).join("initiators").join(MGMT), "")?;
            }
            (_, "ini_groups", ["del", name]) => fs::remove_dir_all(dir.join(name))?,
            (_, "luns", ["add", device, id]) => {
                let id: u64 = id.parse().map_err(|_| invalid())?;
                self.map_lun(dir, id, device)?;
                self.mirror_add(device)?;
            }
            (_, "luns", ["del", id]) => {
                let link = fs::read_link(dir.join(id).join("device"))?;
                fs::remove_dir_all(dir.join(id))?;
                if let Some(device) = link.file_name().and_then(|n| n.to_str()) {
                    self.mirror_del(device)?;
                }
            }
            (_, "initiators", ["add", name]) => fs::write(dir.join(name), "")?,
            (_, "initiators", ["del", name]) => fs::remove_file(dir.join(name))?,
            _ => return Err(invalid()),
        }
        Ok(())
    }
}

const MGMT: &str = "mgmt";

fn flag(enabled: bool) -> &'static str {
    if enabled {
        "1\n"
    } else {
        "0\n"
    }
}

impl Executor for FakeScst {
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let data = String::from_utf8_lossy(data).into_owned();
        self.writes
            .lock()
            .unwrap()
            .push((path.to_path_buf(), data.clone()));
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only sysfs"));
        }
        self.apply(path, &data)
    }

    fn run(&self, command: &str) -> io::Result<String> {
        self.commands.lock().unwrap().push(command.to_string());
        self.outputs
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| c == command)
            .map(|(_, out)| out.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, command.to_string()))
    }
}
