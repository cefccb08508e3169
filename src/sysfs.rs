//! SCST sysfs tree layout and best-effort readers
//!
//! SCST exposes its configuration under `/sys/kernel/scst_tgt`:
//!
//! ```text
//! version
//! handlers/<handler>/mgmt
//! handlers/<handler>/<device>/{filename,size}
//! targets/<driver>/{enabled,mgmt}
//! targets/<driver>/<target>/{enabled,rel_tgt_id}
//! targets/<driver>/<target>/luns/{mgmt,<id>/device -> device dir}
//! targets/<driver>/<target>/ini_groups/mgmt
//! targets/<driver>/<target>/ini_groups/<group>/luns/{mgmt,<id>/device}
//! targets/<driver>/<target>/ini_groups/<group>/initiators/{mgmt,<initiator>}
//! ```
//!
//! Changes are made by writing a command string to the `mgmt` file of the
//! right directory. Readers here never fail: a missing or unreadable file
//! reads as empty.

use crate::model::Lun;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Default root of the SCST sysfs tree
pub const DEFAULT_ROOT: &str = "/sys/kernel/scst_tgt";

/// Name of the command endpoint present in every writable directory
pub const MGMT: &str = "mgmt";

/// Paths inside an SCST sysfs tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version(&self) -> PathBuf {
        self.root.join("version")
    }

    pub fn handlers(&self) -> PathBuf {
        self.root.join("handlers")
    }

    pub fn handler(&self, handler: &str) -> PathBuf {
        self.handlers().join(handler)
    }

    pub fn handler_mgmt(&self, handler: &str) -> PathBuf {
        self.handler(handler).join(MGMT)
    }

    pub fn device(&self, handler: &str, device: &str) -> PathBuf {
        self.handler(handler).join(device)
    }

    pub fn targets(&self) -> PathBuf {
        self.root.join("targets")
    }

    pub fn driver(&self, driver: &str) -> PathBuf {
        self.targets().join(driver)
    }

    pub fn driver_mgmt(&self, driver: &str) -> PathBuf {
        self.driver(driver).join(MGMT)
    }

    pub fn target(&self, driver: &str, target: &str) -> PathBuf {
        self.driver(driver).join(target)
    }

    pub fn target_enabled(&self, driver: &str, target: &str) -> PathBuf {
        self.target(driver, target).join("enabled")
    }

    pub fn rel_tgt_id(&self, driver: &str, target: &str) -> PathBuf {
        self.target(driver, target).join("rel_tgt_id")
    }

    pub fn ini_groups(&self, driver: &str, target: &str) -> PathBuf {
        self.target(driver, target).join("ini_groups")
    }

    pub fn ini_groups_mgmt(&self, driver: &str, target: &str) -> PathBuf {
        self.ini_groups(driver, target).join(MGMT)
    }

    pub fn group(&self, driver: &str, target: &str, group: &str) -> PathBuf {
        self.ini_groups(driver, target).join(group)
    }

    /// Lun directory of a target, or of one of its groups
    pub fn luns(&self, driver: &str, target: &str, group: Option<&str>) -> PathBuf {
        match group {
            Some(group) => self.group(driver, target, group).join("luns"),
            None => self.target(driver, target).join("luns"),
        }
    }

    pub fn luns_mgmt(&self, driver: &str, target: &str, group: Option<&str>) -> PathBuf {
        self.luns(driver, target, group).join(MGMT)
    }

    pub fn initiators(&self, driver: &str, target: &str, group: &str) -> PathBuf {
        self.group(driver, target, group).join("initiators")
    }

    pub fn initiators_mgmt(&self, driver: &str, target: &str, group: &str) -> PathBuf {
        self.initiators(driver, target, group).join(MGMT)
    }
}

/// First line of a file without its newline, or "" if unreadable
pub fn read_header(path: impl AsRef<Path>) -> String {
    let Ok(file) = fs::File::open(path.as_ref()) else {
        return String::new();
    };
    let mut line = String::new();
    if BufReader::new(file).read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim_end_matches(['\n', '\r']).to_string()
}

/// First line of a file parsed as a number, 0 if missing or malformed
pub fn read_number(path: impl AsRef<Path>) -> u64 {
    read_header(path).trim().parse().unwrap_or(0)
}

/// `1` in the first line of a file
pub fn read_flag(path: impl AsRef<Path>) -> bool {
    read_header(path).trim() == "1"
}

fn list(path: &Path, want_dirs: bool, ignores: &[&str]) -> Vec<String> {
    let Ok(entries) = fs::read_dir(path) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || ignores.contains(&name.as_str()) {
                return None;
            }
            // follow symlinks: handler entries link into devices/
            let is_dir = fs::metadata(entry.path()).map(|m| m.is_dir()).ok()?;
            (is_dir == want_dirs).then_some(name)
        })
        .collect();
    names.sort();
    names
}

/// Names of the sub-directories of `path`, sorted
pub fn read_dirs(path: impl AsRef<Path>, ignores: &[&str]) -> Vec<String> {
    list(path.as_ref(), true, ignores)
}

/// Names of the non-directory entries of `path`, sorted
pub fn read_files(path: impl AsRef<Path>, ignores: &[&str]) -> Vec<String> {
    list(path.as_ref(), false, ignores)
}

/// Target of a symbolic link, or "" if it is not one
pub fn read_link(path: impl AsRef<Path>) -> String {
    fs::read_link(path.as_ref())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Luns of a `luns` directory, ordered by id
///
/// Each `<id>/device` entry links to the device directory; its last path
/// segment is the device name. Entries whose link cannot be read are skipped.
pub fn read_luns(path: impl AsRef<Path>) -> Vec<Lun> {
    let path = path.as_ref();
    let mut luns: Vec<Lun> = read_dirs(path, &[])
        .into_iter()
        .filter_map(|dir| {
            let Ok(id) = dir.parse::<u64>() else {
                log::debug!("Skipping non-numeric lun entry {}", path.join(&dir).display());
                return None;
            };
            let link = read_link(path.join(&dir).join("device"));
            let device = link.rsplit('/').next().unwrap_or_default();
            if device.is_empty() {
                log::debug!("Skipping lun {} without a device link", path.join(&dir).display());
                return None;
            }
            Some(Lun::new(id, device))
        })
        .collect();
    luns.sort_by_key(|lun| lun.id);
    luns
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::default();
        assert_eq!(
            layout.handler_mgmt("vdisk_blockio"),
            PathBuf::from("/sys/kernel/scst_tgt/handlers/vdisk_blockio/mgmt")
        );
        assert_eq!(
            layout.luns_mgmt("iscsi", "t1", Some("g1")),
            PathBuf::from("/sys/kernel/scst_tgt/targets/iscsi/t1/ini_groups/g1/luns/mgmt")
        );
        assert_eq!(
            layout.luns_mgmt("iscsi", "t1", None),
            PathBuf::from("/sys/kernel/scst_tgt/targets/iscsi/t1/luns/mgmt")
        );
    }

    #[test]
    fn test_read_header_first_line_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("filename");
        fs::write(&path, "/dev/sdb\n[key]\n").unwrap();
        assert_eq!(read_header(&path), "/dev/sdb");
        assert_eq!(read_header(dir.path().join("missing")), "");
    }

    #[test]
    fn test_read_number_defaults_to_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("size");
        fs::write(&path, "garbage\n").unwrap();
        assert_eq!(read_number(&path), 0);
        fs::write(&path, "1024\n").unwrap();
        assert_eq!(read_number(&path), 1024);
    }

    #[test]
    fn test_read_dirs_and_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join("mgmt"), "").unwrap();
        fs::write(dir.path().join("iqn.x"), "").unwrap();

        assert_eq!(read_dirs(dir.path(), &[]), vec!["a", "b"]);
        assert_eq!(read_dirs(dir.path(), &["a"]), vec!["b"]);
        assert_eq!(read_files(dir.path(), &["mgmt"]), vec!["iqn.x"]);
        assert!(read_dirs(dir.path().join("missing"), &[]).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_luns_resolves_links() {
        let dir = TempDir::new().unwrap();
        let devices = dir.path().join("devices");
        fs::create_dir_all(devices.join("disk1")).unwrap();
        fs::create_dir_all(devices.join("disk2")).unwrap();

        let luns = dir.path().join("luns");
        for (id, dev) in [("10", "disk2"), ("2", "disk1")] {
            fs::create_dir_all(luns.join(id)).unwrap();
            std::os::unix::fs::symlink(devices.join(dev), luns.join(id).join("device")).unwrap();
        }
        fs::write(luns.join("mgmt"), "").unwrap();
        fs::create_dir_all(luns.join("5")).unwrap();

        assert_eq!(
            read_luns(&luns),
            vec![Lun::new(2, "disk1"), Lun::new(10, "disk2")]
        );
    }
}
