//! Runtime configuration
//!
//! One `Config` is built by the caller and handed to the manager and the
//! storage inventory. It can be loaded from TOML:
//!
//! ```toml
//! root = "/sys/kernel/scst_tgt"
//! config_file = "/etc/scst.conf"
//! zfs = "/usr/sbin/zfs"
//! zpool = "/usr/sbin/zpool"
//! ```
//!
//! Missing keys keep their defaults.

use crate::error::{ScstError, ScstResult};
use crate::sysfs::{Layout, DEFAULT_ROOT};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the persisted SCST configuration
pub const DEFAULT_CONFIG_FILE: &str = "/etc/scst.conf";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the SCST sysfs tree
    pub root: PathBuf,
    /// Where `save_to_cfg` writes the rendered configuration
    pub config_file: PathBuf,
    /// zfs binary used by the storage inventory
    pub zfs: String,
    /// zpool binary used by the storage inventory
    pub zpool: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            zfs: "zfs".to_string(),
            zpool: "zpool".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> ScstResult<Self> {
        toml::from_str(s).map_err(|e| ScstError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> ScstResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Set the sysfs root
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the persisted configuration path
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = path.into();
        self
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.root)
    }
}
