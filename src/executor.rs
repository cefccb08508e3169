//! Access to the live system
//!
//! The manager never touches sysfs or spawns processes directly; it goes
//! through an [`Executor`] so tests can record or redirect every change.

use std::io;
use std::path::Path;
use std::process::Command;

/// Applies changes to the live system
pub trait Executor: Send + Sync {
    /// Write `data` to `path`, e.g. a command string to an SCST `mgmt` file
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Run a shell command and return its stdout without the trailing newline
    fn run(&self, command: &str) -> io::Result<String>;
}

/// Executor backed by the real filesystem and `/bin/sh`
#[derive(Debug, Clone, Copy, Default)]
pub struct SysfsExecutor;

impl Executor for SysfsExecutor {
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        std::fs::write(path, data)
    }

    fn run(&self, command: &str) -> io::Result<String> {
        let output = Command::new("/bin/sh").arg("-c").arg(command).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .trim_end_matches('\n')
            .to_string())
    }
}
