//! Error types for SCST configuration operations

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Kind of resource named in a lookup or uniqueness failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Handler,
    Device,
    Driver,
    Target,
    Group,
    Lun,
    Initiator,
    Pool,
    Volume,
    Snapshot,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Handler => "handler",
            ResourceKind::Device => "device",
            ResourceKind::Driver => "driver",
            ResourceKind::Target => "target",
            ResourceKind::Group => "group",
            ResourceKind::Lun => "lun",
            ResourceKind::Initiator => "initiator",
            ResourceKind::Pool => "pool",
            ResourceKind::Volume => "volume",
            ResourceKind::Snapshot => "snapshot",
        };
        f.write_str(name)
    }
}

/// SCST configuration errors
#[derive(Debug, Error)]
pub enum ScstError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Syntax error: {message} at {file}:{line}")]
    Syntax {
        file: String,
        line: usize,
        message: String,
    },

    #[error("SCST is not present: {} does not exist", .0.display())]
    SubsystemAbsent(PathBuf),

    #[error("{kind} '{name}' not exists")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("Command failed: {command}: {source}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScstError {
    pub(crate) fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        ScstError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn already_exists(kind: ResourceKind, name: impl Into<String>) -> Self {
        ScstError::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn syntax(file: &str, line: usize, message: impl Into<String>) -> Self {
        ScstError::Syntax {
            file: file.to_string(),
            line,
            message: message.into(),
        }
    }
}

/// Result type for SCST operations
pub type ScstResult<T> = Result<T, ScstError>;
