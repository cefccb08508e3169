//! ZFS storage inventory
//!
//! Pools, volumes and snapshots back the block devices SCST exports. They are
//! read from the tab-separated output of `zpool get -H -p` and `zfs get -H -p`:
//!
//! ```text
//! tank/vol1	volsize	10737418240	local
//! tank/vol1	compression	lz4	inherited from tank
//! ```
//!
//! Each entity has a static table of the properties it keeps; anything else
//! in the output is skipped.

use crate::config::Config;
use crate::error::{ResourceKind, ScstError, ScstResult};
use crate::executor::Executor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    pub size: String,
    pub capacity: String,
    pub health: String,
    pub guid: String,
    pub free: String,
    pub allocated: String,
    pub fragmentation: String,
    pub readonly: String,
    pub ashift: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    /// First path segment of the name
    pub pool: String,
    pub creation: String,
    pub used: String,
    pub available: String,
    pub referenced: String,
    pub volsize: String,
    pub volblocksize: String,
    pub compression: String,
    pub guid: String,
    pub volmode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Volume or filesystem the snapshot was taken of
    pub parent: String,
    /// Part after `@`
    pub name: String,
    pub creation: String,
    pub used: String,
    pub referenced: String,
    pub createtxg: String,
    pub guid: String,
}

impl Snapshot {
    /// Full `parent@name` form
    pub fn full_name(&self) -> String {
        format!("{}@{}", self.parent, self.name)
    }
}

/// Property name and the field it fills
struct Property<T> {
    key: &'static str,
    set: fn(&mut T, &str),
}

const POOL_PROPERTIES: &[Property<Pool>] = &[
    Property { key: "size", set: |p, v| p.size = v.to_string() },
    Property { key: "capacity", set: |p, v| p.capacity = v.to_string() },
    Property { key: "health", set: |p, v| p.health = v.to_string() },
    Property { key: "guid", set: |p, v| p.guid = v.to_string() },
    Property { key: "free", set: |p, v| p.free = v.to_string() },
    Property { key: "allocated", set: |p, v| p.allocated = v.to_string() },
    Property { key: "fragmentation", set: |p, v| p.fragmentation = v.to_string() },
    Property { key: "readonly", set: |p, v| p.readonly = v.to_string() },
    Property { key: "ashift", set: |p, v| p.ashift = v.to_string() },
];

const VOLUME_PROPERTIES: &[Property<Volume>] = &[
    Property { key: "creation", set: |p, v| p.creation = v.to_string() },
    Property { key: "used", set: |p, v| p.used = v.to_string() },
    Property { key: "available", set: |p, v| p.available = v.to_string() },
    Property { key: "referenced", set: |p, v| p.referenced = v.to_string() },
    Property { key: "volsize", set: |p, v| p.volsize = v.to_string() },
    Property { key: "volblocksize", set: |p, v| p.volblocksize = v.to_string() },
    Property { key: "compression", set: |p, v| p.compression = v.to_string() },
    Property { key: "guid", set: |p, v| p.guid = v.to_string() },
    Property { key: "volmode", set: |p, v| p.volmode = v.to_string() },
];

const SNAPSHOT_PROPERTIES: &[Property<Snapshot>] = &[
    Property { key: "creation", set: |p, v| p.creation = v.to_string() },
    Property { key: "used", set: |p, v| p.used = v.to_string() },
    Property { key: "referenced", set: |p, v| p.referenced = v.to_string() },
    Property { key: "createtxg", set: |p, v| p.createtxg = v.to_string() },
    Property { key: "guid", set: |p, v| p.guid = v.to_string() },
];

/// One `name property value [source]` line
fn split_line(line: &str) -> Option<(&str, &str, &str)> {
    let mut parts = line.split('\t');
    let name = parts.next()?;
    let key = parts.next()?;
    let value = parts.next()?;
    Some((name, key, value))
}

fn set_property<T>(table: &[Property<T>], entity: &mut T, key: &str, value: &str) {
    match table.iter().find(|p| p.key == key) {
        Some(property) => (property.set)(entity, value),
        None => log::trace!("Skipping zfs property {}", key),
    }
}

/// Build one entity from `get` output, `None` if the output has no lines
fn collect_one<T: Default>(
    table: &[Property<T>],
    output: &str,
    init: fn(&mut T, &str),
) -> Option<T> {
    let mut entity: Option<T> = None;
    for (name, key, value) in output.lines().filter_map(split_line) {
        let entity = entity.get_or_insert_with(|| {
            let mut e = T::default();
            init(&mut e, name);
            e
        });
        set_property(table, entity, key, value);
    }
    entity
}

/// Parse `zpool get -H -p` output for a single pool
pub fn parse_pool(output: &str) -> Option<Pool> {
    collect_one(POOL_PROPERTIES, output, |p, name| p.name = name.to_string())
}

/// Parse `zfs get -H -p` output for a single volume
pub fn parse_volume(output: &str) -> Option<Volume> {
    collect_one(VOLUME_PROPERTIES, output, |v, name| {
        v.name = name.to_string();
        v.pool = name.split('/').next().unwrap_or_default().to_string();
    })
}

/// Parse `zfs get -H -p` output covering any number of snapshots
///
/// Snapshots come back in the order they first appear. Lines whose name has
/// no `@` are not snapshots and are skipped.
pub fn parse_snapshots(output: &str) -> Vec<Snapshot> {
    let mut snapshots: Vec<Snapshot> = Vec::new();
    for (full, key, value) in output.lines().filter_map(split_line) {
        let Some((parent, name)) = full.split_once('@') else {
            continue;
        };
        let index = match snapshots
            .iter()
            .position(|s| s.parent == parent && s.name == name)
        {
            Some(index) => index,
            None => {
                snapshots.push(Snapshot {
                    parent: parent.to_string(),
                    name: name.to_string(),
                    ..Snapshot::default()
                });
                snapshots.len() - 1
            }
        };
        set_property(SNAPSHOT_PROPERTIES, &mut snapshots[index], key, value);
    }
    snapshots
}

/// Reads pools, volumes and snapshots through an [`Executor`]
pub struct Inventory<'a, E: Executor> {
    config: &'a Config,
    executor: &'a E,
}

impl<'a, E: Executor> Inventory<'a, E> {
    pub fn new(config: &'a Config, executor: &'a E) -> Self {
        Self { config, executor }
    }

    fn get(&self, command: String) -> ScstResult<String> {
        log::debug!("{}", command);
        self.executor
            .run(&command)
            .map_err(|source| ScstError::CommandFailed { command, source })
    }

    pub fn pool(&self, name: &str) -> ScstResult<Pool> {
        let output = self.get(format!("{} get -H -p all {}", self.config.zpool, name))?;
        parse_pool(&output).ok_or_else(|| ScstError::not_found(ResourceKind::Pool, name))
    }

    pub fn volume(&self, name: &str) -> ScstResult<Volume> {
        let output = self.get(format!("{} get -H -p all {}", self.config.zfs, name))?;
        parse_volume(&output).ok_or_else(|| ScstError::not_found(ResourceKind::Volume, name))
    }

    /// All snapshots of a volume, oldest listing order first
    pub fn snapshots(&self, volume: &str) -> ScstResult<Vec<Snapshot>> {
        let output = self.get(format!(
            "{} get -H -p -r -t snapshot all {}",
            self.config.zfs, volume
        ))?;
        Ok(parse_snapshots(&output))
    }
}
