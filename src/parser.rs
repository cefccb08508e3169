//! SCST configuration file parser
//!
//! Reads the brace-delimited format written by `scstadmin -write_config`:
//!
//! ```text
//! HANDLER vdisk_blockio {
//!     DEVICE disk1 {
//!         filename /dev/sdb
//!         size 1073741824
//!     }
//! }
//!
//! TARGET_DRIVER iscsi {
//!     enabled 1
//!
//!     TARGET iqn.2024-01.example:t1 {
//!         enabled 1
//!         rel_tgt_id 1
//!
//!         GROUP g1 {
//!             LUN 0 disk1
//!             INITIATOR iqn.1991-05.com.microsoft:host1
//!         }
//!     }
//! }
//! ```
//!
//! Every open block is a frame on an explicit stack that owns the entity
//! being built. A closing brace pops the frame and attaches the finished
//! entity to its parent, so a `System` only exists once the whole input has
//! been accepted.

use crate::error::{ScstError, ScstResult};
use crate::model::{Device, Driver, Group, Handler, Lun, System, Target, COPY_MANAGER};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// File name reported in errors for text that did not come from a file
const IN_MEMORY: &str = "<memory>";

/// Open block, holding the entity under construction
#[derive(Debug)]
enum Frame {
    Handler(Handler),
    Device(Device),
    CopyManager(Driver),
    Driver(Driver),
    CopyManagerTarget(Target),
    Target(Target),
    Group(Group),
}

impl Frame {
    fn kind(&self) -> &'static str {
        match self {
            Frame::Handler(_) => "HANDLER",
            Frame::Device(_) => "DEVICE",
            Frame::CopyManager(_) | Frame::Driver(_) => "TARGET_DRIVER",
            Frame::CopyManagerTarget(_) | Frame::Target(_) => "TARGET",
            Frame::Group(_) => "GROUP",
        }
    }

    fn name(&self) -> &str {
        match self {
            Frame::Handler(h) => &h.name,
            Frame::Device(d) => &d.name,
            Frame::CopyManager(d) | Frame::Driver(d) => &d.name,
            Frame::CopyManagerTarget(t) | Frame::Target(t) => &t.name,
            Frame::Group(g) => &g.name,
        }
    }

    /// Block opened by `keyword name {` inside `parent`
    fn open(parent: Option<&Frame>, keyword: &str, name: &str) -> Option<Frame> {
        let frame = match (parent, keyword) {
            (None, "HANDLER") => Frame::Handler(Handler::new(name)),
            (None, "TARGET_DRIVER") if name == COPY_MANAGER => {
                Frame::CopyManager(Driver::new(name))
            }
            (None, "TARGET_DRIVER") => Frame::Driver(Driver::new(name)),
            (Some(Frame::Handler(_)), "DEVICE") => Frame::Device(Device::new(name)),
            (Some(Frame::CopyManager(_)), "TARGET") => {
                Frame::CopyManagerTarget(Target::new(name))
            }
            (Some(Frame::Driver(_)), "TARGET") => Frame::Target(Target::new(name)),
            (Some(Frame::Target(_)), "GROUP") => Frame::Group(Group::new(name)),
            _ => return None,
        };
        Some(frame)
    }

    /// Apply a `key value...` line to the entity of this frame
    fn assign(&mut self, parts: &[&str]) -> Result<(), String> {
        match self {
            Frame::Device(device) => apply(DEVICE_FIELDS, device, parts),
            Frame::CopyManager(driver) | Frame::Driver(driver) => {
                apply(DRIVER_FIELDS, driver, parts)
            }
            Frame::CopyManagerTarget(target) | Frame::Target(target) => {
                apply(TARGET_FIELDS, target, parts)
            }
            Frame::Group(group) => apply(GROUP_FIELDS, group, parts),
            Frame::Handler(_) => {
                log::debug!("Ignoring handler attribute: {}", parts.join(" "));
                Ok(())
            }
        }
    }
}

/// Recognized key inside a block: keyword, exact token count, setter
struct Field<T> {
    key: &'static str,
    tokens: usize,
    set: fn(&mut T, &[&str]) -> Result<(), String>,
}

const DEVICE_FIELDS: &[Field<Device>] = &[
    Field { key: "filename", tokens: 2, set: set_filename },
    Field { key: "size", tokens: 2, set: set_size },
];

const DRIVER_FIELDS: &[Field<Driver>] = &[
    Field { key: "enabled", tokens: 2, set: set_driver_enabled },
];

const TARGET_FIELDS: &[Field<Target>] = &[
    Field { key: "enabled", tokens: 2, set: set_target_enabled },
    Field { key: "rel_tgt_id", tokens: 2, set: set_rel_tgt_id },
    Field { key: "LUN", tokens: 3, set: add_target_lun },
];

const GROUP_FIELDS: &[Field<Group>] = &[
    Field { key: "LUN", tokens: 3, set: add_group_lun },
    Field { key: "INITIATOR", tokens: 2, set: add_initiator },
];

fn apply<T>(fields: &[Field<T>], entity: &mut T, parts: &[&str]) -> Result<(), String> {
    let Some(field) = fields.iter().find(|f| f.key == parts[0]) else {
        log::debug!("Ignoring unknown attribute: {}", parts.join(" "));
        return Ok(());
    };
    if parts.len() != field.tokens {
        return Err(format!("bad format '{}'", parts.join(" ")));
    }
    (field.set)(entity, parts)
}

fn set_filename(device: &mut Device, parts: &[&str]) -> Result<(), String> {
    device.filename = parts[1].to_string();
    Ok(())
}

fn set_size(device: &mut Device, parts: &[&str]) -> Result<(), String> {
    device.size = number(parts[1])?;
    Ok(())
}

fn set_driver_enabled(driver: &mut Driver, parts: &[&str]) -> Result<(), String> {
    driver.enabled = flag(parts[1])?;
    Ok(())
}

fn set_target_enabled(target: &mut Target, parts: &[&str]) -> Result<(), String> {
    target.enabled = flag(parts[1])?;
    Ok(())
}

fn set_rel_tgt_id(target: &mut Target, parts: &[&str]) -> Result<(), String> {
    target.id = number(parts[1])?;
    Ok(())
}

fn add_target_lun(target: &mut Target, parts: &[&str]) -> Result<(), String> {
    push_lun(&mut target.luns, parts)
}

fn add_group_lun(group: &mut Group, parts: &[&str]) -> Result<(), String> {
    push_lun(&mut group.luns, parts)
}

fn add_initiator(group: &mut Group, parts: &[&str]) -> Result<(), String> {
    group.initiators.push(parts[1].to_string());
    Ok(())
}

fn push_lun(luns: &mut Vec<Lun>, parts: &[&str]) -> Result<(), String> {
    let id = number(parts[1])?;
    if luns.iter().any(|l| l.id == id) {
        return Err(format!("duplicate LUN {}", id));
    }
    luns.push(Lun::new(id, parts[2]));
    Ok(())
}

fn number(value: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("invalid number '{}'", value))
}

fn flag(value: &str) -> Result<bool, String> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(format!("invalid enabled value '{}'", value)),
    }
}

/// Extract the version from a `# ... SCST ... v3.7.0.` header comment
///
/// Exactly one trailing `.` and one leading `v` are removed, mirroring what
/// the renderer adds.
fn header_version(line: &str) -> String {
    let last = line.split_whitespace().last().unwrap_or("");
    let last = last.strip_suffix('.').unwrap_or(last);
    last.strip_prefix('v').unwrap_or(last).to_string()
}

fn is_block_keyword(word: &str) -> bool {
    matches!(word, "HANDLER" | "DEVICE" | "TARGET_DRIVER" | "TARGET" | "GROUP")
}

/// Insert a named child, rejecting a second block with the same name
fn insert_unique<T>(
    map: &mut BTreeMap<String, T>,
    kind: &str,
    name: &str,
    child: T,
) -> Result<(), String> {
    match map.entry(name.to_string()) {
        Entry::Occupied(_) => Err(format!("duplicate {} {}", kind, name)),
        Entry::Vacant(slot) => {
            slot.insert(child);
            Ok(())
        }
    }
}

/// Attach a finished entity to the frame below it, or to the system root
fn attach(system: &mut System, parent: Option<&mut Frame>, child: Frame) -> Result<(), String> {
    let kind = child.kind();
    let name = child.name().to_string();
    match (parent, child) {
        (None, Frame::Handler(h)) => insert_unique(&mut system.handlers, kind, &name, h),
        (None, Frame::CopyManager(d)) | (None, Frame::Driver(d)) => {
            insert_unique(&mut system.drivers, kind, &name, d)
        }
        (Some(Frame::Handler(h)), Frame::Device(d)) => {
            insert_unique(&mut h.devices, kind, &name, d)
        }
        (Some(Frame::CopyManager(d)), Frame::CopyManagerTarget(t))
        | (Some(Frame::Driver(d)), Frame::Target(t)) => {
            insert_unique(&mut d.targets, kind, &name, t)
        }
        (Some(Frame::Target(t)), Frame::Group(g)) => insert_unique(&mut t.groups, kind, &name, g),
        _ => Err(format!("misplaced {} {}", kind, name)),
    }
}

/// Parse SCST configuration text
///
/// `file` is only used to locate syntax errors.
pub fn parse(text: &str, file: &str) -> ScstResult<System> {
    let mut system = System::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut line_count = 0;

    for (index, raw) in text.lines().enumerate() {
        let n = index + 1;
        line_count = n;

        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('#') {
            if line.contains("SCST") {
                system.version = header_version(line);
            }
            continue;
        }

        if line == "}" {
            let frame = stack
                .pop()
                .ok_or_else(|| ScstError::syntax(file, n, "don't match '}'"))?;
            attach(&mut system, stack.last_mut(), frame)
                .map_err(|msg| ScstError::syntax(file, n, msg))?;
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();

        if line.ends_with('{') || is_block_keyword(parts[0]) {
            if parts.len() != 3 {
                return Err(ScstError::syntax(file, n, format!("bad format '{}'", line)));
            }
            if parts[2] != "{" {
                return Err(ScstError::syntax(file, n, "missing '{'"));
            }
            let frame = Frame::open(stack.last(), parts[0], parts[1]).ok_or_else(|| {
                ScstError::syntax(file, n, format!("unexpected block '{}'", line))
            })?;
            stack.push(frame);
            continue;
        }

        match stack.last_mut() {
            Some(frame) => frame
                .assign(&parts)
                .map_err(|msg| ScstError::syntax(file, n, msg))?,
            None => log::debug!("Ignoring top-level line {}: {}", n, line),
        }
    }

    if let Some(frame) = stack.last() {
        return Err(ScstError::syntax(
            file,
            line_count,
            format!("missing '}}' for {}<{}>", frame.kind(), frame.name()),
        ));
    }

    Ok(system)
}

/// Read and parse a configuration file, e.g. `/etc/scst.conf`
pub fn parse_file(path: impl AsRef<Path>) -> ScstResult<System> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    parse(&text, &path.display().to_string())
}

impl FromStr for System {
    type Err = ScstError;

    fn from_str(s: &str) -> ScstResult<System> {
        parse(s, IN_MEMORY)
    }
}
