//! SCST configuration file renderer
//!
//! Serializes a [`System`] back into the format read by [`crate::parser`].
//! The layout lives in a single `tinytemplate` template; the model is first
//! flattened into a serializable view because templates can only iterate
//! sequences.

use crate::error::{ScstError, ScstResult};
use crate::model::{Device, Group, Lun, System};
use serde::Serialize;
use tinytemplate::TinyTemplate;

const SCST_TEMPLATE_NAME: &str = "scst";

const SCST_TEMPLATE: &str = "\
# Automatically generated by SCST Configurator v{version}.
{{ for handler in handlers }}
HANDLER {handler.name} \\{
{{ for device in handler.devices }}\tDEVICE {device.name} \\{
{{ if device.filename }}\t\tfilename {device.filename}
{{ endif }}\t\tsize {device.size}
\t}
{{ endfor }}}
{{ endfor }}{{ for driver in drivers }}
TARGET_DRIVER {driver.name} \\{
\tenabled {driver.enabled}
{{ for target in driver.targets }}
\tTARGET {target.name} \\{
\t\tenabled {target.enabled}
\t\trel_tgt_id {target.id}
{{ for lun in target.luns }}\t\tLUN {lun.id} {lun.device}
{{ endfor }}{{ for group in target.groups }}
\t\tGROUP {group.name} \\{
{{ for lun in group.luns }}\t\t\tLUN {lun.id} {lun.device}
{{ endfor }}{{ for initiator in group.initiators }}\t\t\tINITIATOR {initiator}
{{ endfor }}\t\t}
{{ endfor }}\t}
{{ endfor }}}
{{ endfor }}";

#[derive(Serialize)]
struct SystemView<'a> {
    version: &'a str,
    handlers: Vec<HandlerView<'a>>,
    drivers: Vec<DriverView<'a>>,
}

#[derive(Serialize)]
struct HandlerView<'a> {
    name: &'a str,
    devices: Vec<&'a Device>,
}

#[derive(Serialize)]
struct DriverView<'a> {
    name: &'a str,
    enabled: u8,
    targets: Vec<TargetView<'a>>,
}

#[derive(Serialize)]
struct TargetView<'a> {
    name: &'a str,
    enabled: u8,
    id: u64,
    luns: &'a [Lun],
    groups: Vec<&'a Group>,
}

impl<'a> SystemView<'a> {
    fn new(system: &'a System) -> Self {
        let handlers = system
            .handlers
            .values()
            .map(|h| HandlerView {
                name: &h.name,
                devices: h.devices.values().collect(),
            })
            .collect();

        let drivers = system
            .drivers
            .values()
            .map(|d| DriverView {
                name: &d.name,
                enabled: u8::from(d.enabled),
                targets: d
                    .targets
                    .values()
                    .map(|t| TargetView {
                        name: &t.name,
                        enabled: u8::from(t.enabled),
                        id: t.id,
                        luns: &t.luns,
                        groups: t.groups.values().collect(),
                    })
                    .collect(),
            })
            .collect();

        SystemView {
            version: &system.version,
            handlers,
            drivers,
        }
    }
}

/// Render a system as SCST configuration text
///
/// Handlers, devices, drivers, targets and groups come out sorted by name;
/// luns and initiators keep their order.
pub fn render(system: &System) -> ScstResult<String> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template(SCST_TEMPLATE_NAME, SCST_TEMPLATE)
        .map_err(|e| ScstError::Template(e.to_string()))?;

    tt.render(SCST_TEMPLATE_NAME, &SystemView::new(system))
        .map_err(|e| ScstError::Template(e.to_string()))
}
