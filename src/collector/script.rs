//! Callback script for sensors loaded through a script tag.

use super::ack::EventAck;
use crate::event::escape::js_string;

/// Render the script body returned to script-tag sensors.
///
/// The script copies every acknowledged field into
/// `<namespace>.Sensor.data` and calls `<namespace>.callbacks.onEvent` when
/// the page registered one. Missing namespace objects are created, so a page
/// without the sensor runs it without errors.
///
/// `namespace` must be a plain script identifier; see
/// [`Config::validate`](crate::config::Config::validate).
pub fn render_callback_script(ack: &EventAck, namespace: &str) -> String {
    let ns = format!("window.{namespace}");
    let mut script = String::with_capacity(1024);

    script.push_str(&format!("if (!{ns}) {ns} = {{ callbacks: {{}} }};\n"));
    script.push_str(&format!("if (!{ns}.callbacks) {ns}.callbacks = {{}};\n"));
    script.push_str(&format!("if (!{ns}.Sensor) {ns}.Sensor = {{ data: {{}} }};\n"));
    script.push_str(&format!("if (!{ns}.Sensor.data) {ns}.Sensor.data = {{}};\n"));
    script.push_str("(function (ns, data) {\n");
    for (field, value) in ack.script_fields() {
        script.push_str(&format!("  data.{} = {};\n", field, js_string(&value)));
    }
    script.push_str(
        "  if (typeof ns.callbacks.onEvent === 'function') ns.callbacks.onEvent.call(ns, data);\n",
    );
    script.push_str(&format!("}})({ns}, {ns}.Sensor.data);\n"));

    script
}
