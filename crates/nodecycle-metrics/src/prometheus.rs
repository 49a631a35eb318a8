//! Prometheus text exposition format.
//!
//! Renders the counter registry into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use crate::collector::{DESCRIPTORS, Metrics};

/// Render every known counter into Prometheus text format.
///
/// HELP and TYPE lines are always emitted, even for counters that have
/// not been incremented yet.
pub fn render_prometheus(metrics: &Metrics) -> String {
    let snapshot = metrics.snapshot();
    let mut out = String::new();

    for (name, help) in DESCRIPTORS {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} counter\n"));
        for (key, value) in snapshot.iter().filter(|(k, _)| k.name == *name) {
            let labels = key
                .labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", escape(v)))
                .collect::<Vec<_>>()
                .join(",");
            out.push_str(&format!("{name}{{{labels}}} {value}\n"));
        }
    }

    out
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
