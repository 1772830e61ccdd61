//! Reconstruction of the plan invocation string from a Start document.
//!
//! The acquisition system records `plan_args` with device objects rendered as
//! their printed representations, so rebuilding the command the user typed is
//! best-effort. Device names are scraped out of `name='...'` tokens when
//! present; anything unrecognized falls back to its literal rendering. This
//! is compatibility behavior for the legacy SPEC `#S` line, not a pattern to
//! extend: structured identifiers in the upstream documents would make the
//! scraping unnecessary.
//!
//! The function is total: no document shape makes it fail.

use crate::document::StartDoc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static DEVICE_NAME: Lazy<Regex> = Lazy::new(|| {
    // matches name='m1', name="m1", and name=m1 in printed device reprs
    #[allow(clippy::unwrap_used)]
    Regex::new(r#"name=['"]?([^'",)\s]+)['"]?"#).unwrap()
});

/// Rebuild a human-readable plan invocation, e.g. `3  scan(detectors=['d1'],
/// motors=['m1'], num=5)`. The leading field is the scan_id.
pub fn reconstruct_scan_command(start: &StartDoc) -> String {
    let mut kwargs: Vec<String> = Vec::with_capacity(start.plan_args.len());
    for (key, value) in &start.plan_args {
        let rendered = match key.as_str() {
            // substitute the resolved name lists from the Start document
            "detectors" => render_name_list(&start.detectors),
            "motors" | "positioners" => render_name_list(start.independent_names()),
            "args" => render_device_args(value),
            _ => render_value(value),
        };
        kwargs.push(format!("{key}={rendered}"));
    }
    format!(
        "{}  {}({})",
        start.scan_id,
        start.plan_name,
        kwargs.join(", ")
    )
}

fn render_name_list(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    format!("[{}]", quoted.join(", "))
}

/// An `args` list interleaves device reprs with parameters. Pull each
/// device's `name=` token out of its printed representation; everything else
/// renders literally.
fn render_device_args(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::String(repr) => match DEVICE_NAME.captures(repr) {
                        Some(caps) => caps[1].to_string(),
                        None => render_value(item),
                    },
                    other => render_value(other),
                })
                .collect();
            format!("[{}]", rendered.join(", "))
        }
        other => render_value(other),
    }
}

/// Render any JSON structure into literal call syntax, recursively. Strings
/// are single-quoted with embedded quotes escaped; unknown shapes fall back
/// to their serialized form.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("'{}': {}", k.replace('\'', "\\'"), render_value(v)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
        other => other.to_string(),
    }
}
