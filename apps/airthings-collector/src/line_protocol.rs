//! InfluxDB line protocol rendering for [`MetricRecord`]s.

use crate::record::{FieldValue, MetricRecord};
use std::fmt::Write as _;

/// Renders one record as a line without the trailing newline.
///
/// Returns `None` when no field survives rendering, since a line needs at
/// least one field. Tags with empty values and non-finite floats are left out.
pub fn render(record: &MetricRecord) -> Option<String> {
    let mut fields = String::new();
    for (key, value) in &record.fields {
        let rendered = match value {
            FieldValue::Integer(v) => format!("{v}i"),
            FieldValue::Float(v) if v.is_finite() => format!("{v}"),
            FieldValue::Float(_) => continue,
            FieldValue::Boolean(v) => v.to_string(),
            FieldValue::String(v) => format!("\"{}\"", escape_string_field(v)),
        };
        if !fields.is_empty() {
            fields.push(',');
        }
        fields.push_str(&escape_key(key));
        fields.push('=');
        fields.push_str(&rendered);
    }
    if fields.is_empty() {
        return None;
    }

    let mut line = escape_measurement(record.measurement);
    for (key, value) in &record.tags {
        if value.is_empty() {
            continue;
        }
        let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
    }
    line.push(' ');
    line.push_str(&fields);
    if let Some(nanos) = record.timestamp.timestamp_nanos_opt() {
        let _ = write!(line, " {nanos}");
    }
    Some(line)
}

fn escape_measurement(value: &str) -> String {
    escape(value, &['\\', ',', ' '])
}

/// Used for tag keys, tag values and field keys. A trailing `\` would
/// otherwise escape the separator after it.
fn escape_key(value: &str) -> String {
    escape(value, &['\\', ',', '=', ' '])
}

fn escape_string_field(value: &str) -> String {
    escape(value, &['"', '\\'])
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            ch if special.contains(&ch) => {
                out.push('\\');
                out.push(ch);
            }
            ch => out.push(ch),
        }
    }
    out
}
