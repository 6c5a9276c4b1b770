use crate::airthings::{DetailRecord, DeviceListEntry, SampleRecord};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub const MEASUREMENT: &str = "airthings_connector";
pub const SOURCE_NAME: &str = "airthings";

/// Detail keys that repeat list-entry data already carried as tags.
pub const EXCLUDED_DETAIL_KEYS: [&str; 5] = ["id", "deviceType", "location", "segment", "sensors"];

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl FieldValue {
    /// Converts a JSON value into a field. Objects and arrays keep their
    /// compact JSON text; `null` has no field representation.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => None,
            JsonValue::Bool(b) => Some(Self::Boolean(*b)),
            JsonValue::Number(num) => {
                if let Some(i) = num.as_i64() {
                    Some(Self::Integer(i))
                } else {
                    num.as_f64().map(Self::Float)
                }
            }
            JsonValue::String(s) => Some(Self::String(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => Some(Self::String(value.to_string())),
        }
    }
}

/// One normalized measurement for one device in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub measurement: &'static str,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

pub fn merge(entry: &DeviceListEntry, sample: &SampleRecord, details: &DetailRecord) -> MetricRecord {
    merge_at(entry, sample, details, Utc::now())
}

/// Builds the record for one device.
///
/// Merge order: sample values first, then detail values, so a detail
/// attribute replaces a sample value of the same name. The sample `time`
/// wins over `now`.
pub fn merge_at(
    entry: &DeviceListEntry,
    sample: &SampleRecord,
    details: &DetailRecord,
    now: DateTime<Utc>,
) -> MetricRecord {
    let mut tags = BTreeMap::new();
    tags.insert("name".to_string(), SOURCE_NAME.to_string());
    tags.insert("id".to_string(), entry.id.clone());
    tags.insert("deviceType".to_string(), entry.device_type.clone());
    tags.insert("segment.id".to_string(), entry.segment.id.clone());
    tags.insert("segment.name".to_string(), entry.segment.name.clone());
    tags.insert("segment.active".to_string(), entry.segment.active.to_string());
    tags.insert("segment.started".to_string(), entry.segment.started.clone());
    if !entry.location.id.is_empty() {
        tags.insert("location.id".to_string(), entry.location.id.clone());
    }
    if !entry.location.name.is_empty() {
        tags.insert("location.name".to_string(), entry.location.name.clone());
    }

    let mut fields = BTreeMap::new();
    for (key, value) in &sample.values {
        if let Some(field) = FieldValue::from_json(value) {
            fields.insert(key.clone(), field);
        }
    }
    for (key, value) in details {
        if EXCLUDED_DETAIL_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(field) = FieldValue::from_json(value) {
            if let Some(previous) = fields.insert(key.clone(), field) {
                tracing::trace!(device = %entry.id, key = %key, ?previous, "detail value replaced sample value");
            }
        }
    }

    MetricRecord {
        measurement: MEASUREMENT,
        tags,
        fields,
        timestamp: sample.timestamp.unwrap_or(now),
    }
}
