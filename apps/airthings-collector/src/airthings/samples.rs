use super::client::ApiClient;
use super::latest_samples_path;
use crate::error::{CollectError, CollectResult};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

const SAMPLE_TIME_KEY: &str = "time";

/// Latest sensor snapshot for one device, with `time` already lifted out of
/// the values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleRecord {
    pub values: BTreeMap<String, JsonValue>,
    pub timestamp: Option<DateTime<Utc>>,
}

pub async fn fetch_sample(
    client: &ApiClient,
    token: &str,
    device_id: &str,
) -> CollectResult<SampleRecord> {
    let mut body = client
        .request(&latest_samples_path(device_id), token, &[])
        .await?;
    decode_sample(device_id, &mut body)
}

pub(crate) fn decode_sample(device_id: &str, body: &mut [u8]) -> CollectResult<SampleRecord> {
    let mut envelope: BTreeMap<String, JsonValue> = simd_json::serde::from_slice(body)
        .map_err(|err| CollectError::decode(format!("latest samples of {device_id}"), err))?;

    let data = envelope
        .remove("data")
        .ok_or_else(|| CollectError::MissingField {
            field: "data",
            device: device_id.to_string(),
        })?;
    let JsonValue::Object(data) = data else {
        return Err(CollectError::decode(
            format!("latest samples of {device_id}"),
            "'data' is not an object",
        ));
    };

    let mut values: BTreeMap<String, JsonValue> = data.into_iter().collect();
    let timestamp = match values.remove(SAMPLE_TIME_KEY) {
        Some(raw) => {
            let parsed = epoch_seconds(&raw);
            if parsed.is_none() {
                tracing::debug!(device = device_id, time = %raw, "ignoring non-numeric sample time");
            }
            parsed
        }
        None => None,
    };

    Ok(SampleRecord { values, timestamp })
}

fn epoch_seconds(value: &JsonValue) -> Option<DateTime<Utc>> {
    let JsonValue::Number(num) = value else {
        return None;
    };
    let secs = num
        .as_i64()
        .or_else(|| num.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))?;
    Utc.timestamp_opt(secs, 0).single()
}
