use super::client::ApiClient;
use super::device_details_path;
use crate::error::{CollectError, CollectResult};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Descriptive attributes of one device. Values pass through untyped.
pub type DetailRecord = BTreeMap<String, JsonValue>;

pub async fn fetch_details(
    client: &ApiClient,
    token: &str,
    device_id: &str,
) -> CollectResult<DetailRecord> {
    let mut body = client
        .request(&device_details_path(device_id), token, &[])
        .await?;
    decode_details(device_id, &mut body)
}

pub(crate) fn decode_details(device_id: &str, body: &mut [u8]) -> CollectResult<DetailRecord> {
    simd_json::serde::from_slice(body)
        .map_err(|err| CollectError::decode(format!("details of {device_id}"), err))
}
