use super::client::ApiClient;
use super::PATH_DEVICES;
use crate::error::{CollectError, CollectResult};
use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub started: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One entry of the account's device list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListEntry {
    pub id: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub sensors: Vec<JsonValue>,
    #[serde(default)]
    pub segment: Segment,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Deserialize)]
struct DevicesEnvelope {
    #[serde(default)]
    devices: Vec<DeviceListEntry>,
}

/// Lists the account's devices in the order the API returns them.
pub async fn list_devices(
    client: &ApiClient,
    token: &str,
    show_inactive: bool,
) -> CollectResult<Vec<DeviceListEntry>> {
    let mut body = client
        .request(PATH_DEVICES, token, &[("showInactive", show_inactive.to_string())])
        .await?;
    decode_device_list(&mut body)
}

pub(crate) fn decode_device_list(body: &mut [u8]) -> CollectResult<Vec<DeviceListEntry>> {
    let envelope: DevicesEnvelope = simd_json::serde::from_slice(body)
        .map_err(|err| CollectError::decode("device list", err))?;
    Ok(envelope.devices)
}
