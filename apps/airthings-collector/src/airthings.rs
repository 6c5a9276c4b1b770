mod auth;
mod client;
mod details;
mod devices;
mod samples;

pub use auth::TokenProvider;
pub use client::{build_http_client, ApiClient};
pub use details::{fetch_details, DetailRecord};
pub use devices::{list_devices, DeviceListEntry};
#[cfg(test)]
pub use devices::{Location, Segment};
pub use samples::{fetch_sample, SampleRecord};

pub const PATH_DEVICES: &str = "/devices";

pub fn latest_samples_path(device_id: &str) -> String {
    format!("{PATH_DEVICES}/{}/latest-samples", encode_segment(device_id))
}

pub fn device_details_path(device_id: &str) -> String {
    format!("{PATH_DEVICES}/{}", encode_segment(device_id))
}

/// Percent-encodes one path segment so an id cannot reach another endpoint.
fn encode_segment(segment: &str) -> String {
    // The form encoder writes spaces as `+` and encodes a literal `+` as `%2B`.
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
