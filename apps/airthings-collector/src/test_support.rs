//! In-process mock of the Airthings token and consumer API endpoints.

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const WAVE_MINI_ID: &str = "9990019182";
pub const HUB_ID: &str = "2960000001";
pub const VIEW_PLUS_ID: &str = "2930000003";
pub const ACCESS_TOKEN: &str = "acc35570d3n";

const DEVICE_LIST: &str = include_str!("../testdata/device_list.json");

fn sample_fixture(device_id: &str) -> Option<&'static str> {
    match device_id {
        WAVE_MINI_ID => Some(include_str!("../testdata/sample_9990019182.json")),
        HUB_ID => Some(include_str!("../testdata/sample_2960000001.json")),
        VIEW_PLUS_ID => Some(include_str!("../testdata/sample_2930000003.json")),
        _ => None,
    }
}

fn details_fixture(device_id: &str) -> Option<&'static str> {
    match device_id {
        WAVE_MINI_ID => Some(include_str!("../testdata/details_9990019182.json")),
        HUB_ID => Some(include_str!("../testdata/details_2960000001.json")),
        VIEW_PLUS_ID => Some(include_str!("../testdata/details_2930000003.json")),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct MockCounters {
    pub token: AtomicUsize,
    pub devices: AtomicUsize,
    pub samples: AtomicUsize,
    pub details: AtomicUsize,
}

#[derive(Debug, Default)]
struct Behavior {
    token_status: u16,
    devices_status: u16,
    devices_body: Option<String>,
    sample_status: HashMap<String, u16>,
    sample_body: HashMap<String, String>,
    sample_delay: HashMap<String, Duration>,
    details_body: HashMap<String, String>,
    last_token_form: Option<HashMap<String, String>>,
    last_token_basic_auth: bool,
    last_show_inactive: Option<String>,
    authorizations: Vec<String>,
}

#[derive(Clone)]
struct MockState {
    counters: Arc<MockCounters>,
    behavior: Arc<Mutex<Behavior>>,
}

impl MockState {
    fn with_behavior<T>(&self, f: impl FnOnce(&mut Behavior) -> T) -> T {
        let mut guard = self.behavior.lock().unwrap_or_else(|poison| poison.into_inner());
        f(&mut guard)
    }
}

pub struct MockApi {
    addr: SocketAddr,
    pub counters: Arc<MockCounters>,
    state: MockState,
    handle: JoinHandle<()>,
}

impl MockApi {
    pub async fn start() -> Result<Self> {
        let counters = Arc::new(MockCounters::default());
        let state = MockState {
            counters: counters.clone(),
            behavior: Arc::new(Mutex::new(Behavior::default())),
        };
        let app = Router::new()
            .route("/v1/token", post(token))
            .route("/v1/devices", get(devices))
            .route("/v1/devices/{id}/latest-samples", get(latest_samples))
            .route("/v1/devices/{id}", get(device_details))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            counters,
            state,
            handle,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/v1/", self.addr)
    }

    pub fn token_url(&self) -> String {
        format!("http://{}/v1/token", self.addr)
    }

    /// Status for the token endpoint; `0` restores the default success.
    pub fn fail_token_with(&self, status: u16) {
        self.state.with_behavior(|b| b.token_status = status);
    }

    pub fn fail_devices_with(&self, status: u16) {
        self.state.with_behavior(|b| b.devices_status = status);
    }

    pub fn set_devices_body(&self, body: &str) {
        self.state.with_behavior(|b| b.devices_body = Some(body.to_string()));
    }

    pub fn fail_sample_with(&self, device_id: &str, status: u16) {
        self.state
            .with_behavior(|b| b.sample_status.insert(device_id.to_string(), status));
    }

    pub fn set_sample_body(&self, device_id: &str, body: &str) {
        self.state
            .with_behavior(|b| b.sample_body.insert(device_id.to_string(), body.to_string()));
    }

    /// Holds the latest-samples response for `device_id` back by `delay`.
    pub fn delay_sample(&self, device_id: &str, delay: Duration) {
        self.state
            .with_behavior(|b| b.sample_delay.insert(device_id.to_string(), delay));
    }

    pub fn set_details_body(&self, device_id: &str, body: &str) {
        self.state
            .with_behavior(|b| b.details_body.insert(device_id.to_string(), body.to_string()));
    }

    pub fn last_token_form(&self) -> Option<HashMap<String, String>> {
        self.state.with_behavior(|b| b.last_token_form.clone())
    }

    pub fn last_token_had_basic_auth(&self) -> bool {
        self.state.with_behavior(|b| b.last_token_basic_auth)
    }

    pub fn last_show_inactive(&self) -> Option<String> {
        self.state.with_behavior(|b| b.last_show_inactive.clone())
    }

    pub fn authorizations(&self) -> Vec<String> {
        self.state.with_behavior(|b| b.authorizations.clone())
    }

    pub fn api_calls(&self) -> (usize, usize, usize) {
        (
            self.counters.devices.load(Ordering::SeqCst),
            self.counters.samples.load(Ordering::SeqCst),
            self.counters.details.load(Ordering::SeqCst),
        )
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn json_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn status_or_ok(code: u16) -> StatusCode {
    if code == 0 {
        StatusCode::OK
    } else {
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn record_authorization(state: &MockState, headers: &HeaderMap) {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    state.with_behavior(|b| b.authorizations.push(value));
}

async fn token(State(state): State<MockState>, headers: HeaderMap, body: String) -> Response {
    state.counters.token.fetch_add(1, Ordering::SeqCst);
    let form: HashMap<String, String> = url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect();
    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    let status = state.with_behavior(|b| {
        b.last_token_form = Some(form);
        b.last_token_basic_auth = basic;
        status_or_ok(b.token_status)
    });

    if status != StatusCode::OK {
        return json_response(status, r#"{"error":"invalid_client"}"#.to_string());
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-www-form-urlencoded")],
        format!("access_token={ACCESS_TOKEN}&scope=user&token_type=bearer"),
    )
        .into_response()
}

async fn devices(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.counters.devices.fetch_add(1, Ordering::SeqCst);
    record_authorization(&state, &headers);
    let (status, body) = state.with_behavior(|b| {
        b.last_show_inactive = query.get("showInactive").cloned();
        (
            status_or_ok(b.devices_status),
            b.devices_body.clone().unwrap_or_else(|| DEVICE_LIST.to_string()),
        )
    });
    if status != StatusCode::OK {
        return json_response(status, r#"{"error":"unavailable"}"#.to_string());
    }
    json_response(StatusCode::OK, body)
}

async fn latest_samples(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    state.counters.samples.fetch_add(1, Ordering::SeqCst);
    record_authorization(&state, &headers);
    let (status, body, delay) = state.with_behavior(|b| {
        (
            status_or_ok(b.sample_status.get(&id).copied().unwrap_or(0)),
            b.sample_body.get(&id).cloned(),
            b.sample_delay.get(&id).copied(),
        )
    });
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    if status != StatusCode::OK {
        return json_response(status, r#"{"error":"unavailable"}"#.to_string());
    }
    match body.or_else(|| sample_fixture(&id).map(str::to_string)) {
        Some(body) => json_response(StatusCode::OK, body),
        None => json_response(StatusCode::NOT_FOUND, r#"{"error":"not_found"}"#.to_string()),
    }
}

async fn device_details(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    state.counters.details.fetch_add(1, Ordering::SeqCst);
    record_authorization(&state, &headers);
    let body = state.with_behavior(|b| b.details_body.get(&id).cloned());
    match body.or_else(|| details_fixture(&id).map(str::to_string)) {
        Some(body) => json_response(StatusCode::OK, body),
        None => json_response(StatusCode::NOT_FOUND, r#"{"error":"not_found"}"#.to_string()),
    }
}
