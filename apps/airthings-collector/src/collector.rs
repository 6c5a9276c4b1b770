
use crate::airthings::{self, ApiClient, TokenProvider};
use crate::config::Config;
use crate::error::CollectResult;
use crate::record::{self, MetricRecord};
use crate::sink::MetricSink;
use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Runs collection cycles against one Airthings account.
///
/// A cycle lists the devices, then fetches the latest sample and the
/// details of each device one after the other. Cycles take `&mut self`, so a
/// collector never runs two at once.
pub struct Collector {
    api: ApiClient,
    tokens: TokenProvider,
    show_inactive: bool,
}

impl Collector {
    pub fn new(config: &Config) -> Result<Self> {
        let http = airthings::build_http_client(config)?;
        let tokens = TokenProvider::new(
            http.clone(),
            config.token_url.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
            config.scopes.clone(),
        );
        Ok(Self {
            api: ApiClient::new(http, &config.api_url),
            tokens,
            show_inactive: config.show_inactive,
        })
    }

    /// Collects one record per device. The first failure aborts the cycle
    /// and drops the records built so far.
    pub async fn gather(&mut self) -> CollectResult<Vec<MetricRecord>> {
        let token = self.tokens.token().await?;
        let token = token.access_token.as_str();

        let devices = airthings::list_devices(&self.api, token, self.show_inactive).await?;
        tracing::debug!(devices = devices.len(), "fetched device list");

        let mut records = Vec::with_capacity(devices.len());
        for device in &devices {
            let sample = airthings::fetch_sample(&self.api, token, &device.id).await?;
            let details = airthings::fetch_details(&self.api, token, &device.id).await?;
            tracing::debug!(
                device = %device.id,
                device_type = %device.device_type,
                sample_values = sample.values.len(),
                detail_attributes = details.len(),
                "fetched device data"
            );
            records.push(record::merge(device, &sample, &details));
        }
        Ok(records)
    }

    /// Gathers under `step_timeout` and hands the records to `sink` only when
    /// the whole cycle succeeded. Returns the number of records emitted.
    pub async fn run_cycle<S: MetricSink>(
        &mut self,
        sink: &mut S,
        step_timeout: Duration,
    ) -> Result<usize> {
        let span = tracing::info_span!("collect_cycle");
        let started = Instant::now();
        let records = match tokio::time::timeout(step_timeout, self.gather().instrument(span)).await {
            Ok(Ok(records)) => records,
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                return Err(anyhow!(
                    "collection cycle exceeded step timeout of {}s",
                    step_timeout.as_secs_f64()
                ))
            }
        };

        sink.emit(&records)?;
        tracing::info!(
            records = records.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "collection cycle complete"
        );
        Ok(records.len())
    }
}
