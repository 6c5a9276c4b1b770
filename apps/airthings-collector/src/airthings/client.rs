use crate::config::{Config, TlsSettings};
use crate::error::{CollectError, CollectResult};
use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use reqwest::{Certificate, Client, Identity, StatusCode};
use std::time::Duration;

/// Builds the transport shared by the token exchange and the API calls.
pub fn build_http_client(config: &Config) -> Result<Client> {
    let builder = Client::builder()
        .use_rustls_tls()
        .timeout(config.timeout());
    apply_tls(builder, &config.tls)?
        .build()
        .context("failed to build HTTP client")
}

fn apply_tls(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsSettings,
) -> Result<reqwest::ClientBuilder> {
    if let Some(path) = tls.ca_path.as_ref() {
        let pem = std::fs::read(path)
            .with_context(|| format!("failed to read TLS CA {}", path.display()))?;
        let cert = Certificate::from_pem(&pem)
            .with_context(|| format!("invalid TLS CA {}", path.display()))?;
        builder = builder.add_root_certificate(cert);
    }
    if let (Some(cert_path), Some(key_path)) = (tls.cert_path.as_ref(), tls.key_path.as_ref()) {
        let mut pem = std::fs::read(cert_path)
            .with_context(|| format!("failed to read TLS cert {}", cert_path.display()))?;
        pem.push(b'\n');
        pem.extend(
            std::fs::read(key_path)
                .with_context(|| format!("failed to read TLS key {}", key_path.display()))?,
        );
        let identity = Identity::from_pem(&pem).context("invalid TLS client identity")?;
        builder = builder.identity(identity);
    }
    if tls.insecure_skip_verify {
        tracing::warn!("TLS certificate verification disabled for Airthings requests");
        builder = builder.danger_accept_invalid_certs(true);
    }
    Ok(builder)
}

/// Authenticated GET requests against the Airthings consumer API.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Returns the raw body of a 200 response. Any other status is an error
    /// and its body is not read.
    pub async fn request(
        &self,
        path: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> CollectResult<Vec<u8>> {
        let url = self.url_for(path);
        let mut request = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }

        let started = std::time::Instant::now();
        let response = request.send().await.map_err(|source| CollectError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(CollectError::HttpStatus {
                code: status.as_u16(),
                url,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| CollectError::Transport {
                url: url.clone(),
                source,
            })?;
        tracing::trace!(
            %url,
            len = body.len(),
            elapsed_ms = elapsed_ms(started.elapsed()),
            "airthings request complete"
        );
        Ok(body.to_vec())
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
