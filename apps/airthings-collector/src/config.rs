use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "/etc/airthings-collector/config.json";
const DEFAULT_API_URL: &str = "https://ext-api.airthings.com/v1/";
const DEFAULT_TOKEN_URL: &str = "https://accounts-api.airthings.com/v1/token";
const DEFAULT_SCOPE: &str = "read:device:current_values";
const DEFAULT_TIMEOUT_MS: u64 = 5_000;
// The consumer API allows 120 requests per hour.
const DEFAULT_INTERVAL_SECS: u64 = 35;

fn config_path() -> PathBuf {
    if let Ok(path) = env::var("AIRTHINGS_CONFIG_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigOverrides {
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "showInactive")]
    show_inactive: Option<bool>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    token_url: Option<String>,
    #[serde(default)]
    scopes: Option<Vec<String>>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    interval_secs: Option<u64>,
    #[serde(default)]
    cycle_timeout_secs: Option<u64>,
    #[serde(default)]
    tls_ca: Option<String>,
    #[serde(default)]
    tls_cert: Option<String>,
    #[serde(default)]
    tls_key: Option<String>,
    #[serde(default)]
    insecure_skip_verify: Option<bool>,
}

/// Reads the override file. A missing file is `Ok(None)`; a file that cannot
/// be read or parsed is an error for the caller to report.
fn load_config_overrides(path: &std::path::Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let mut bytes = contents.into_bytes();
    let overrides = simd_json::serde::from_slice(&mut bytes)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(Some(overrides))
}

fn env_is_set(key: &str) -> bool {
    env_optional(key).is_some()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Applies file overrides for every key whose environment variable is unset.
fn apply_overrides(config: &mut Config, overrides: &ConfigOverrides, env_allows: impl Fn(&str) -> bool) {
    if env_allows("AIRTHINGS_URL") {
        if let Some(url) = non_empty(overrides.url.as_deref()) {
            config.api_url = url;
        }
    }
    if env_allows("AIRTHINGS_SHOW_INACTIVE") {
        if let Some(value) = overrides.show_inactive {
            config.show_inactive = value;
        }
    }
    if env_allows("AIRTHINGS_CLIENT_ID") {
        if let Some(value) = non_empty(overrides.client_id.as_deref()) {
            config.client_id = value;
        }
    }
    if env_allows("AIRTHINGS_CLIENT_SECRET") {
        if let Some(value) = non_empty(overrides.client_secret.as_deref()) {
            config.client_secret = value;
        }
    }
    if env_allows("AIRTHINGS_TOKEN_URL") {
        if let Some(value) = non_empty(overrides.token_url.as_deref()) {
            config.token_url = value;
        }
    }
    if env_allows("AIRTHINGS_SCOPES") {
        if let Some(scopes) = overrides.scopes.as_ref() {
            config.scopes = scopes
                .iter()
                .map(|scope| scope.trim().to_string())
                .filter(|scope| !scope.is_empty())
                .collect();
        }
    }
    if env_allows("AIRTHINGS_TIMEOUT_MS") {
        if let Some(value) = overrides.timeout_ms.filter(|v| *v != 0) {
            config.timeout_ms = value;
        }
    }
    let mut interval_overridden = false;
    if env_allows("AIRTHINGS_INTERVAL_SECS") {
        if let Some(value) = overrides.interval_secs.filter(|v| *v != 0) {
            config.interval_secs = value;
            interval_overridden = true;
        }
    }
    if env_allows("AIRTHINGS_CYCLE_TIMEOUT_SECS") {
        if let Some(value) = overrides.cycle_timeout_secs.filter(|v| *v != 0) {
            config.cycle_timeout_secs = value;
        } else if interval_overridden {
            config.cycle_timeout_secs = config.interval_secs;
        }
    }
    if env_allows("AIRTHINGS_TLS_CA") {
        if let Some(value) = non_empty(overrides.tls_ca.as_deref()) {
            config.tls.ca_path = Some(PathBuf::from(value));
        }
    }
    if env_allows("AIRTHINGS_TLS_CERT") {
        if let Some(value) = non_empty(overrides.tls_cert.as_deref()) {
            config.tls.cert_path = Some(PathBuf::from(value));
        }
    }
    if env_allows("AIRTHINGS_TLS_KEY") {
        if let Some(value) = non_empty(overrides.tls_key.as_deref()) {
            config.tls.key_path = Some(PathBuf::from(value));
        }
    }
    if env_allows("AIRTHINGS_INSECURE_SKIP_VERIFY") {
        if let Some(value) = overrides.insecure_skip_verify {
            config.tls.insecure_skip_verify = value;
        }
    }
}

/// Optional TLS client settings for the API and token transports.
#[derive(Clone, Debug, Default)]
pub struct TlsSettings {
    pub ca_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub insecure_skip_verify: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub show_inactive: bool,
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub timeout_ms: u64,
    pub interval_secs: u64,
    pub cycle_timeout_secs: u64,
    pub tls: TlsSettings,
    pub otlp_endpoint: Option<String>,
    /// Why the override file was ignored. Logged once tracing is up.
    pub override_warning: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let interval_secs = env_u64("AIRTHINGS_INTERVAL_SECS", DEFAULT_INTERVAL_SECS)?;
        let mut config = Self {
            api_url: env_optional("AIRTHINGS_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            show_inactive: env_bool("AIRTHINGS_SHOW_INACTIVE", true),
            client_id: env_optional("AIRTHINGS_CLIENT_ID").unwrap_or_default(),
            client_secret: env_optional("AIRTHINGS_CLIENT_SECRET").unwrap_or_default(),
            token_url: env_optional("AIRTHINGS_TOKEN_URL")
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            scopes: env_optional("AIRTHINGS_SCOPES")
                .map(|raw| parse_scopes(&raw))
                .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]),
            timeout_ms: env_u64("AIRTHINGS_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
            interval_secs,
            cycle_timeout_secs: env_u64("AIRTHINGS_CYCLE_TIMEOUT_SECS", interval_secs)?,
            tls: TlsSettings {
                ca_path: env_optional("AIRTHINGS_TLS_CA").map(PathBuf::from),
                cert_path: env_optional("AIRTHINGS_TLS_CERT").map(PathBuf::from),
                key_path: env_optional("AIRTHINGS_TLS_KEY").map(PathBuf::from),
                insecure_skip_verify: env_bool("AIRTHINGS_INSECURE_SKIP_VERIFY", false),
            },
            otlp_endpoint: env_optional("OTEL_EXPORTER_OTLP_ENDPOINT"),
            override_warning: None,
        };

        match load_config_overrides(&config_path()) {
            Ok(Some(overrides)) => apply_overrides(&mut config, &overrides, |key| !env_is_set(key)),
            Ok(None) => {}
            Err(err) => config.override_warning = Some(format!("{err:#}; using env defaults")),
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api_url).with_context(|| format!("invalid AIRTHINGS_URL {:?}", self.api_url))?;
        Url::parse(&self.token_url)
            .with_context(|| format!("invalid AIRTHINGS_TOKEN_URL {:?}", self.token_url))?;
        if self.client_id.trim().is_empty() {
            bail!("AIRTHINGS_CLIENT_ID is required (or present as client_id in the config file)");
        }
        if self.client_secret.trim().is_empty() {
            bail!("AIRTHINGS_CLIENT_SECRET is required (or present as client_secret in the config file)");
        }
        if self.interval_secs == 0 {
            bail!("AIRTHINGS_INTERVAL_SECS must be greater than zero");
        }
        if self.timeout_ms == 0 {
            bail!("AIRTHINGS_TIMEOUT_MS must be greater than zero");
        }
        if self.tls.cert_path.is_some() != self.tls.key_path.is_some() {
            bail!("AIRTHINGS_TLS_CERT and AIRTHINGS_TLS_KEY must be set together");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs.max(1))
    }

    /// Renders the resolved configuration with the client secret redacted.
    pub fn redacted(&self) -> String {
        let mut rendered = String::new();
        if let Some(warning) = &self.override_warning {
            rendered.push_str(&format!("# {warning}\n"));
        }
        rendered.push_str(&format!(
            "url = {:?}\nshowInactive = {}\nclient_id = {:?}\nclient_secret = \"<redacted>\"\ntoken_url = {:?}\nscopes = {:?}\ntimeout_ms = {}\ninterval_secs = {}\ncycle_timeout_secs = {}\ntls_ca = {:?}\ntls_cert = {:?}\ntls_key = {:?}\ninsecure_skip_verify = {}\n",
            self.api_url,
            self.show_inactive,
            self.client_id,
            self.token_url,
            self.scopes,
            self.timeout_ms,
            self.interval_secs,
            self.cycle_timeout_secs,
            self.tls.ca_path,
            self.tls.cert_path,
            self.tls.key_path,
            self.tls.insecure_skip_verify,
        ));
        rendered
    }
}

fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .map(|scope| scope.to_string())
        .collect()
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env_optional(key) {
        Some(value) => value.parse::<u64>().with_context(|| format!("invalid {key}")),
        None => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env_optional(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) fn test_config(api_url: &str, token_url: &str) -> Config {
    Config {
        api_url: api_url.to_string(),
        show_inactive: true,
        client_id: "clientid".to_string(),
        client_secret: "clientsecret".to_string(),
        token_url: token_url.to_string(),
        scopes: vec![DEFAULT_SCOPE.to_string()],
        timeout_ms: DEFAULT_TIMEOUT_MS,
        interval_secs: DEFAULT_INTERVAL_SECS,
        cycle_timeout_secs: DEFAULT_INTERVAL_SECS,
        tls: TlsSettings::default(),
        otlp_endpoint: None,
        override_warning: None,
    }
}
