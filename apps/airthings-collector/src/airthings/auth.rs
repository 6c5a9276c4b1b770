use crate::error::{CollectError, CollectResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fmt;
use tokio::sync::Mutex;

const MAX_ERROR_BODY_CHARS: usize = 256;

/// Bearer credential from the client-credentials grant.
#[derive(Clone)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub scope: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expiry", &self.expiry)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    expires_in: Option<JsonValue>,
}

/// Obtains one token lazily and holds it for the provider's lifetime.
///
/// The cache sits behind an async mutex that stays locked during the
/// exchange, so concurrent callers wait for a single in-flight request
/// instead of each starting their own.
pub struct TokenProvider {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    cached: Mutex<Option<Token>>,
}

impl TokenProvider {
    pub fn new(
        http: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes,
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> CollectResult<Token> {
        let mut guard = self.cached.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.is_expired(Utc::now()) {
                tracing::warn!(
                    expiry = ?token.expiry,
                    "cached Airthings token is past its expiry; upstream may reject it"
                );
            }
            return Ok(token.clone());
        }

        let token = self.exchange().await?;
        tracing::info!(
            token_type = %token.token_type,
            scope = token.scope.as_deref().unwrap_or(""),
            expiry = ?token.expiry,
            "obtained Airthings access token"
        );
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn exchange(&self) -> CollectResult<Token> {
        let mut form: Vec<(&str, String)> = vec![("grant_type", "client_credentials".to_string())];
        if !self.scopes.is_empty() {
            form.push(("scope", self.scopes.join(" ")));
        }

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(
                query_escape(&self.client_id),
                Some(query_escape(&self.client_secret)),
            )
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|err| CollectError::Auth(format!("request to {} failed: {err}", self.token_url)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let body = response
            .bytes()
            .await
            .map_err(|err| CollectError::Auth(format!("failed to read token response: {err}")))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            let snippet: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(CollectError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                snippet.trim()
            )));
        }

        parse_token_response(&content_type, &body, Utc::now())
    }
}

fn query_escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn parse_token_response(
    content_type: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> CollectResult<Token> {
    let parsed = if content_type.contains("application/x-www-form-urlencoded")
        || content_type.contains("text/plain")
    {
        let mut parsed = TokenResponse::default();
        for (key, value) in url::form_urlencoded::parse(body) {
            match key.as_ref() {
                "access_token" => parsed.access_token = value.into_owned(),
                "token_type" => parsed.token_type = Some(value.into_owned()),
                "scope" => parsed.scope = Some(value.into_owned()),
                "expires_in" => parsed.expires_in = Some(JsonValue::String(value.into_owned())),
                _ => {}
            }
        }
        parsed
    } else {
        serde_json::from_slice::<TokenResponse>(body)
            .map_err(|err| CollectError::Auth(format!("malformed token response: {err}")))?
    };

    let access_token = parsed.access_token.trim().to_string();
    if access_token.is_empty() {
        return Err(CollectError::Auth(
            "token response did not include an access_token".to_string(),
        ));
    }

    let expiry = parsed
        .expires_in
        .as_ref()
        .and_then(expires_in_seconds)
        .filter(|secs| *secs > 0)
        .map(|secs| now + ChronoDuration::seconds(secs));

    Ok(Token {
        access_token,
        token_type: parsed
            .token_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Bearer".to_string()),
        scope: parsed.scope.filter(|s| !s.trim().is_empty()),
        expiry,
    })
}

fn expires_in_seconds(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(num) => num.as_i64().or_else(|| num.as_f64().map(|f| f as i64)),
        JsonValue::String(raw) => raw.trim().parse::<i64>().ok(),
        _ => None,
    }
}
