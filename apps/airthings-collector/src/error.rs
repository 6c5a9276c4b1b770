use thiserror::Error;

/// Failure of one collection cycle. Every variant aborts the cycle; the
/// scheduler logs it and tries again on the next tick.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("token exchange failed: {0}")]
    Auth(String),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("received HTTP status code {code} from {url:?}; expected 200")]
    HttpStatus { code: u16, url: String },
    #[error("failed to decode {what}: {detail}")]
    Decode { what: String, detail: String },
    #[error("no key '{field}' in json data from device {device}")]
    MissingField { field: &'static str, device: String },
}

impl CollectError {
    pub fn decode(what: impl Into<String>, detail: impl ToString) -> Self {
        Self::Decode {
            what: what.into(),
            detail: detail.to_string(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type CollectResult<T> = Result<T, CollectError>;
