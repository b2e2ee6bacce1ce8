use thiserror::Error;

/// Errors that prevent a run from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid run config, `startUrls` is empty")]
    NoStartUrls,

    #[error("Invalid run config, need at least one {0} worker")]
    NoWorkers(&'static str),

    #[error("Invalid run config, backoff multiplier must be >= 1, got {0}")]
    InvalidMultiplier(f64),

    #[error("Invalid run config, bad request {0}")]
    InvalidRequest(String),
}

/// Failure reported by a [`Fetcher`](crate::Fetcher).
///
/// Only [`FetchError::InvalidUrl`] is final, everything else is retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Malformed URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Got HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidUrl { .. })
    }
}
