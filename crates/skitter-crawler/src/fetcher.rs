use std::io::prelude::*;
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use crate::config::RequestTemplate;
use crate::error::FetchError;
use crate::handler::Document;

/// Retrieves the content behind a URL.
///
/// Timeouts are the fetcher's business, the crawler only sees them as errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, request: &RequestTemplate) -> Result<Document, FetchError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetcherConfig {
    /// Whole request timeout, in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

fn default_timeout() -> f64 {
    30.0
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(config: &FetcherConfig) -> anyhow::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .gzip(true)
            .deflate(true)
            .timeout(Duration::try_from_secs_f64(config.timeout)?)
            .build()?;
        Ok(Self { client })
    }

    fn request(
        &self,
        url: &str,
        template: &RequestTemplate,
    ) -> Result<reqwest::RequestBuilder, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let method = template.method().map_err(|e| FetchError::Other(e.into()))?;
        let headers = template
            .header_map()
            .map_err(|e| FetchError::Other(e.into()))?;
        Ok(self.client.request(method, parsed).headers(headers))
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, request: &RequestTemplate) -> Result<Document, FetchError> {
        let request_err = |source: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let resp = self.request(url, request)?.send().await.map_err(request_err)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let gzipped = matches!(
            resp.headers().get(CONTENT_TYPE),
            Some(c) if c == "application/x-gzip" || c == "application/gzip"
        );
        let body = resp.bytes().await.map_err(request_err)?;

        let content = if gzipped {
            let mut gz = GzDecoder::new(&body[..]);
            let mut content = Vec::new();
            gz.read_to_end(&mut content)
                .map_err(|e| anyhow::anyhow!("Couldn't decompress {url} got: {e}"))?;
            content
        } else {
            body.to_vec()
        };

        Ok(Document::new(url, content))
    }
}
