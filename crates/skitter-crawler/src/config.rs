use std::cmp;
use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    #[serde(default)]
    pub start_urls: Vec<String>,

    #[serde(default = "default_num_workers")]
    pub crawl_workers: usize,

    #[serde(default = "default_num_workers")]
    pub parse_workers: usize,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub request: RequestTemplate,

    #[serde(default = "default_handle_sigint")]
    pub handle_sigint: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_urls: vec![],
            crawl_workers: default_num_workers(),
            parse_workers: default_num_workers(),
            retry: RetryPolicy::default(),
            request: RequestTemplate::default(),
            handle_sigint: default_handle_sigint(),
        }
    }
}

impl RunConfig {
    /// Checks everything that would prevent a run from making progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_urls.is_empty() {
            return Err(ConfigError::NoStartUrls);
        }
        if self.crawl_workers == 0 {
            return Err(ConfigError::NoWorkers("crawl"));
        }
        if self.parse_workers == 0 {
            return Err(ConfigError::NoWorkers("parse"));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.retry.multiplier));
        }
        self.request.method()?;
        self.request.header_map()?;
        Ok(())
    }
}

fn default_num_workers() -> usize {
    cmp::max(1, num_cpus::get())
}

fn default_handle_sigint() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in seconds
    #[serde(default = "default_base_delay", with = "secs_f64")]
    pub base_delay: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTemplate {
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self {
            method: default_method(),
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
        }
    }
}

impl RequestTemplate {
    pub fn method(&self) -> Result<Method, ConfigError> {
        Method::from_bytes(self.method.as_bytes())
            .map_err(|e| ConfigError::InvalidRequest(format!("method {:?}: {e}", self.method)))
    }

    /// The user agent and every extra header, as sent with each request.
    pub fn header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&self.user_agent).map_err(|e| {
            ConfigError::InvalidRequest(format!("user agent {:?}: {e}", self.user_agent))
        })?;
        headers.insert(USER_AGENT, user_agent);

        for (name, value) in &self.headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConfigError::InvalidRequest(format!("header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ConfigError::InvalidRequest(format!("value of header {name}: {e}"))
            })?;
            headers.insert(header, value);
        }
        Ok(headers)
    }
}

fn default_method() -> String {
    String::from("GET")
}

fn default_user_agent() -> String {
    String::from("SkitterBot")
}

mod secs_f64 {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}
