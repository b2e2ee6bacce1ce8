mod backoff;
mod config;
mod crawler;
mod error;
mod fetcher;
mod frontier;
mod handler;
mod pending;
mod report;
mod sink;

pub use config::{RequestTemplate, RetryPolicy, RunConfig};
pub use crawler::{crawl, Crawler};
pub use error::{ConfigError, FetchError};
pub use fetcher::{Fetcher, FetcherConfig, ReqwestFetcher};
pub use frontier::{Claim, Frontier, Retry, UrlRecord, UrlStatus};
pub use handler::{DiscardSink, Document, Item, ItemSink, ParseHandler, ParseResult};
pub use pending::PendingCounter;
pub use report::RunReport;
pub use sink::{CsvSink, CsvWriterConfig, LineEnding};

pub use anyhow;
pub use async_trait::async_trait;
