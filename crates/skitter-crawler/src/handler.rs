use std::borrow::Cow;
use std::collections::BTreeMap;

/// One extracted record, keyed by field name.
pub type Item = BTreeMap<String, String>;

/// A successfully fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub url: String,
    pub content: Vec<u8>,
}

impl Document {
    pub fn new(url: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
        }
    }

    /// The content decoded as UTF-8, invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    pub items: Vec<Item>,
    pub discovered_urls: Vec<String>,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.discovered_urls.is_empty()
    }
}

/// Turns a fetched document into items and further URLs to crawl.
///
/// Called concurrently from every parse worker. Errors (and panics) are caught by the
/// crawler and count as an empty result.
pub trait ParseHandler: Send + Sync {
    fn parse(&self, document: &Document) -> anyhow::Result<ParseResult>;
}

/// Receives extracted items, possibly from several parse workers at once.
pub trait ItemSink: Send + Sync {
    fn accept(&self, item: Item) -> anyhow::Result<()>;
}

impl<F> ParseHandler for F
where
    F: Fn(&Document) -> anyhow::Result<ParseResult> + Send + Sync,
{
    fn parse(&self, document: &Document) -> anyhow::Result<ParseResult> {
        self(document)
    }
}

/// Drops every item, for crawls that only care about discovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl ItemSink for DiscardSink {
    fn accept(&self, _item: Item) -> anyhow::Result<()> {
        Ok(())
    }
}
