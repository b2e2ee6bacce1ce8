use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use skitter_crawler::{Document, Item, ParseHandler, ParseResult};
use url::Url;

use crate::css::CssExtractor;
use crate::error::ExtractError;
use crate::nodes::Extract;
use crate::xpath::XPathExtractor;

/// Column holding the page URL in every extracted item.
pub const URL_COLUMN: &str = "url";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Css,
    XPath,
}

impl Backend {
    /// Parses a page for this backend's queries.
    pub fn parse(self, page: &str) -> Box<dyn Extract> {
        match self {
            Self::Css => Box::new(CssExtractor::parse(page)),
            Self::XPath => Box::new(XPathExtractor::parse(page)),
        }
    }

    /// Checks that `query` is well formed, without a page at hand.
    pub fn check(self, query: &str) -> Result<(), ExtractError> {
        match self {
            Self::Css => CssExtractor::selector(query).map(|_| ()),
            Self::XPath => XPathExtractor::compile(query).map(|_| ()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRules {
    #[serde(default)]
    pub backend: Backend,

    /// Queries selecting links to follow
    #[serde(default)]
    pub links: Vec<String>,

    /// Field name to query, each field becomes a column
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Only follow links to the host of the page they were found on
    #[serde(default)]
    pub same_host: bool,
}

impl ExtractionRules {
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.fields.contains_key(URL_COLUMN) {
            return Err(ExtractError::ReservedField(URL_COLUMN.into()));
        }
        for query in self.links.iter().chain(self.fields.values()) {
            self.backend.check(query)?;
        }
        Ok(())
    }

    /// Columns of the extracted items, `url` first.
    pub fn columns(&self) -> Vec<String> {
        std::iter::once(URL_COLUMN.to_string())
            .chain(self.fields.keys().cloned())
            .collect()
    }
}

/// A [`ParseHandler`] applying [`ExtractionRules`] to every page.
#[derive(Debug, Clone)]
pub struct RulesHandler {
    rules: ExtractionRules,
}

impl RulesHandler {
    pub fn new(rules: ExtractionRules) -> Result<Self, ExtractError> {
        rules.validate()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &ExtractionRules {
        &self.rules
    }

    pub fn extract(&self, document: &Document) -> Result<ParseResult, ExtractError> {
        let base = Url::parse(&document.url).map_err(|source| ExtractError::DocumentUrl {
            url: document.url.clone(),
            source,
        })?;
        let page = self.rules.backend.parse(&document.text());

        let mut discovered_urls = vec![];
        let mut seen = HashSet::new();
        for query in &self.rules.links {
            for href in page.extract(query)?.links() {
                let Some(url) = self.resolve(&base, &href) else {
                    continue;
                };
                if seen.insert(url.clone()) {
                    discovered_urls.push(url);
                }
            }
        }

        let mut item = Item::new();
        for (field, query) in &self.rules.fields {
            let texts = page.extract(query)?.texts();
            item.insert(field.clone(), join_texts(&texts));
        }

        let items = if item.values().any(|v| !v.is_empty()) {
            item.insert(URL_COLUMN.into(), document.url.clone());
            vec![item]
        } else {
            vec![]
        };

        log::debug!(
            "Extracted {} items and {} links from {}",
            items.len(),
            discovered_urls.len(),
            document.url
        );
        Ok(ParseResult {
            items,
            discovered_urls,
        })
    }

    fn resolve(&self, base: &Url, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        let mut url = match base.join(href) {
            Ok(url) => url,
            Err(e) => {
                log::debug!("Skipping link {href} on {base}: {e}");
                return None;
            }
        };
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        if self.rules.same_host && url.host_str() != base.host_str() {
            return None;
        }
        url.set_fragment(None);
        Some(url.into())
    }
}

impl ParseHandler for RulesHandler {
    fn parse(&self, document: &Document) -> anyhow::Result<ParseResult> {
        Ok(self.extract(document)?)
    }
}

/// Collapses whitespace in each text and joins the non-empty ones with a space.
fn join_texts(texts: &[String]) -> String {
    texts
        .iter()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}
