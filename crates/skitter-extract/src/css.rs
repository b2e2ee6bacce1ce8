use scraper::{Html, Selector};

use crate::error::ExtractError;
use crate::nodes::{Extract, Nodes};

pub struct CssExtractor {
    html: Html,
}

impl CssExtractor {
    pub fn parse(page: &str) -> Self {
        Self {
            html: Html::parse_document(page),
        }
    }

    pub(crate) fn selector(query: &str) -> Result<Selector, ExtractError> {
        Selector::parse(query).map_err(|e| ExtractError::InvalidSelector {
            query: query.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Extract for CssExtractor {
    fn extract(&self, query: &str) -> Result<Nodes<'_>, ExtractError> {
        let selector = Self::selector(query)?;
        Ok(Nodes::Css(self.html.select(&selector).collect()))
    }
}
