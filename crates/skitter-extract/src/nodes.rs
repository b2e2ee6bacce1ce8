use scraper::ElementRef;
use sxd_xpath::nodeset::Node;

use crate::error::ExtractError;

/// Result of a query, borrowing from the parsed page.
#[derive(Debug, Clone)]
pub enum Nodes<'a> {
    Css(Vec<ElementRef<'a>>),
    Xml(Vec<Node<'a>>),
}

impl<'a> Nodes<'a> {
    pub fn len(&self) -> usize {
        match self {
            Self::Css(elems) => elems.len(),
            Self::Xml(nodes) => nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text content of every node, in document order.
    pub fn texts(&self) -> Vec<String> {
        match self {
            Self::Css(elems) => elems.iter().map(|e| e.text().collect()).collect(),
            Self::Xml(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
        }
    }

    /// Link targets: the `href` of CSS matches, the string value of XPath matches.
    pub fn links(&self) -> Vec<String> {
        match self {
            Self::Css(elems) => elems
                .iter()
                .filter_map(|e| e.value().attr("href"))
                .map(String::from)
                .collect(),
            Self::Xml(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
        }
    }
}

/// A parsed page that can be queried.
pub trait Extract {
    fn extract(&self, query: &str) -> Result<Nodes<'_>, ExtractError>;
}
