//! Rule-driven extraction of items and links from fetched pages.
//!
//! Pages are queried either with CSS selectors or with XPath expressions, see [`Backend`].

mod css;
mod error;
mod nodes;
mod rules;
mod xpath;

pub use css::CssExtractor;
pub use error::ExtractError;
pub use nodes::{Extract, Nodes};
pub use rules::{Backend, ExtractionRules, RulesHandler, URL_COLUMN};
pub use xpath::XPathExtractor;
