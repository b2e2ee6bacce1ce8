use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid CSS selector `{query}`: {reason}")]
    InvalidSelector { query: String, reason: String },

    #[error("Invalid XPath `{query}`: {reason}")]
    InvalidXPath { query: String, reason: String },

    #[error("Couldn't evaluate XPath `{query}`: {reason}")]
    Evaluation { query: String, reason: String },

    #[error("XPath `{query}` returned a {kind}, expected a node-set")]
    NotANodeset { query: String, kind: &'static str },

    #[error("Field name `{0}` is reserved")]
    ReservedField(String),

    #[error("Invalid document URL {url}: {source}")]
    DocumentUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}
