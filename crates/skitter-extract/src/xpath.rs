use ego_tree::iter::Children;
use lazy_static::lazy_static;
use scraper::node::{Element, Node};
use scraper::Html;
use sxd_document::{dom, Package};
use sxd_xpath::{Context, Factory, Value, XPath};

use crate::error::ExtractError;
use crate::nodes::{Extract, Nodes};

lazy_static! {
    static ref XP_FACTORY: Factory = Factory::new();
}

/// Queries HTML pages with XPath 1.0.
///
/// The page is parsed leniently as HTML, then copied into an XML document where element
/// and attribute names carry no namespace, so `//a/@href` matches as written.
pub struct XPathExtractor {
    package: Package,
}

impl XPathExtractor {
    pub fn parse(page: &str) -> Self {
        let html = Html::parse_document(page);
        let package = Package::new();
        mirror(&html, &package.as_document());
        Self { package }
    }

    pub(crate) fn compile(query: &str) -> Result<XPath, ExtractError> {
        let invalid = |reason: String| ExtractError::InvalidXPath {
            query: query.to_string(),
            reason,
        };
        XP_FACTORY
            .build(query)
            .map_err(|e| invalid(e.to_string()))?
            .ok_or_else(|| invalid("empty expression".into()))
    }
}

impl Extract for XPathExtractor {
    fn extract(&self, query: &str) -> Result<Nodes<'_>, ExtractError> {
        let xpath = Self::compile(query)?;
        let document = self.package.as_document();
        let value = xpath
            .evaluate(&Context::new(), document.root())
            .map_err(|e| ExtractError::Evaluation {
                query: query.to_string(),
                reason: e.to_string(),
            })?;

        match value {
            Value::Nodeset(nodes) => Ok(Nodes::Xml(nodes.document_order())),
            other => Err(ExtractError::NotANodeset {
                query: query.to_string(),
                kind: match other {
                    Value::Boolean(_) => "boolean",
                    Value::Number(_) => "number",
                    _ => "string",
                },
            }),
        }
    }
}

/// Copies the element tree under `<html>`, keeping attributes, text and comments.
fn mirror(html: &Html, document: &dom::Document<'_>) {
    let root = html.root_element();
    let top = element(document, root.value());
    document.root().append_child(top);

    let mut stack: Vec<(Children<'_, Node>, dom::Element<'_>)> = vec![(root.children(), top)];
    while let Some((children, parent)) = stack.last_mut() {
        let Some(child) = children.next() else {
            stack.pop();
            continue;
        };
        let parent = *parent;
        match child.value() {
            Node::Element(elem) => {
                let copy = element(document, elem);
                parent.append_child(copy);
                stack.push((child.children(), copy));
            }
            Node::Text(text) => parent.append_child(document.create_text(&text.text)),
            Node::Comment(comment) => {
                parent.append_child(document.create_comment(&comment.comment))
            }
            _ => (),
        }
    }
}

fn element<'d>(document: &dom::Document<'d>, elem: &Element) -> dom::Element<'d> {
    let copy = document.create_element(elem.name());
    for (name, value) in elem.attrs() {
        copy.set_attribute_value(name, value);
    }
    copy
}
