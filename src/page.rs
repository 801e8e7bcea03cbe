//! Per-document session state.

use ego_tree::NodeId;
use html5ever::{LocalName, Namespace, QualName};
use scraper::node::{Node, Text};
use scraper::{ElementRef, Html, Selector};

/// Attribute written on `<body>` of a rewritten document.
pub const PROCESSED_ATTRIBUTE: &str = "data-pirate-rewritten";

/// A parsed page plus the marker recording whether it has been rewritten.
///
/// The session lives exactly as long as the loaded document: build a new one for every
/// page load and the marker starts fresh.
#[derive(Debug)]
pub struct PageSession {
    document: Html,
    processed: bool,
}

impl PageSession {
    /// Parses a full HTML document into a new session.
    pub fn parse(html: &str) -> Self {
        Self::from_document(Html::parse_document(html))
    }

    /// Wraps an already parsed document.
    ///
    /// A body carrying [`PROCESSED_ATTRIBUTE`] was written by an earlier successful run and
    /// starts out processed.
    pub fn from_document(document: Html) -> Self {
        let processed = carries_marker(&document);
        Self {
            document,
            processed,
        }
    }

    /// Read access to the parsed document.
    pub fn document(&self) -> &Html {
        &self.document
    }

    /// True once a rewrite has been applied to this document.
    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// Records a successful rewrite and stamps [`PROCESSED_ATTRIBUTE`] onto `<body>`.
    pub(crate) fn mark_processed(&mut self) {
        self.processed = true;
        let Some(body) = body_of(&self.document).map(|body| body.id()) else {
            return;
        };
        if let Some(mut node) = self.document.tree.get_mut(body) {
            if let Node::Element(element) = node.value() {
                element.attrs.insert(
                    QualName::new(None, Namespace::from(""), LocalName::from(PROCESSED_ATTRIBUTE)),
                    "true".into(),
                );
            }
        }
    }

    /// True while `node` is still reachable from the document root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        let root = self.document.tree.root().id();
        match self.document.tree.get(node) {
            Some(found) if found.id() == root => true,
            Some(found) => found.ancestors().any(|ancestor| ancestor.id() == root),
            None => false,
        }
    }

    /// Replaces every child of `node` with a single text node holding `text`.
    ///
    /// Returns `false` without touching anything when the node is detached.
    pub fn replace_text(&mut self, node: NodeId, text: &str) -> bool {
        if !self.is_attached(node) {
            return false;
        }
        let Some(mut target) = self.document.tree.get_mut(node) else {
            return false;
        };
        while let Some(mut child) = target.first_child() {
            child.detach();
        }
        target.append(Node::Text(Text { text: text.into() }));
        true
    }

    /// Removes `node` and its subtree from the document, as a script on the page might.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(mut target) = self.document.tree.get_mut(node) {
            target.detach();
        }
    }

    /// Serializes the current document.
    pub fn to_html(&self) -> String {
        self.document.html()
    }
}

fn body_of(document: &Html) -> Option<ElementRef<'_>> {
    let body = Selector::parse("body").ok()?;
    document.select(&body).next()
}

fn carries_marker(document: &Html) -> bool {
    body_of(document)
        .map(|body| body.value().attr(PROCESSED_ATTRIBUTE).is_some())
        .unwrap_or(false)
}
