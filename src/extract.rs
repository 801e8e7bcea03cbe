//! Selection of rewritable article text inside an HTML document.
//!
//! Extraction is driven entirely by [`ExtractionRules`]: an ordered list of scope selectors
//! (first match wins), a candidate tag set, and boilerplate markers. Candidates are visited
//! in document order and that order is the only link between a segment and its element.

use std::collections::HashSet;
use std::fmt;

use ego_tree::NodeId;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::style::InlineStyle;

/// Structural selectors tried in order when looking for the main content region.
pub const SCOPE_SELECTORS: &[&str] = &[
    "article",
    "main",
    ".main-content",
    "#main-content",
    ".post-content",
    "#post-content",
    ".entry-content",
    ".td-post-content",
    ".story-content",
    "div[itemprop=\"articleBody\"]",
];

/// Text-bearing tags always considered.
pub const STRICT_CANDIDATE_TAGS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "li"];

/// Generic containers added by [`CandidateSet::Loose`].
pub const LOOSE_EXTRA_TAGS: &[&str] = &["span", "div"];

/// Elements whose subtree never holds article text.
pub const BOILERPLATE_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript",
];

/// ARIA landmark roles equivalent to [`BOILERPLATE_TAGS`].
pub const BOILERPLATE_ROLES: &[&str] = &["navigation", "banner", "complementary", "contentinfo"];

/// Class or id prefixes marking ads, comment threads, related links and author blurbs.
pub const BOILERPLATE_PREFIXES: &[&str] = &[
    "ad-",
    "ads-",
    "advert",
    "sponsor",
    "promo",
    "comment",
    "related",
    "author-bio",
    "share",
    "social",
    "newsletter",
    "sidebar",
    "breadcrumb",
    "cookie",
];

/// Minimum trimmed character count for a segment.
pub const DEFAULT_MIN_CHARS: usize = 15;

/// Which tags are enumerated as candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidateSet {
    /// Paragraphs, headings and list items.
    #[default]
    Strict,
    /// The strict set plus `span` and `div` containers.
    Loose,
}

impl CandidateSet {
    fn tags(self) -> Vec<&'static str> {
        let mut tags = STRICT_CANDIDATE_TAGS.to_vec();
        if self == Self::Loose {
            tags.extend_from_slice(LOOSE_EXTRA_TAGS);
        }
        tags
    }
}

/// Data-driven extraction heuristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRules {
    /// Scope selectors in priority order.
    pub scope_selectors: Vec<String>,
    /// Candidate tag set.
    pub candidates: CandidateSet,
    /// Tag names that exclude every candidate beneath them.
    pub boilerplate_tags: Vec<String>,
    /// `role` attribute values that exclude every candidate beneath them.
    pub boilerplate_roles: Vec<String>,
    /// Lowercase class/id prefixes that exclude every candidate beneath them.
    pub boilerplate_prefixes: Vec<String>,
    /// Minimum trimmed length, in characters.
    pub min_chars: usize,
    /// Also reject candidates containing any hidden descendant.
    pub check_hidden_descendants: bool,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            scope_selectors: to_owned(SCOPE_SELECTORS),
            candidates: CandidateSet::default(),
            boilerplate_tags: to_owned(BOILERPLATE_TAGS),
            boilerplate_roles: to_owned(BOILERPLATE_ROLES),
            boilerplate_prefixes: to_owned(BOILERPLATE_PREFIXES),
            min_chars: DEFAULT_MIN_CHARS,
            check_hidden_descendants: true,
        }
    }
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// One piece of original text and the element it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSegment {
    /// Handle of the originating element inside the parsed document.
    #[serde(skip)]
    pub node: NodeId,
    /// Tag name of the originating element.
    pub tag: String,
    /// Trimmed full text content of the element.
    pub original_text: String,
}

/// Ordered segments found in a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    /// Scope rule that matched, `body`, or `document` when nothing narrower existed.
    pub scope: String,
    /// Accepted segments in document order.
    pub segments: Vec<TextSegment>,
}

impl ExtractionResult {
    /// True when nothing qualified for rewriting.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of accepted segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Original texts in segment order.
    pub fn texts(&self) -> Vec<&str> {
        self.segments
            .iter()
            .map(|segment| segment.original_text.as_str())
            .collect()
    }
}

/// Errors raised while compiling [`ExtractionRules`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// A scope or candidate selector failed to parse.
    InvalidSelector {
        /// Offending selector text.
        selector: String,
        /// Parser diagnostic.
        reason: String,
    },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSelector { selector, reason } => {
                write!(f, "invalid selector '{selector}': {reason}")
            }
        }
    }
}

impl std::error::Error for ExtractError {}

/// Compiled extractor. Cheap to clone and reuse across documents.
#[derive(Debug, Clone)]
pub struct Extractor {
    rules: ExtractionRules,
    scopes: Vec<(String, Selector)>,
    body: Selector,
    candidates: Selector,
}

impl Extractor {
    /// Compiles the selectors named by `rules`.
    pub fn new(rules: ExtractionRules) -> Result<Self, ExtractError> {
        let scopes = rules
            .scope_selectors
            .iter()
            .map(|raw| parse_selector(raw).map(|selector| (raw.clone(), selector)))
            .collect::<Result<Vec<_>, _>>()?;
        let body = parse_selector("body")?;
        let candidates = parse_selector(&rules.candidates.tags().join(", "))?;
        Ok(Self {
            rules,
            scopes,
            body,
            candidates,
        })
    }

    /// Collects rewritable segments from `document` in document order.
    pub fn extract(&self, document: &Html) -> ExtractionResult {
        let (scope, root) = self.scope_root(document);
        let mut accepted: Vec<TextSegment> = Vec::new();
        let mut accepted_ids: HashSet<NodeId> = HashSet::new();

        for candidate in root.select(&self.candidates) {
            if self.is_boilerplate(&candidate) || !is_laid_out(&candidate) {
                continue;
            }
            let full_text: String = candidate.text().collect();
            let trimmed = full_text.trim();
            if char_len(trimmed) < self.rules.min_chars {
                continue;
            }
            if overlaps_accepted(document, &candidate, &accepted_ids) {
                continue;
            }
            if !self.has_own_text(&candidate, trimmed) {
                continue;
            }
            if self.is_concealed(&candidate, &root) {
                continue;
            }

            accepted_ids.insert(candidate.id());
            accepted.push(TextSegment {
                node: candidate.id(),
                tag: candidate.value().name().to_string(),
                original_text: trimmed.to_string(),
            });
        }

        tracing::debug!(scope = %scope, segments = accepted.len(), "extracted page text");
        ExtractionResult {
            scope,
            segments: accepted,
        }
    }

    fn scope_root<'a>(&self, document: &'a Html) -> (String, ElementRef<'a>) {
        for (name, selector) in &self.scopes {
            if let Some(element) = document.select(selector).next() {
                return (name.clone(), element);
            }
        }
        match document.select(&self.body).next() {
            Some(body) => ("body".to_string(), body),
            None => ("document".to_string(), document.root_element()),
        }
    }

    fn is_boilerplate(&self, candidate: &ElementRef<'_>) -> bool {
        self_and_ancestors(candidate).any(|element| self.is_boilerplate_element(&element))
    }

    fn is_boilerplate_element(&self, element: &ElementRef<'_>) -> bool {
        let value = element.value();
        if self
            .rules
            .boilerplate_tags
            .iter()
            .any(|tag| tag.eq_ignore_ascii_case(value.name()))
        {
            return true;
        }
        if let Some(role) = value.attr("role") {
            let role = role.trim();
            if self
                .rules
                .boilerplate_roles
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(role))
            {
                return true;
            }
        }
        // Page-wide classes on the document shell say nothing about a region.
        if matches!(value.name(), "html" | "body") {
            return false;
        }
        value
            .classes()
            .chain(value.id())
            .any(|name| self.has_boilerplate_prefix(name))
    }

    fn has_boilerplate_prefix(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.rules
            .boilerplate_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    // Own text excludes anything nested in child elements, so wrappers around
    // already-captured children never qualify on their descendants' text alone.
    fn has_own_text(&self, candidate: &ElementRef<'_>, full_trimmed: &str) -> bool {
        let mut own = String::new();
        let mut has_element_children = false;
        for child in candidate.children() {
            match child.value() {
                Node::Text(text) => own.push_str(text),
                Node::Element(_) => has_element_children = true,
                _ => {}
            }
        }
        if char_len(own.trim()) >= self.rules.min_chars {
            return true;
        }
        !has_element_children && char_len(full_trimmed) >= self.rules.min_chars
    }

    fn is_concealed(&self, candidate: &ElementRef<'_>, root: &ElementRef<'_>) -> bool {
        for element in self_and_ancestors(candidate) {
            if InlineStyle::of(element.value()).is_concealed() {
                return true;
            }
            if element.id() == root.id() {
                break;
            }
        }
        if !self.rules.check_hidden_descendants {
            return false;
        }
        candidate
            .descendent_elements()
            .filter(|element| element.id() != candidate.id())
            .any(|element| {
                let style = InlineStyle::of(element.value());
                style.is_concealed() || style.is_unrendered()
            })
    }
}

fn parse_selector(raw: &str) -> Result<Selector, ExtractError> {
    Selector::parse(raw).map_err(|err| ExtractError::InvalidSelector {
        selector: raw.to_string(),
        reason: format!("{err:?}"),
    })
}

fn self_and_ancestors<'a>(element: &ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    std::iter::once(*element).chain(element.ancestors().filter_map(ElementRef::wrap))
}

fn is_laid_out(candidate: &ElementRef<'_>) -> bool {
    !self_and_ancestors(candidate).any(|element| InlineStyle::of(element.value()).is_unrendered())
}

fn overlaps_accepted(document: &Html, candidate: &ElementRef<'_>, accepted: &HashSet<NodeId>) -> bool {
    if accepted.is_empty() {
        return false;
    }
    if candidate
        .ancestors()
        .any(|ancestor| accepted.contains(&ancestor.id()))
    {
        return true;
    }
    accepted.iter().any(|id| {
        document
            .tree
            .get(*id)
            .map(|node| node.ancestors().any(|ancestor| ancestor.id() == candidate.id()))
            .unwrap_or(false)
    })
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
