//! One "piratify this page" run: extract, round-trip through the model, apply.

use std::fmt;

use serde::Serialize;

use crate::codec::ChunkCodec;
use crate::extract::Extractor;
use crate::llm::{RewriteClient, RewriteRequest};
use crate::page::PageSession;

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// The model could not be reached, answered with an error status, or sent no content.
    TransportError,
    /// The response split into a different number of segments than was sent.
    SegmentCountMismatch,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportError => write!(f, "transport error"),
            Self::SegmentCountMismatch => write!(f, "segment count mismatch"),
        }
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The page was rewritten earlier in this session.
    AlreadyProcessed,
    /// No element qualified for rewriting.
    NothingToRewrite,
    /// Every segment was applied.
    Success {
        /// Number of segments rewritten.
        count: usize,
    },
    /// The page was left untouched.
    Failure {
        /// Failure class.
        kind: ErrorKind,
        /// Human readable detail.
        detail: String,
    },
}

impl Outcome {
    /// True for [`Outcome::Failure`].
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Short status line for whatever UI triggered the run.
    pub fn status_message(&self) -> String {
        match self {
            Self::AlreadyProcessed => "🏴‍☠️ Page already piratified!".to_string(),
            Self::NothingToRewrite => "⚓ No text found to piratify.".to_string(),
            Self::Success { count } => {
                format!("🏴‍☠️ Page piratified! Rewrote {count} segment(s).")
            }
            Self::Failure {
                kind: ErrorKind::TransportError,
                detail,
            } => format!("☠️ Rewrite failed: {detail}"),
            Self::Failure {
                kind: ErrorKind::SegmentCountMismatch,
                detail,
            } => format!("⚠️ Arr, th' translation be muddled ({detail}); page left unchanged."),
        }
    }
}

/// Hooks for a UI that must disable its trigger while a run is in flight.
pub trait RunObserver {
    /// Called right before the request is dispatched.
    fn busy(&self, _segments: usize) {}

    /// Called once the in-flight run reaches its outcome.
    fn settled(&self, _outcome: &Outcome) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Drives extraction, the model round trip, validation and application.
pub struct Orchestrator<C> {
    extractor: Extractor,
    codec: ChunkCodec,
    client: C,
}

impl<C: RewriteClient> Orchestrator<C> {
    /// Builds an orchestrator using the default codec separator.
    pub fn new(extractor: Extractor, client: C) -> Self {
        Self::with_codec(extractor, ChunkCodec::new(), client)
    }

    /// Builds an orchestrator around a specific codec.
    pub fn with_codec(extractor: Extractor, codec: ChunkCodec, client: C) -> Self {
        Self {
            extractor,
            codec,
            client,
        }
    }

    /// The rewriting collaborator.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Runs once against `page` without an observer.
    pub async fn run(&self, page: &mut PageSession) -> Outcome {
        self.run_observed(page, &NoopObserver).await
    }

    /// Runs once against `page`, reporting busy/settled to `observer`.
    ///
    /// The page is only written after the response has been validated; every failure
    /// leaves it exactly as extracted.
    pub async fn run_observed(&self, page: &mut PageSession, observer: &dyn RunObserver) -> Outcome {
        if page.is_processed() {
            tracing::info!("page already rewritten; ignoring trigger");
            return Outcome::AlreadyProcessed;
        }

        let extraction = self.extractor.extract(page.document());
        if extraction.is_empty() {
            tracing::info!(scope = %extraction.scope, "no suitable text found to rewrite");
            return Outcome::NothingToRewrite;
        }

        let expected = extraction.len();
        let payload = self.codec.join(&extraction.texts());
        let request = RewriteRequest::pirate(self.codec.separator(), payload);
        tracing::info!(segments = expected, scope = %extraction.scope, "dispatching rewrite");

        observer.busy(expected);
        let outcome = match self.client.rewrite(&request).await {
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "rewrite request failed");
                Outcome::Failure {
                    kind: ErrorKind::TransportError,
                    detail: format!("{err:#}"),
                }
            }
            Ok(content) if content.trim().is_empty() => Outcome::Failure {
                kind: ErrorKind::TransportError,
                detail: "LLM API response was empty or in an unexpected format".to_string(),
            },
            Ok(content) => {
                let chunks = self.codec.split(self.codec.strip_stray(&content));
                if chunks.len() != expected {
                    tracing::error!(
                        expected,
                        received = chunks.len(),
                        "rewritten chunk count does not match original"
                    );
                    Outcome::Failure {
                        kind: ErrorKind::SegmentCountMismatch,
                        detail: format!("expected {expected} got {}", chunks.len()),
                    }
                } else {
                    let mut skipped = 0usize;
                    for (segment, chunk) in extraction.segments.iter().zip(&chunks) {
                        if !page.replace_text(segment.node, chunk) {
                            skipped += 1;
                        }
                    }
                    if skipped > 0 {
                        tracing::warn!(skipped, "elements detached during rewrite were skipped");
                    }
                    page.mark_processed();
                    tracing::info!(segments = expected, "page content rewritten");
                    Outcome::Success { count: expected }
                }
            }
        };
        observer.settled(&outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractionRules;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use scraper::Selector;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const SEP: &str = "%%SEP%%";

    const TWO_PARAGRAPHS: &str = r#"
        <html><body>
          <nav><p>Home | About | Contact | Archive</p></nav>
          <article>
            <p>Hello there.</p>
            <p>The weather is fine today.</p>
          </article>
        </body></html>
    "#;

    /// Replays scripted replies and records what was asked.
    struct ScriptedClient {
        replies: Mutex<Vec<Result<String>>>,
        calls: AtomicUsize,
        last_request: Mutex<Option<RewriteRequest>>,
    }

    impl ScriptedClient {
        fn replying(reply: Result<String>) -> Self {
            Self {
                replies: Mutex::new(vec![reply]),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RewriteClient for ScriptedClient {
        async fn rewrite(&self, request: &RewriteRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow!("no scripted reply left")))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: RefCell<Vec<String>>,
    }

    impl RunObserver for RecordingObserver {
        fn busy(&self, segments: usize) {
            self.events.borrow_mut().push(format!("busy:{segments}"));
        }

        fn settled(&self, outcome: &Outcome) {
            self.events.borrow_mut().push(format!("settled:{outcome:?}"));
        }
    }

    fn orchestrator(client: ScriptedClient) -> Orchestrator<ScriptedClient> {
        // Scenario pages use short sentences, so relax the length floor to fit them.
        let rules = ExtractionRules {
            min_chars: 10,
            ..ExtractionRules::default()
        };
        Orchestrator::with_codec(
            Extractor::new(rules).unwrap(),
            ChunkCodec::with_separator(SEP),
            client,
        )
    }

    fn paragraphs(page: &PageSession) -> Vec<String> {
        let selector = Selector::parse("article p").unwrap();
        page.document()
            .select(&selector)
            .map(|p| p.text().collect())
            .collect()
    }

    #[tokio::test]
    async fn default_floor_drops_short_greeting() {
        let client = ScriptedClient::replying(Ok("Th' weather be fair today!".to_string()));
        let orchestrator = Orchestrator::with_codec(
            Extractor::new(ExtractionRules::default()).unwrap(),
            ChunkCodec::with_separator(SEP),
            client,
        );
        let mut page = PageSession::parse(TWO_PARAGRAPHS);

        let outcome = orchestrator.run(&mut page).await;

        assert_eq!(outcome, Outcome::Success { count: 1 });
        assert_eq!(
            paragraphs(&page),
            vec!["Hello there.", "Th' weather be fair today!"]
        );
        let request = orchestrator
            .client()
            .last_request
            .lock()
            .unwrap()
            .clone()
            .unwrap();
        assert_eq!(request.user_payload, "The weather is fine today.");
    }

    #[tokio::test]
    async fn happy_path_applies_every_chunk_in_order() {
        let reply = format!("Ahoy there, matey!{SEP}Th' weather be fair as the seven seas today!");
        let orchestrator = orchestrator(ScriptedClient::replying(Ok(reply)));
        let mut page = PageSession::parse(TWO_PARAGRAPHS);

        let outcome = orchestrator.run(&mut page).await;

        assert_eq!(outcome, Outcome::Success { count: 2 });
        assert_eq!(
            paragraphs(&page),
            vec![
                "Ahoy there, matey!",
                "Th' weather be fair as the seven seas today!"
            ]
        );
        assert!(page.is_processed());
        let request = orchestrator
            .client()
            .last_request
            .lock()
            .unwrap()
            .clone()
            .unwrap();
        assert_eq!(
            request.user_payload,
            format!("Hello there.{SEP}The weather is fine today.")
        );
        assert!(request.system_instruction.contains(SEP));
    }

    #[tokio::test]
    async fn mismatched_count_leaves_page_untouched() {
        let orchestrator =
            orchestrator(ScriptedClient::replying(Ok("Ahoy, all in one go!".to_string())));
        let mut page = PageSession::parse(TWO_PARAGRAPHS);
        let before = page.to_html();

        let outcome = orchestrator.run(&mut page).await;

        assert_eq!(
            outcome,
            Outcome::Failure {
                kind: ErrorKind::SegmentCountMismatch,
                detail: "expected 2 got 1".to_string(),
            }
        );
        assert_eq!(page.to_html(), before);
        assert!(!page.is_processed());
    }

    #[tokio::test]
    async fn too_many_chunks_is_also_a_mismatch() {
        let reply = format!("a{SEP}b{SEP}c");
        let orchestrator = orchestrator(ScriptedClient::replying(Ok(reply)));
        let mut page = PageSession::parse(TWO_PARAGRAPHS);
        let outcome = orchestrator.run(&mut page).await;
        assert!(matches!(
            outcome,
            Outcome::Failure { kind: ErrorKind::SegmentCountMismatch, ref detail } if detail == "expected 2 got 3"
        ));
        assert_eq!(
            paragraphs(&page),
            vec!["Hello there.", "The weather is fine today."]
        );
    }

    #[tokio::test]
    async fn nothing_to_rewrite_skips_the_model() {
        let orchestrator = orchestrator(ScriptedClient::replying(Ok("unused".to_string())));
        let mut page = PageSession::parse("<body><article><p>Tides</p></article></body>");

        let outcome = orchestrator.run(&mut page).await;

        assert_eq!(outcome, Outcome::NothingToRewrite);
        assert_eq!(orchestrator.client().calls(), 0);
        assert!(!page.is_processed());
    }

    #[tokio::test]
    async fn transport_failure_leaves_page_untouched() {
        let orchestrator = orchestrator(ScriptedClient::replying(Err(anyhow!(
            "Failed to connect to LLM: connection refused"
        ))));
        let mut page = PageSession::parse(TWO_PARAGRAPHS);
        let before = page.to_html();

        let outcome = orchestrator.run(&mut page).await;

        assert_eq!(
            outcome,
            Outcome::Failure {
                kind: ErrorKind::TransportError,
                detail: "Failed to connect to LLM: connection refused".to_string(),
            }
        );
        assert_eq!(page.to_html(), before);
        assert!(!page.is_processed());
    }

    #[tokio::test]
    async fn blank_reply_is_a_transport_error() {
        let orchestrator = orchestrator(ScriptedClient::replying(Ok("  \n".to_string())));
        let mut page = PageSession::parse(TWO_PARAGRAPHS);
        let outcome = orchestrator.run(&mut page).await;
        assert!(matches!(
            outcome,
            Outcome::Failure {
                kind: ErrorKind::TransportError,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn second_run_reports_already_processed_without_calling_model() {
        let reply = format!("Ahoy there, matey!{SEP}Th' weather be fair!");
        let orchestrator = orchestrator(ScriptedClient::replying(Ok(reply)));
        let mut page = PageSession::parse(TWO_PARAGRAPHS);

        assert_eq!(orchestrator.run(&mut page).await, Outcome::Success { count: 2 });
        let rewritten = page.to_html();
        assert_eq!(orchestrator.run(&mut page).await, Outcome::AlreadyProcessed);
        assert_eq!(orchestrator.client().calls(), 1);
        assert_eq!(page.to_html(), rewritten);
    }

    #[tokio::test]
    async fn stray_separators_at_the_ends_are_tolerated() {
        let reply = format!("{SEP}Ahoy!{SEP}Fair winds today, arr!{SEP}");
        let orchestrator = orchestrator(ScriptedClient::replying(Ok(reply)));
        let mut page = PageSession::parse(TWO_PARAGRAPHS);

        assert_eq!(orchestrator.run(&mut page).await, Outcome::Success { count: 2 });
        assert_eq!(paragraphs(&page), vec!["Ahoy!", "Fair winds today, arr!"]);
    }

    #[tokio::test]
    async fn chunks_land_on_elements_by_position() {
        let mut html = String::from("<body><main>");
        for idx in 0..6 {
            html.push_str(&format!("<p>Original paragraph number {idx}</p>"));
        }
        html.push_str("</main></body>");
        let reply = (0..6)
            .map(|idx| format!("Pirate line {idx}, arr"))
            .collect::<Vec<_>>()
            .join(SEP);
        let orchestrator = orchestrator(ScriptedClient::replying(Ok(reply)));
        let mut page = PageSession::parse(&html);

        assert_eq!(orchestrator.run(&mut page).await, Outcome::Success { count: 6 });
        let selector = Selector::parse("main p").unwrap();
        let rewritten: Vec<String> = page
            .document()
            .select(&selector)
            .map(|p| p.text().collect())
            .collect();
        let expected: Vec<String> = (0..6).map(|idx| format!("Pirate line {idx}, arr")).collect();
        assert_eq!(rewritten, expected);
    }

    #[tokio::test]
    async fn observer_sees_busy_then_settled() {
        let reply = format!("Ahoy!{SEP}Fair winds!");
        let orchestrator = orchestrator(ScriptedClient::replying(Ok(reply)));
        let mut page = PageSession::parse(TWO_PARAGRAPHS);
        let observer = RecordingObserver::default();

        orchestrator.run_observed(&mut page, &observer).await;

        assert_eq!(
            observer.events.into_inner(),
            vec![
                "busy:2".to_string(),
                "settled:Success { count: 2 }".to_string()
            ]
        );
    }

    #[test]
    fn status_messages_name_the_outcome() {
        assert!(Outcome::Success { count: 3 }
            .status_message()
            .contains("Rewrote 3 segment(s)"));
        assert!(Outcome::Failure {
            kind: ErrorKind::TransportError,
            detail: "boom".into()
        }
        .status_message()
        .ends_with("Rewrite failed: boom"));
        assert!(Outcome::NothingToRewrite.status_message().contains("No text found"));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_string(&Outcome::Success { count: 2 }).unwrap();
        assert_eq!(json, r#"{"outcome":"success","count":2}"#);
    }
}
