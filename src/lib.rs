#![warn(missing_docs)]
//! Core library entry points for the pirate page rewriter.

pub mod codec;
pub mod controls;
pub mod extract;
pub mod llm;
pub mod orchestrator;
pub mod page;
pub mod settings;
mod style;

pub use codec::{ChunkCodec, SEPARATOR};
pub use controls::{Cli, Command, InputSource};
pub use extract::{
    CandidateSet, ExtractError, ExtractionResult, ExtractionRules, Extractor, TextSegment,
};
pub use llm::{system_prompt, OpenAiCompatClient, RewriteClient, RewriteRequest};
pub use orchestrator::{ErrorKind, NoopObserver, Orchestrator, Outcome, RunObserver};
pub use page::{PageSession, PROCESSED_ATTRIBUTE};
pub use settings::{FileSettingsStore, Settings, SettingsError, SettingsStore};
pub use style::InlineStyle;
