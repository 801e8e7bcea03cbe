//! Boundary with the language model that performs the rewriting.

use anyhow::Result;
use async_trait::async_trait;

mod openai;

pub use openai::{OpenAiCompatClient, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT};

/// Everything the model sees for one rewrite: the fixed instruction and the joined page text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRequest {
    /// System instruction embedding the separator rules.
    pub system_instruction: String,
    /// Joined segment payload.
    pub user_payload: String,
}

impl RewriteRequest {
    /// Builds a request for `payload` using the pirate instruction keyed to `separator`.
    pub fn pirate(separator: &str, payload: impl Into<String>) -> Self {
        Self {
            system_instruction: system_prompt(separator),
            user_payload: payload.into(),
        }
    }
}

/// Trait implemented by anything able to turn a joined payload into rewritten text.
///
/// Errors carry a human readable description (HTTP status and body excerpt, or the
/// connection failure) that is shown to the user verbatim.
#[async_trait]
pub trait RewriteClient: Send + Sync {
    /// Sends one request and returns the model's textual content.
    async fn rewrite(&self, request: &RewriteRequest) -> Result<String>;
}

/// Renders the system instruction that teaches the model the separator protocol.
pub fn system_prompt(separator: &str) -> String {
    format!(
        "You are a master pirate text rewriter, Cap'n! Ye be tasked with takin' plain landlubber's text and makin' it sound like it came from the mouth o' the fiercest buccaneer to ever sail the seven seas!
IMPORTANT INSTRUCTIONS, MATEY:
1. The user will give ye text segments. These segments are separated by the special marker: '{separator}'.
2. Ye MUST rewrite each segment into authentic, colorful pirate speak. Be creative, use pirate slang, and make it fun!
3. In yer response, ye MUST keep the exact '{separator}' marker between each rewritten segment. Do not add it at the very beginning or very end of your entire response.
4. The number o' rewritten segments in yer output, separated by the marker, MUST exactly match the number o' original segments provided by the user. For example, if the input is \"Hello world.{separator}How are you?\", your output must be something like \"Ahoy, matey!{separator}How be ye farin'?\".
5. Do not add any extra text or explanations before the first rewritten segment or after the last one. Only provide the rewritten segments and their separators.
Failure to follow these rules will have ye walkin' the plank! Now, show 'em what ye got! Arr!"
    )
}
