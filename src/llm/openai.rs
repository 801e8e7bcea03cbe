//! Client for OpenAI-compatible chat completion endpoints (LM Studio, Ollama, llama.cpp).

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{RewriteClient, RewriteRequest};
use crate::settings::Settings;

/// Sampling temperature sent with every rewrite.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Request timeout used unless the caller picks another.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const ERROR_BODY_EXCERPT: usize = 200;

/// Async chat-completions client.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiCompatClient {
    /// Builds a client for `settings` with the given request timeout.
    pub fn new(settings: &Settings, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(
            !settings.model_name.trim().is_empty(),
            "missing LLM model name"
        );
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build LLM HTTP client")?;
        Ok(Self {
            client,
            base_url: settings.api_url.clone(),
            endpoint: chat_endpoint(&settings.api_url),
            model: settings.model_name.clone(),
            api_key: settings.api_key.clone(),
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    /// Overrides the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = bearer_token(self.api_key.as_deref()) {
            let auth = format!("Bearer {token}");
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth).context("invalid LLM API key")?,
            );
        }
        Ok(headers)
    }
}

#[async_trait]
impl RewriteClient for OpenAiCompatClient {
    async fn rewrite(&self, request: &RewriteRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_payload,
                },
            ],
        };
        tracing::info!(
            endpoint = %self.endpoint,
            model = %self.model,
            payload_chars = request.user_payload.chars().count(),
            "sending rewrite request"
        );
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                anyhow!(
                    "Failed to connect to LLM: {err}. Is your local LLM server running at {} and configured correctly?",
                    self.base_url
                )
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            tracing::warn!(%status, "LLM API returned an error status");
            bail!(
                "LLM API request failed: {}. Details: {}",
                status,
                excerpt(&text, ERROR_BODY_EXCERPT)
            );
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .context("LLM API response was empty or in an unexpected format")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| anyhow!("LLM API response was empty or in an unexpected format"))
    }
}

/// Appends the chat completions path to a base URL, tolerating a trailing slash.
pub(crate) fn chat_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim().trim_end_matches('/'))
}

/// Returns the token to send, or `None` for absent, blank, or `none` keys.
pub(crate) fn bearer_token(api_key: Option<&str>) -> Option<&str> {
    api_key
        .map(str::trim)
        .filter(|key| !key.is_empty() && !key.eq_ignore_ascii_case("none"))
}

fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
