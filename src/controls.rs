//! Command-line surface: the "piratify" trigger, a dry-run extractor and the settings form.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::extract::{CandidateSet, ExtractionRules, DEFAULT_MIN_CHARS};
use crate::llm::{DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT};
use crate::settings::Settings;

/// Top-level CLI.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "piratify",
    version,
    about = "Rewrite the article text of an HTML page into pirate speak via a local LLM"
)]
pub struct Cli {
    /// Settings file holding the endpoint, model and API key
    #[arg(long, global = true, env = "PIRATIFY_SETTINGS", default_value_os_t = default_settings_path())]
    pub settings: PathBuf,

    /// Action to perform
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Rewrite a page once and print the resulting HTML
    Rewrite(RewriteArgs),
    /// Print the segments that would be sent to the model, without calling it
    Extract(ExtractArgs),
    /// Show or update the stored settings
    Config(ConfigArgs),
}

/// Extraction knobs shared by `rewrite` and `extract`.
#[derive(Args, Debug, Clone, Default)]
pub struct ExtractionArgs {
    /// Also treat generic `div`/`span` containers as candidates
    #[arg(long, default_value_t = false)]
    pub loose: bool,

    /// Minimum trimmed characters for a segment
    #[arg(long, default_value_t = DEFAULT_MIN_CHARS)]
    pub min_chars: usize,

    /// Do not reject candidates that contain hidden descendants
    #[arg(long, default_value_t = false)]
    pub lenient_hidden: bool,
}

impl ExtractionArgs {
    /// Converts the flags into extraction rules.
    pub fn build_rules(&self) -> ExtractionRules {
        ExtractionRules {
            candidates: if self.loose {
                CandidateSet::Loose
            } else {
                CandidateSet::Strict
            },
            min_chars: self.min_chars,
            check_hidden_descendants: !self.lenient_hidden,
            ..ExtractionRules::default()
        }
    }
}

/// Arguments of `piratify rewrite`.
#[derive(Args, Debug, Clone)]
pub struct RewriteArgs {
    /// HTML file path, http(s) URL, or '-' for stdin
    #[arg(default_value = "-")]
    pub input: String,

    /// Write the rewritten HTML here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Override the stored API base URL
    #[arg(long, env = "PIRATIFY_API_URL")]
    pub api_url: Option<String>,

    /// Override the stored model name
    #[arg(long, env = "PIRATIFY_MODEL")]
    pub model: Option<String>,

    /// Override the stored API key ('none' sends no credential)
    #[arg(long, env = "PIRATIFY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Seconds to wait for the model before giving up
    #[arg(long, env = "PIRATIFY_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Sampling temperature sent to the model
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    /// Extraction heuristics
    #[command(flatten)]
    pub extraction: ExtractionArgs,
}

impl RewriteArgs {
    /// Applies command-line overrides on top of the stored settings.
    pub fn resolve_settings(&self, stored: &Settings) -> Settings {
        stored.with_overrides(
            self.api_url.as_deref(),
            self.model.as_deref(),
            self.api_key.as_deref(),
        )
    }

    /// Requested request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Arguments of `piratify extract`.
#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// HTML file path, http(s) URL, or '-' for stdin
    #[arg(default_value = "-")]
    pub input: String,

    /// Extraction heuristics
    #[command(flatten)]
    pub extraction: ExtractionArgs,
}

/// Arguments of `piratify config`. With no flags the current settings are printed.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// API base URL, e.g. http://localhost:1234/v1
    #[arg(long)]
    pub api_url: Option<String>,

    /// Model name
    #[arg(long)]
    pub model: Option<String>,

    /// API key; 'none' or blank for local servers
    #[arg(long)]
    pub api_key: Option<String>,
}

impl ConfigArgs {
    /// True when at least one value should be written.
    pub fn has_updates(&self) -> bool {
        self.api_url.is_some() || self.model.is_some() || self.api_key.is_some()
    }

    /// Merges the provided values into `stored`. An explicit blank key clears it.
    pub fn apply(&self, stored: &Settings) -> Settings {
        let mut updated = stored.with_overrides(self.api_url.as_deref(), self.model.as_deref(), None);
        if let Some(key) = &self.api_key {
            let key = key.trim();
            updated.api_key = (!key.is_empty()).then(|| key.to_string());
        }
        updated
    }
}

/// Where the page HTML comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Read from standard input.
    Stdin,
    /// Read a local file.
    File(PathBuf),
    /// Fetch over HTTP(S).
    Url(Url),
}

impl InputSource {
    /// Interprets a CLI input argument.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == "-" {
            return Self::Stdin;
        }
        match Url::parse(raw) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Self::Url(url),
            _ => Self::File(PathBuf::from(raw)),
        }
    }
}

/// `$XDG_CONFIG_HOME/piratify/settings.json`, then `~/.config/...`, then the working directory.
pub fn default_settings_path() -> PathBuf {
    let base = env::var_os("XDG_CONFIG_HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            env::var_os("HOME")
                .filter(|value| !value.is_empty())
                .map(|home| PathBuf::from(home).join(".config"))
        });
    match base {
        Some(base) => base.join("piratify").join("settings.json"),
        None => PathBuf::from("piratify-settings.json"),
    }
}
