//! Persisted endpoint settings.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

/// Endpoint used when nothing is stored (LM Studio's default server).
pub const DEFAULT_API_URL: &str = "http://localhost:1234/v1";

/// Model used when nothing is stored.
pub const DEFAULT_MODEL_NAME: &str = "llama3";

/// Connection settings for the rewriting endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible API (without `/chat/completions`).
    pub api_url: String,
    /// Model identifier sent with each request.
    pub model_name: String,
    /// Optional bearer credential; `none` means no credential.
    pub api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            api_key: None,
        }
    }
}

impl Settings {
    /// Checks the values a user is allowed to save.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let api_url = self.api_url.trim();
        if api_url.is_empty() {
            return Err(SettingsError::EmptyApiUrl);
        }
        let parsed = Url::parse(api_url).map_err(|err| SettingsError::InvalidApiUrl {
            url: api_url.to_string(),
            reason: err.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SettingsError::UnsupportedScheme(parsed.scheme().to_string()));
        }
        if self.model_name.trim().is_empty() {
            return Err(SettingsError::EmptyModelName);
        }
        Ok(())
    }

    /// Returns a copy with `Some` overrides applied; blank overrides are ignored.
    pub fn with_overrides(
        &self,
        api_url: Option<&str>,
        model_name: Option<&str>,
        api_key: Option<&str>,
    ) -> Self {
        let mut merged = self.clone();
        if let Some(url) = non_blank(api_url) {
            merged.api_url = url.to_string();
        }
        if let Some(model) = non_blank(model_name) {
            merged.model_name = model.to_string();
        }
        if let Some(key) = non_blank(api_key) {
            merged.api_key = Some(key.to_string());
        }
        merged
    }

    fn from_stored(stored: StoredSettings) -> Self {
        let defaults = Self::default();
        Self {
            api_url: non_blank(stored.api_url.as_deref())
                .map(str::to_string)
                .unwrap_or(defaults.api_url),
            model_name: non_blank(stored.model_name.as_deref())
                .map(str::to_string)
                .unwrap_or(defaults.model_name),
            api_key: non_blank(stored.api_key.as_deref()).map(str::to_string),
        }
    }

    fn to_stored(&self) -> StoredSettings {
        StoredSettings {
            api_url: Some(self.api_url.trim().to_string()),
            model_name: Some(self.model_name.trim().to_string()),
            api_key: Some(self.api_key.as_deref().unwrap_or("").trim().to_string()),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// On-disk key/value layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(rename = "llmApiUrl", default)]
    api_url: Option<String>,
    #[serde(rename = "llmModelName", default)]
    model_name: Option<String>,
    #[serde(rename = "llmApiKey", default)]
    api_key: Option<String>,
}

/// Errors surfaced while validating, loading or saving settings.
#[derive(Debug)]
pub enum SettingsError {
    /// The API URL was blank.
    EmptyApiUrl,
    /// The API URL could not be parsed.
    InvalidApiUrl {
        /// Rejected value.
        url: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// The API URL used something other than http or https.
    UnsupportedScheme(String),
    /// The model name was blank.
    EmptyModelName,
    /// Reading or writing the settings file failed.
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The settings file held malformed JSON.
    Malformed {
        /// File being parsed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyApiUrl => write!(f, "API URL cannot be empty"),
            Self::InvalidApiUrl { url, reason } => {
                write!(f, "API URL '{url}' is not a valid URL: {reason}")
            }
            Self::UnsupportedScheme(scheme) => write!(
                f,
                "API URL must start with http:// or https:// (got '{scheme}')"
            ),
            Self::EmptyModelName => write!(f, "model name cannot be empty"),
            Self::Io { path, source } => {
                write!(f, "settings file {}: {source}", path.display())
            }
            Self::Malformed { path, source } => {
                write!(f, "settings file {} is malformed: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Malformed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Key/value persistence for [`Settings`].
pub trait SettingsStore {
    /// Loads stored settings, falling back to defaults for anything missing.
    fn load(&self) -> Result<Settings, SettingsError>;

    /// Validates and persists `settings`.
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// JSON file store using the extension's original key names.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    /// Store backed by `path`; the file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(err) => return Err(self.io_error(err)),
        };
        if raw.trim().is_empty() {
            return Ok(Settings::default());
        }
        let stored: StoredSettings =
            serde_json::from_str(&raw).map_err(|source| SettingsError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        Ok(Settings::from_stored(stored))
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let json = serde_json::to_string_pretty(&settings.to_stored()).map_err(|source| {
            SettingsError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, json).map_err(|err| self.io_error(err))?;
        tracing::debug!(path = %self.path.display(), "saved settings");
        Ok(())
    }
}
