//! Packing and unpacking of text segments into a single LLM payload.

/// Reserved token placed between segments on both the request and the response side.
pub const SEPARATOR: &str = "%%PIRATE_CHUNK_SEPARATOR%%";

/// Literal separator codec shared by the request builder and the response parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCodec {
    separator: String,
}

impl ChunkCodec {
    /// Builds a codec around the crate-wide [`SEPARATOR`].
    pub fn new() -> Self {
        Self::with_separator(SEPARATOR)
    }

    /// Builds a codec around a caller supplied literal separator.
    ///
    /// An empty separator would make `split` meaningless, so it is replaced with [`SEPARATOR`].
    pub fn with_separator(separator: impl Into<String>) -> Self {
        let separator = separator.into();
        if separator.is_empty() {
            return Self::new();
        }
        Self { separator }
    }

    /// The literal token this codec joins and splits on.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Joins segments with exactly one separator between neighbours and none at either end.
    pub fn join<S: AsRef<str>>(&self, segments: &[S]) -> String {
        let mut payload = String::new();
        for (idx, segment) in segments.iter().enumerate() {
            if idx > 0 {
                payload.push_str(&self.separator);
            }
            payload.push_str(segment.as_ref());
        }
        payload
    }

    /// Splits a payload on every separator occurrence, keeping empty segments.
    pub fn split(&self, payload: &str) -> Vec<String> {
        payload
            .split(self.separator.as_str())
            .map(str::to_string)
            .collect()
    }

    /// Drops at most one separator from the start and one from the end of a model response.
    pub fn strip_stray<'a>(&self, payload: &'a str) -> &'a str {
        let payload = payload
            .strip_prefix(self.separator.as_str())
            .unwrap_or(payload);
        payload
            .strip_suffix(self.separator.as_str())
            .unwrap_or(payload)
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new()
    }
}
