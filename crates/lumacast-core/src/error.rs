//! Error types shared by the core domain layer.

use std::path::PathBuf;

/// Failures raised by LUT parsing, fetching and caching.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LutError {
    #[error("missing LUT_3D_SIZE directive")]
    MissingSize,
    #[error("LUT_3D_SIZE {0} is out of range (2..=256)")]
    InvalidSize(u32),
    #[error("line {line}: malformed entry `{text}`")]
    MalformedEntry { line: usize, text: String },
    #[error("expected {expected} entries, found {found}")]
    EntryCount { expected: usize, found: usize },
    #[error("unsupported LUT source `{0}`")]
    UnsupportedSource(String),
    #[error("failed to fetch `{source_id}`: {message}")]
    Fetch { source_id: String, message: String },
    #[error("`{0}` is marked unavailable after repeated failures")]
    Unavailable(String),
    #[error("every cached LUT is pinned; cannot insert `{0}`")]
    CacheFull(String),
    #[error("`{0}` was superseded by a newer LUT request")]
    Superseded(String),
}

impl LutError {
    /// Whether the failure comes from the file contents rather than transport.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::MissingSize
                | Self::InvalidSize(_)
                | Self::MalformedEntry { .. }
                | Self::EntryCount { .. }
        )
    }
}

/// Failures raised by a render backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("no compatible graphics adapter: {0}")]
    NoAdapter(String),
    #[error("graphics context lost")]
    ContextLost,
    #[error("backend resources not acquired")]
    NotAcquired,
    #[error("render failed: {0}")]
    Render(String),
}

impl BackendError {
    /// Capability errors are detected up front and never recover on retry.
    pub fn is_capability_missing(&self) -> bool {
        matches!(self, Self::NoAdapter(_))
    }
}

/// Failures loading engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },
}
