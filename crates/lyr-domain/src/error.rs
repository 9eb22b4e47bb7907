use std::fmt::Display;
use std::path::Path;

/// Errors surfaced while fetching, packaging, or publishing a layer.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayerError {
    #[error("[LYR100] failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("[LYR200] unexpected archive layout: {0}")]
    ArchiveFormat(String),
    #[error("[LYR300] filesystem error at {path}: {reason}")]
    FileSystem { path: String, reason: String },
    #[error("[LYR400] layer registry request failed: {0}")]
    Registry(String),
    #[error("[LYR500] invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = LayerError> = std::result::Result<T, E>;

impl LayerError {
    pub fn fetch(url: impl Into<String>, reason: impl Display) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn archive(message: impl Into<String>) -> Self {
        Self::ArchiveFormat(message.into())
    }

    /// Wraps an IO failure with the path it happened on.
    pub fn fs(path: &Path, reason: impl Display) -> Self {
        Self::FileSystem {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn registry(reason: impl Display) -> Self {
        Self::Registry(reason.to_string())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "LYR100",
            Self::ArchiveFormat(_) => "LYR200",
            Self::FileSystem { .. } => "LYR300",
            Self::Registry(_) => "LYR400",
            Self::Config(_) => "LYR500",
        }
    }
}
