// Error types for media extraction

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes carried by failed extraction results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractionErrorCode {
    /// Every applicable strategy ran and none produced items
    NoMediaFound,
    /// The element was already processed in this session (strict dedup mode only)
    DuplicateProcessing,
    /// Unexpected failure during extraction, original message preserved
    UnknownError,
}

impl fmt::Display for ExtractionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMediaFound => write!(f, "NO_MEDIA_FOUND"),
            Self::DuplicateProcessing => write!(f, "DUPLICATE_PROCESSING"),
            Self::UnknownError => write!(f, "UNKNOWN_ERROR"),
        }
    }
}

/// User-facing error attached to an `ExtractionResult`
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ExtractionError {
    pub code: ExtractionErrorCode,
    pub message: String,
}

impl ExtractionError {
    pub fn new(code: ExtractionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn no_media_found(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorCode::NoMediaFound, message)
    }

    pub fn duplicate_processing(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorCode::DuplicateProcessing, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorCode::UnknownError, message)
    }
}

/// Failure raised by a single extraction strategy.
///
/// The chain treats every variant exactly like a `success: false` result;
/// the variant only feeds diagnostics and retry decisions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// The strategy's own deadline elapsed
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure (connection reset, DNS, ...)
    #[error("network error: {0}")]
    Network(String),

    /// The content no longer exists or has no media
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or rejected credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Response or page structure could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Aborted by an outer cancellation signal
    #[error("cancelled")]
    Cancelled,

    /// Anything else
    #[error("{0}")]
    Failed(String),
}

impl From<StrategyError> for ExtractionError {
    fn from(err: StrategyError) -> Self {
        ExtractionError::unknown(err.to_string())
    }
}

// Convert from String so strategies can bubble up raw messages
impl From<String> for StrategyError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::Timeout(Duration::ZERO);
        }

        if lower.contains("401") || lower.contains("403") || lower.contains("unauthorized") {
            return Self::Unauthorized(s);
        }

        if lower.contains("404") || lower.contains("not found") {
            return Self::NotFound(s);
        }

        if lower.contains("parse") || lower.contains("json") {
            return Self::Parse(s);
        }

        if lower.contains("connection") || lower.contains("network") || lower.contains("dns") {
            return Self::Network(s);
        }

        Self::Failed(s)
    }
}

impl From<&str> for StrategyError {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
