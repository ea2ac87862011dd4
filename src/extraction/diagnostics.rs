// Failure diagnostics - classifies why a strategy failed
//
// Analyzes strategy errors and failure messages to determine:
// - Kind of failure (timeout, rate limiting, missing content, ...)
// - Whether retrying the same strategy can help

use serde::{Deserialize, Serialize};

use super::errors::StrategyError;

/// Reasons a strategy attempt can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Deadline elapsed
    Timeout,

    /// Throttled by the remote side (429 or similar)
    RateLimited,

    /// Content deleted, or no media on it
    NotFound,

    /// Credentials missing or rejected
    Unauthorized,

    /// Unexpected response or page structure
    Parse,

    /// Transport failure
    Network,

    /// Aborted by the caller
    Cancelled,

    /// Strategy returned `success: false` without an error
    NoMedia,

    /// Generic/unknown failure
    Unknown,
}

impl FailureReason {
    /// Check if retrying the same strategy may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::Network | Self::NoMedia | Self::Unknown
        )
    }

    /// Check if this failure will not go away on its own
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::NotFound | Self::Unauthorized | Self::Cancelled)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Timeout => "Strategy timed out",
            Self::RateLimited => "Rate limited by remote",
            Self::NotFound => "Content not found",
            Self::Unauthorized => "Unauthorized",
            Self::Parse => "Unexpected structure",
            Self::Network => "Network failure",
            Self::Cancelled => "Cancelled",
            Self::NoMedia => "No media produced",
            Self::Unknown => "Unknown failure",
        }
    }
}

/// Classify a strategy error
pub fn diagnose_strategy_error(error: &StrategyError) -> FailureReason {
    match error {
        StrategyError::Timeout(_) => FailureReason::Timeout,
        StrategyError::Network(_) => FailureReason::Network,
        StrategyError::NotFound(_) => FailureReason::NotFound,
        StrategyError::Unauthorized(_) => FailureReason::Unauthorized,
        StrategyError::Parse(_) => FailureReason::Parse,
        StrategyError::Cancelled => FailureReason::Cancelled,
        StrategyError::Failed(msg) => diagnose_message(msg).unwrap_or(FailureReason::Unknown),
    }
}

/// Classify a free-form failure message
pub fn diagnose_message(message: &str) -> Option<FailureReason> {
    let lower = message.to_lowercase();

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        return Some(FailureReason::RateLimited);
    }

    if lower.contains("timeout") || lower.contains("timed out") {
        return Some(FailureReason::Timeout);
    }

    if lower.contains("401") || lower.contains("403") || lower.contains("unauthorized") {
        return Some(FailureReason::Unauthorized);
    }

    if lower.contains("404") || lower.contains("not found") || lower.contains("deleted") {
        return Some(FailureReason::NotFound);
    }

    if lower.contains("abort") || lower.contains("cancel") {
        return Some(FailureReason::Cancelled);
    }

    if lower.contains("connection") || lower.contains("network") || lower.contains("dns") {
        return Some(FailureReason::Network);
    }

    if lower.contains("parse") || lower.contains("unexpected token") || lower.contains("json") {
        return Some(FailureReason::Parse);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rate_limit_detection() {
        assert_eq!(
            diagnose_message("HTTP 429 Too Many Requests"),
            Some(FailureReason::RateLimited)
        );
    }

    #[test]
    fn test_timeout_detection() {
        assert_eq!(
            diagnose_message("Timed out after 10s"),
            Some(FailureReason::Timeout)
        );
    }

    #[test]
    fn test_not_found_detection() {
        assert_eq!(
            diagnose_message("tweet was deleted"),
            Some(FailureReason::NotFound)
        );
    }

    #[test]
    fn test_unknown_message() {
        assert_eq!(diagnose_message("weird"), None);
        assert_eq!(
            diagnose_strategy_error(&StrategyError::Failed("weird".into())),
            FailureReason::Unknown
        );
    }

    #[test]
    fn test_typed_errors_map_directly() {
        assert_eq!(
            diagnose_strategy_error(&StrategyError::Timeout(Duration::from_secs(1))),
            FailureReason::Timeout
        );
        assert_eq!(
            diagnose_strategy_error(&StrategyError::Cancelled),
            FailureReason::Cancelled
        );
    }

    #[test]
    fn test_permanent_is_not_retryable() {
        for reason in [
            FailureReason::NotFound,
            FailureReason::Unauthorized,
            FailureReason::Cancelled,
        ] {
            assert!(reason.is_permanent());
            assert!(!reason.is_retryable());
        }
        assert!(FailureReason::Timeout.is_retryable());
    }
}
