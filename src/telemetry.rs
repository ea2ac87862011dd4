// Logging setup for binaries and integration harnesses embedding the engine

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Target used by `TracingSummarySink` for per-call summaries
pub const SUMMARY_TARGET: &str = "media_extraction::summary";

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used, e.g.
/// `"info,media_extraction::summary=debug"`. Fails if a global subscriber
/// is already installed.
pub fn init_tracing(default_filter: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let _ = init_tracing("info");
        assert!(init_tracing("debug").is_err());
    }
}
