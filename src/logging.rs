//! Tracing subscriber setup for the binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingSettings};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Call once per process.
pub fn init_tracing(settings: &LoggingSettings) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| env_filter(&settings.level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match settings.format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .init();
        }
    }
}

/// Parse a filter directive, falling back to `info` when it is malformed.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_accepts_level() {
        assert_eq!(env_filter("debug").to_string(), "debug");
    }

    #[test]
    fn test_env_filter_falls_back_on_garbage() {
        assert_eq!(env_filter("smokewatch=loud").to_string(), "info");
    }
}
