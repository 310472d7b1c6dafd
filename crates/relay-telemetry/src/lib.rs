//! Logging initialization.
//!
//! `RUST_LOG` wins when set; otherwise the configured level is used.
//! Output is human-readable by default, JSON lines when `json` is enabled.

#![deny(unsafe_code)]

use relay_settings::LoggingSettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Resolve the filter: `RUST_LOG` if present and valid, else `level`.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global tracing subscriber. Call once at startup.
///
/// A second call is a no-op (the first subscriber stays installed).
pub fn init_logging(config: &LoggingSettings) {
    let filter = build_filter(&config.level);

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed()
    };

    if let Err(e) = tracing_subscriber::registry().with(fmt_layer).try_init() {
        eprintln!("relay-telemetry: subscriber already installed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_on_bad_level() {
        // Must not panic on garbage input.
        let _ = build_filter("===not a directive===");
    }

    #[test]
    fn accepts_module_directives() {
        let filter = build_filter("relay_server=debug,info");
        let _ = filter.to_string();
    }

    #[test]
    fn init_twice_does_not_panic() {
        let cfg = LoggingSettings::default();
        init_logging(&cfg);
        init_logging(&cfg);
    }
}
