//! Logging and tracing utilities
//!
//! Output goes to stderr so that machine-readable results on stdout stay
//! clean. `RUST_LOG` overrides the default `info` filter.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize tracing subscriber with default configuration
pub fn init_tracing() {
    init_tracing_with("info");
}

/// Initialize tracing with `default_filter` unless `RUST_LOG` is set
pub fn init_tracing_with(default_filter: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize tracing with one JSON object per event
pub fn init_tracing_json() {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();
}
