//! Logging initialization
//!
//! The host runtime owns the process, so installing the subscriber is
//! best-effort: a subscriber already set by the host wins.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a tracing subscriber with an env filter.
///
/// `RUST_LOG` overrides `default_filter` when set. Returns `false` if a
/// global subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
