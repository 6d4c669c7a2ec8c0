#![forbid(unsafe_code)]

//! JSON log output for hosts that do not install their own subscriber.
//!
//! Targets emitted by navsync:
//!
//! | Target | Events |
//! |--------|--------|
//! | `navsync.engine` | location pushes, suppressed writes, lifecycle |
//! | `navsync.params` | parameter mutations and view rebuilds |
//! | `navsync.backend` | applied and malformed backend entries |
//! | `navsync.reactive` | interceptor rejections, flush failures |
//!
//! The filter is read from `NAVSYNC_LOG` using the usual `EnvFilter`
//! syntax, e.g. `NAVSYNC_LOG=navsync.engine=debug`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "NAVSYNC_LOG";

/// Filter used when `NAVSYNC_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "navsync=info";

/// Filter from `NAVSYNC_LOG`, falling back to [`DEFAULT_FILTER`].
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a global JSON subscriber.
///
/// Fails when a global subscriber is already set.
pub fn init_json() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_current_span(true).with_span_list(false))
        .try_init()
}
