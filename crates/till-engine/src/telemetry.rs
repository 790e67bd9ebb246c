//! Tracing setup for hosts embedding the engine.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,till=debug,sqlx=warn";

/// Installs the global fmt subscriber.
///
/// ## Environment Variables
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=till_engine=trace` - Show trace for the engine only
/// - Default: [`DEFAULT_FILTER`]
///
/// Calling it again (or after the host installed its own subscriber) is a
/// no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
