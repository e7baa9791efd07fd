//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::{BridgeError, BridgeResult};

/// Install the global fmt subscriber at `info`, overridable with `RUST_LOG`.
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn init_tracing() -> BridgeResult<()> {
    init_tracing_with("info")
}

/// Install the global fmt subscriber with `default_directive` as the filter
/// used when `RUST_LOG` is unset.
///
/// # Errors
/// Fails for an unparsable directive or if a global subscriber is already
/// installed.
pub fn init_tracing_with(default_directive: &str) -> BridgeResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|e| BridgeError::config(format!("log_level: {e}")))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| BridgeError::config(format!("tracing: {e}")))
}
