//! Tracing subscriber installation for hosts embedding the engine.

use tracing_subscriber::EnvFilter;

/// Installs a JSON `tracing` subscriber filtered by `RUST_LOG`, defaulting
/// to `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .try_init()
}
