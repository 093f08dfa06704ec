//! Tracing initialization for the operator binary.
//!
//! Output goes to stdout through the `tracing-subscriber` fmt layer, filtered by `RUST_LOG`
//! (default `info`). sqlx statement logs arrive through the `log` bridge, so slow statements
//! show up as `WARN` events from the `sqlx::query` target.

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global subscriber. Fails if one is already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");
    Ok(())
}
