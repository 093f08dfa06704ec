use catalogdb::config::Args;
use catalogdb::{Config, check_database, telemetry};
use clap::Parser;
use std::time::Duration;

const PING_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry()?;

    tracing::debug!("{:?}", args);

    let dialect = check_database(&config, PING_TIMEOUT).await?;

    tracing::info!(driver = %config.database.driver, ?dialect, "Database is reachable");
    Ok(())
}
