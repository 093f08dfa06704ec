//! # catalogdb: data access for the catalog backend
//!
//! `catalogdb` is the layer between the catalog's resource handlers (entries, tags, colors,
//! styles, links, personalities) and its relational database. Handlers are written once against
//! the [`DbHandle`](db::DbHandle) contract and run unmodified on a bare connection or inside a
//! transaction.
//!
//! ## What It Does
//!
//! - Wraps a sqlx pool ([`DbConnection`](db::DbConnection)) and its transactions
//!   ([`DbTransaction`](db::DbTransaction)) behind one operation set.
//! - Retries failed operations with bounded exponential backoff, aborting promptly when the
//!   caller's [`Context`](db::Context) is cancelled or its deadline passes.
//! - Builds `IN (...)` queries from variable-length lists and rewrites placeholders for the
//!   target engine ([`db::query`]).
//!
//! Postgres and SQLite are supported. Configuration ([`config`]) is YAML with environment
//! overrides, and [`telemetry`] sets up `tracing` output for the operator binary.

pub mod config;
pub mod db;
pub mod errors;
pub mod telemetry;
#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use errors::Error;

use anyhow::Context as _;
use std::time::Duration;

use crate::db::{Context, DbConnection, DbHandle, Dialect};

/// Open the configured database, ping it within `timeout` and close it again.
///
/// Returns the placeholder dialect statements for this database must use.
pub async fn check_database(config: &Config, timeout: Duration) -> Result<Dialect, Error> {
    let conn = DbConnection::open_with(&config.database, config.retry.clone()).await?;

    let ctx = Context::new().with_timeout(timeout);
    let ping = conn.ping(&ctx).await;
    let dialect = conn.dialect();
    conn.close().await;

    ping.with_context(|| format!("{} database did not answer ping", config.database.driver))?;
    Ok(dialect)
}
