//! Data-access layer: retrying connection and transaction handles over sqlx.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   begin    ┌───────────────┐
//! │ DbConnection │ ─────────→ │ DbTransaction │
//! └──────┬───────┘            └───────┬───────┘
//!        │      both implement        │
//!        └──────────┐  ┌──────────────┘
//!                   ↓  ↓
//!              ┌──────────┐
//!              │ DbHandle │  (ping, get, select, exec, named_exec, query_rows, ...)
//!              └────┬─────┘
//!                   ↓
//!              ┌──────────┐
//!              │  retry   │  (Backoff per operation, Context cancellation)
//!              └────┬─────┘
//!                   ↓
//!              ┌──────────┐
//!              │   sqlx   │  (AnyPool: Postgres or SQLite)
//!              └──────────┘
//! ```
//!
//! # Modules
//!
//! - [`connection`]: [`DbConnection`], opening and transactions
//! - [`transaction`]: [`DbTransaction`], commit and rollback
//! - [`handle`]: the [`DbHandle`] contract both handles implement
//! - [`retry`]: backoff policy and retry executor
//! - [`query`]: IN-list expansion, placeholder rebinding, named parameters
//! - [`context`]: cancellation context
//! - [`errors`]: [`DbError`] classification of driver errors
//!
//! ## Example Usage
//!
//! ```ignore
//! use catalogdb::db::{Context, DbConnection, DbHandle, TxOptions};
//!
//! let conn = DbConnection::open("sqlite", "catalog.db").await?;
//! let ctx = Context::new().with_timeout(Duration::from_secs(5));
//!
//! let (sql, args) = conn.expand("SELECT id, name FROM entries WHERE id IN (?)", vec![Param::list([1, 2, 3])])?;
//! let entries: Vec<(i64, String)> = conn.select(&ctx, &sql, &args).await?;
//!
//! let tx = conn.begin(&ctx, TxOptions::default()).await?;
//! tx.exec(&ctx, "DELETE FROM tags WHERE entry_id = ?", &[1.into()]).await?;
//! tx.commit(&ctx).await?;
//! ```

pub mod connection;
pub mod context;
pub mod errors;
pub mod handle;
mod ops;
pub mod query;
pub mod retry;
pub mod transaction;

pub use connection::{Backend, DbConnection, IsolationLevel, TxOptions};
pub use context::Context;
pub use errors::{DbError, Result};
pub use handle::DbHandle;
pub use ops::{ExecOutcome, Prepared};
pub use query::{Dialect, Param, SqlValue, expand, expand_in, rebind};
pub use transaction::DbTransaction;
