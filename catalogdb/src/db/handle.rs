//! The operation contract shared by [`DbConnection`] and [`DbTransaction`].
//!
//! Code generic over `H: DbHandle` runs unmodified on a bare connection or inside a transaction:
//!
//! ```ignore
//! async fn tag_entries<H: DbHandle>(db: &H, ctx: &Context, ids: &[i64], label: &str) -> Result<u64> {
//!     let (sql, args) = db.expand(
//!         "INSERT INTO tags (entry_id, label) SELECT id, ? FROM entries WHERE id IN (?)",
//!         vec![Param::value(label), Param::list(ids.iter().copied())],
//!     )?;
//!     Ok(db.exec(ctx, &sql, &args).await?.rows_affected)
//! }
//! ```
//!
//! Every operation takes a [`Context`] first. `ping`, `get`, `select`, `exec`, `named_exec`,
//! `prepare` and the prepared variants run through the retry executor; `query_rows` and
//! `query_row` are single attempts, since an open cursor cannot survive a reattempt.
//!
//! [`DbConnection`]: crate::db::DbConnection
//! [`DbTransaction`]: crate::db::DbTransaction

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use sqlx::FromRow;
use sqlx::any::AnyRow;

use crate::db::context::Context;
use crate::db::errors::Result;
use crate::db::ops::{ExecOutcome, Prepared};
use crate::db::query::{self, Dialect, Param, SqlValue};

#[async_trait]
pub trait DbHandle: Send + Sync {
    /// Placeholder style statements on this handle must use
    fn dialect(&self) -> Dialect;

    /// Rewrite `count` `?` markers into this handle's placeholder style
    fn rebind(&self, sql: &str, count: usize) -> String {
        query::rebind(self.dialect(), sql, count)
    }

    /// Expand list params and rebind the result for this handle in one step
    fn expand(&self, sql: &str, params: Vec<Param>) -> Result<(String, Vec<SqlValue>)> {
        let (expanded, args) = query::expand(sql, params)?;
        Ok((self.rebind(&expanded, args.len()), args))
    }

    /// Verify the database is reachable
    async fn ping(&self, ctx: &Context) -> Result<()>;

    /// Exactly one row decoded into `T`; zero rows is `NotFound`
    async fn get<T>(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<T>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin;

    /// Zero or more rows decoded into `T`
    async fn select<T>(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin;

    async fn exec(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<ExecOutcome>;

    /// Like [`exec`](DbHandle::exec), with `:name` references resolved from the fields of `arg`
    async fn named_exec<A>(&self, ctx: &Context, sql: &str, arg: &A) -> Result<ExecOutcome>
    where
        A: Serialize + Sync + ?Sized,
    {
        let (sql, args) = query::bind_named(self.dialect(), sql, arg)?;
        self.exec(ctx, &sql, &args).await
    }

    /// Stream raw rows. Not retried; the context is checked between rows.
    fn query_rows<'a>(&'a self, ctx: &'a Context, sql: &'a str, args: &'a [SqlValue]) -> BoxStream<'a, Result<AnyRow>>;

    /// First raw row. Not retried; zero rows is `NotFound`.
    async fn query_row(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<AnyRow>;

    async fn prepare(&self, ctx: &Context, sql: &str) -> Result<Prepared>;

    async fn exec_prepared(&self, ctx: &Context, prepared: &Prepared, args: &[SqlValue]) -> Result<ExecOutcome>;

    async fn select_prepared<T>(&self, ctx: &Context, prepared: &Prepared, args: &[SqlValue]) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin;
}
