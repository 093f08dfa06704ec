//! Transaction handle: one in-flight transaction borrowed from a [`DbConnection`].
//!
//! State machine: open until the first [`commit`](DbTransaction::commit) or
//! [`rollback`](DbTransaction::rollback), then closed for good. Every operation on a closed
//! handle, including a second commit or rollback, fails with [`DbError::TransactionClosed`].
//!
//! The transaction runs on a single server connection, so one operation holds it at a time.
//! An operation issued while another one still holds it, typically while a
//! [`query_rows`](DbHandle::query_rows) stream is alive, fails at once with
//! [`DbError::TransactionBusy`] instead of waiting. A handle dropped while still open is rolled
//! back by the driver.

use async_trait::async_trait;
use futures::stream::BoxStream;
use sqlx::any::{Any, AnyRow};
use sqlx::{Connection, FromRow, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::instrument;

use crate::db::connection::DbConnection;
use crate::db::context::Context;
use crate::db::errors::{DbError, Result};
use crate::db::handle::DbHandle;
use crate::db::ops::{self, ExecOutcome, Prepared};
use crate::db::query::{Dialect, SqlValue};
use crate::db::retry::{once, retry};

type Slot = Option<Transaction<'static, Any>>;

pub struct DbTransaction<'c> {
    conn: &'c DbConnection,
    inner: Mutex<Slot>,
}

impl<'c> DbTransaction<'c> {
    pub(crate) fn new(conn: &'c DbConnection, tx: Transaction<'static, Any>) -> Self {
        Self {
            conn,
            inner: Mutex::new(Some(tx)),
        }
    }

    /// The connection this transaction was begun on
    pub fn connection(&self) -> &'c DbConnection {
        self.conn
    }

    /// `false` once committed or rolled back
    pub fn is_open(&self) -> bool {
        self.inner.try_lock().map_or(true, |slot| slot.is_some())
    }

    /// Commit. Terminal whatever the outcome, unless `ctx` had already fired or the
    /// transaction was busy.
    ///
    /// Unlike the other operations this is a single attempt: the driver consumes the
    /// transaction when the commit is sent, so there is nothing left to reattempt with. A
    /// failed commit is returned as-is and the handle is closed. Cancellation is still
    /// observed: a context that fired before the call leaves the transaction open and
    /// untouched, and one that fires mid-commit abandons the wait, after which the driver
    /// rolls back whatever did not complete.
    #[instrument(skip_all, fields(operation = "commit", dialect = ?self.dialect()))]
    pub async fn commit(&self, ctx: &Context) -> Result<()> {
        let tx = self.take(ctx)?;
        once(ctx, async move { tx.commit().await.map_err(DbError::from) }).await
    }

    /// Roll back. Terminal whatever the outcome, unless `ctx` had already fired or the
    /// transaction was busy.
    ///
    /// A single attempt, for the same reason as [`commit`](DbTransaction::commit). A rollback
    /// that fails or is abandoned still discards the transaction, since the driver rolls back
    /// any transaction it drops.
    #[instrument(skip_all, fields(operation = "rollback", dialect = ?self.dialect()))]
    pub async fn rollback(&self, ctx: &Context) -> Result<()> {
        let tx = self.take(ctx)?;
        once(ctx, async move { tx.rollback().await.map_err(DbError::from) }).await
    }

    /// Exclusive use of the transaction for one attempt
    fn lock(&self) -> Result<MutexGuard<'_, Slot>> {
        self.inner.try_lock().map_err(|_| DbError::TransactionBusy)
    }

    fn take(&self, ctx: &Context) -> Result<Transaction<'static, Any>> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        self.lock()?.take().ok_or(DbError::TransactionClosed)
    }
}

#[async_trait]
impl DbHandle for DbTransaction<'_> {
    fn dialect(&self) -> Dialect {
        self.conn.backend().dialect()
    }

    #[instrument(skip_all, fields(operation = "ping", dialect = ?self.dialect()))]
    async fn ping(&self, ctx: &Context) -> Result<()> {
        retry(ctx, &self.conn.backoff(), "ping", move || async move {
            let mut guard = self.lock()?;
            let tx = guard.as_mut().ok_or(DbError::TransactionClosed)?;
            tx.ping().await?;
            Ok::<_, DbError>(())
        })
        .await
    }

    #[instrument(skip_all, fields(operation = "get", dialect = ?self.dialect()))]
    async fn get<T>(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<T>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let backend = self.conn.backend();
        retry(ctx, &self.conn.backoff(), "get", move || async move {
            let mut guard = self.lock()?;
            let tx = guard.as_mut().ok_or(DbError::TransactionClosed)?;
            ops::fetch_one(&mut **tx, backend, sql, args).await
        })
        .await
    }

    #[instrument(skip_all, fields(operation = "select", dialect = ?self.dialect()))]
    async fn select<T>(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let backend = self.conn.backend();
        retry(ctx, &self.conn.backoff(), "select", move || async move {
            let mut guard = self.lock()?;
            let tx = guard.as_mut().ok_or(DbError::TransactionClosed)?;
            ops::fetch_all(&mut **tx, backend, sql, args).await
        })
        .await
    }

    #[instrument(skip_all, fields(operation = "exec", dialect = ?self.dialect()))]
    async fn exec(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<ExecOutcome> {
        let backend = self.conn.backend();
        retry(ctx, &self.conn.backoff(), "exec", move || async move {
            let mut guard = self.lock()?;
            let tx = guard.as_mut().ok_or(DbError::TransactionClosed)?;
            ops::execute(&mut **tx, backend, sql, args).await
        })
        .await
    }

    /// Holds the transaction until the stream is dropped or exhausted
    fn query_rows<'a>(&'a self, ctx: &'a Context, sql: &'a str, args: &'a [SqlValue]) -> BoxStream<'a, Result<AnyRow>> {
        let backend = self.conn.backend();
        Box::pin(async_stream::try_stream! {
            if let Some(err) = ctx.err() {
                Err::<(), _>(err)?;
            }
            let mut guard = self.lock()?;
            let tx = guard.as_mut().ok_or(DbError::TransactionClosed)?;
            let (sql, args) = ops::bind(backend, sql, args);
            let mut rows = sqlx::query_with::<Any, _>(&sql, ops::arguments(&args)?).fetch(&mut **tx);
            while let Some(row) = ops::next_row(ctx, &mut rows).await? {
                yield row;
            }
        })
    }

    #[instrument(skip_all, fields(operation = "query_row", dialect = ?self.dialect()))]
    async fn query_row(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<AnyRow> {
        let backend = self.conn.backend();
        once(ctx, async {
            let mut guard = self.lock()?;
            let tx = guard.as_mut().ok_or(DbError::TransactionClosed)?;
            ops::fetch_row(&mut **tx, backend, sql, args).await
        })
        .await
    }

    #[instrument(skip_all, fields(operation = "prepare", dialect = ?self.dialect()))]
    async fn prepare(&self, ctx: &Context, sql: &str) -> Result<Prepared> {
        retry(ctx, &self.conn.backoff(), "prepare", move || async move {
            let mut guard = self.lock()?;
            let tx = guard.as_mut().ok_or(DbError::TransactionClosed)?;
            ops::prepare(&mut **tx, sql).await
        })
        .await
    }

    #[instrument(skip_all, fields(operation = "exec_prepared", dialect = ?self.dialect()))]
    async fn exec_prepared(&self, ctx: &Context, prepared: &Prepared, args: &[SqlValue]) -> Result<ExecOutcome> {
        let backend = self.conn.backend();
        retry(ctx, &self.conn.backoff(), "exec_prepared", move || async move {
            let mut guard = self.lock()?;
            let tx = guard.as_mut().ok_or(DbError::TransactionClosed)?;
            ops::execute_prepared(&mut **tx, backend, prepared, args).await
        })
        .await
    }

    #[instrument(skip_all, fields(operation = "select_prepared", dialect = ?self.dialect()))]
    async fn select_prepared<T>(&self, ctx: &Context, prepared: &Prepared, args: &[SqlValue]) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let backend = self.conn.backend();
        retry(ctx, &self.conn.backoff(), "select_prepared", move || async move {
            let mut guard = self.lock()?;
            let tx = guard.as_mut().ok_or(DbError::TransactionClosed)?;
            ops::fetch_all_prepared(&mut **tx, backend, prepared, args).await
        })
        .await
    }
}
