//! Connection handle: an owned driver pool plus the retry policy applied to it.
//!
//! [`DbConnection::open`] takes a driver name and a DSN, the way the rest of the application
//! names its database. The driver name selects both the sqlx backend and the placeholder
//! [`Dialect`]. Pool sizing stays with sqlx, configured through
//! [`PoolSettings`](crate::config::PoolSettings).
//!
//! Every [`DbHandle`] operation on a connection is auto-committing. Use
//! [`DbConnection::begin`] or [`DbConnection::with_transaction`] for atomic units of work.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use log::LevelFilter;
use sqlx::any::{Any, AnyConnectOptions, AnyPoolOptions, AnyRow};
use sqlx::AnyPool;
use sqlx::{ConnectOptions, Connection, FromRow};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::config::{DatabaseConfig, RetryConfig};
use crate::db::context::Context;
use crate::db::errors::{DbError, Result};
use crate::db::handle::DbHandle;
use crate::db::ops::{self, ExecOutcome, Prepared};
use crate::db::query::{Dialect, SqlValue};
use crate::db::retry::{Backoff, once, retry};
use crate::db::transaction::DbTransaction;

/// Database engines compiled into this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    pub fn from_driver(driver: &str) -> Option<Self> {
        match driver.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pgx" => Some(Backend::Postgres),
            "sqlite" | "sqlite3" => Some(Backend::Sqlite),
            _ => None,
        }
    }

    pub fn dialect(self) -> Dialect {
        match self {
            Backend::Postgres => Dialect::Dollar,
            Backend::Sqlite => Dialect::Question,
        }
    }

    /// Turn a DSN into a sqlx URL. URLs pass through; bare SQLite paths are opened
    /// read-write-create and bare Postgres DSNs get a scheme.
    pub fn connection_url(self, dsn: &str) -> String {
        let dsn = dsn.trim();
        match self {
            Backend::Sqlite if dsn == ":memory:" => "sqlite::memory:".to_string(),
            _ if dsn.contains("://") || dsn.starts_with("sqlite:") => dsn.to_string(),
            Backend::Sqlite => format!("sqlite://{dsn}?mode=rwc"),
            Backend::Postgres => format!("postgres://{dsn}"),
        }
    }

    fn accepts(self, url: &str) -> bool {
        match self {
            Backend::Postgres => url.starts_with("postgres://") || url.starts_with("postgresql://"),
            Backend::Sqlite => url.starts_with("sqlite:"),
        }
    }
}

/// Transaction isolation level; `Default` leaves the engine's own default in place
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn as_sql(self) -> Option<&'static str> {
        match self {
            IsolationLevel::Default => None,
            IsolationLevel::ReadUncommitted => Some("READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => Some("READ COMMITTED"),
            IsolationLevel::RepeatableRead => Some("REPEATABLE READ"),
            IsolationLevel::Serializable => Some("SERIALIZABLE"),
        }
    }
}

/// Options for [`DbConnection::begin`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

impl TxOptions {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn with_isolation(isolation: IsolationLevel) -> Self {
        Self {
            isolation,
            ..Self::default()
        }
    }

    /// Statement issued right after BEGIN, if the options need one
    fn setup_statement(&self, backend: Backend) -> Result<Option<String>> {
        if *self == TxOptions::default() {
            return Ok(None);
        }
        match backend {
            Backend::Sqlite => Err(DbError::invalid_argument(format!(
                "sqlite transactions only support default options, got {self:?}"
            ))),
            Backend::Postgres => {
                let mut modes = Vec::new();
                if let Some(level) = self.isolation.as_sql() {
                    modes.push(format!("ISOLATION LEVEL {level}"));
                }
                if self.read_only {
                    modes.push("READ ONLY".to_string());
                }
                Ok(Some(format!("SET TRANSACTION {}", modes.join(" "))))
            }
        }
    }
}

/// Connection handle wrapping the driver's pool
#[derive(Debug)]
pub struct DbConnection {
    pool: AnyPool,
    backend: Backend,
    retry: RetryConfig,
}

impl DbConnection {
    /// Open `dsn` with the named driver, default pool settings and the default retry policy
    pub async fn open(driver: &str, dsn: &str) -> Result<Self> {
        let config = DatabaseConfig {
            driver: driver.to_string(),
            url: dsn.to_string(),
            ..DatabaseConfig::default()
        };
        Self::open_with(&config, RetryConfig::default()).await
    }

    #[instrument(skip_all, fields(driver = %config.driver))]
    pub async fn open_with(config: &DatabaseConfig, retry: RetryConfig) -> Result<Self> {
        let backend = Backend::from_driver(&config.driver)
            .ok_or_else(|| DbError::invalid_argument(format!("unsupported database driver '{}'", config.driver)))?;

        let url = backend.connection_url(&config.url);
        if !backend.accepts(&url) {
            return Err(DbError::invalid_argument(format!(
                "DSN does not match the '{}' driver",
                config.driver
            )));
        }

        sqlx::any::install_default_drivers();

        let mut options = AnyConnectOptions::from_str(&url)?;
        options = if config.slow_statement_threshold_ms > 0 {
            options.log_slow_statements(LevelFilter::Warn, Duration::from_millis(config.slow_statement_threshold_ms))
        } else {
            options.log_slow_statements(LevelFilter::Off, Duration::default())
        };

        let pool_settings = &config.pool;
        let mut pool_options = AnyPoolOptions::new()
            .max_connections(pool_settings.max_connections)
            .min_connections(pool_settings.min_connections)
            .acquire_timeout(Duration::from_secs(pool_settings.acquire_timeout_secs))
            .idle_timeout((pool_settings.idle_timeout_secs > 0).then(|| Duration::from_secs(pool_settings.idle_timeout_secs)))
            .max_lifetime((pool_settings.max_lifetime_secs > 0).then(|| Duration::from_secs(pool_settings.max_lifetime_secs)));

        // An in-memory SQLite database lives and dies with its single connection
        if url == "sqlite::memory:" {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;
        info!(dialect = ?backend.dialect(), "Database connection opened");

        Ok(Self { pool, backend, retry })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Fresh policy for one retried operation
    pub(crate) fn backoff(&self) -> Backoff {
        Backoff::from(&self.retry)
    }

    /// Open a transaction on one of the pool's connections
    #[instrument(skip_all, fields(operation = "begin", dialect = ?self.backend.dialect()))]
    pub async fn begin(&self, ctx: &Context, options: TxOptions) -> Result<DbTransaction<'_>> {
        let setup = options.setup_statement(self.backend)?;
        let setup = setup.as_deref();
        let pool = &self.pool;

        let tx = retry(ctx, &self.backoff(), "begin", move || async move {
            let mut tx = pool.begin().await?;
            if let Some(sql) = setup {
                sqlx::query(sql).execute(&mut *tx).await?;
            }
            Ok::<_, DbError>(tx)
        })
        .await?;

        Ok(DbTransaction::new(self, tx))
    }

    /// Run `f` inside a transaction: commit when it returns `Ok`, roll back when it fails.
    ///
    /// `f` receives the transaction and `ctx`, so the body can borrow both without cloning.
    ///
    /// A failed rollback is not reported over the body's error; the driver discards the
    /// transaction when its connection returns to the pool.
    pub async fn with_transaction<T, F>(&self, ctx: &Context, options: TxOptions, f: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t DbTransaction<'_>, &'t Context) -> BoxFuture<'t, Result<T>> + Send,
    {
        let tx = self.begin(ctx, options).await?;
        match f(&tx, ctx).await {
            Ok(value) => {
                tx.commit(ctx).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback(ctx).await {
                    debug!(error = %rollback, "Rollback after failed transaction body did not complete");
                }
                Err(err)
            }
        }
    }

    /// Close every pooled connection, waiting for checked-out ones to return
    pub async fn close(self) {
        self.pool.close().await;
        debug!("Database connection closed");
    }
}

#[async_trait]
impl DbHandle for DbConnection {
    fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    #[instrument(skip_all, fields(operation = "ping", dialect = ?self.dialect()))]
    async fn ping(&self, ctx: &Context) -> Result<()> {
        let pool = &self.pool;
        retry(ctx, &self.backoff(), "ping", move || async move {
            let mut conn = pool.acquire().await?;
            conn.ping().await?;
            Ok::<_, DbError>(())
        })
        .await
    }

    #[instrument(skip_all, fields(operation = "get", dialect = ?self.dialect()))]
    async fn get<T>(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<T>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let (pool, backend) = (&self.pool, self.backend);
        retry(ctx, &self.backoff(), "get", move || ops::fetch_one(pool, backend, sql, args)).await
    }

    #[instrument(skip_all, fields(operation = "select", dialect = ?self.dialect()))]
    async fn select<T>(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let (pool, backend) = (&self.pool, self.backend);
        retry(ctx, &self.backoff(), "select", move || ops::fetch_all(pool, backend, sql, args)).await
    }

    #[instrument(skip_all, fields(operation = "exec", dialect = ?self.dialect()))]
    async fn exec(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<ExecOutcome> {
        let (pool, backend) = (&self.pool, self.backend);
        retry(ctx, &self.backoff(), "exec", move || async move {
            let mut conn = pool.acquire().await?;
            ops::execute(&mut conn, backend, sql, args).await
        })
        .await
    }

    fn query_rows<'a>(&'a self, ctx: &'a Context, sql: &'a str, args: &'a [SqlValue]) -> BoxStream<'a, Result<AnyRow>> {
        let (pool, backend) = (&self.pool, self.backend);
        Box::pin(async_stream::try_stream! {
            if let Some(err) = ctx.err() {
                Err::<(), _>(err)?;
            }
            let (sql, args) = ops::bind(backend, sql, args);
            let mut rows = sqlx::query_with::<Any, _>(&sql, ops::arguments(&args)?).fetch(pool);
            while let Some(row) = ops::next_row(ctx, &mut rows).await? {
                yield row;
            }
        })
    }

    #[instrument(skip_all, fields(operation = "query_row", dialect = ?self.dialect()))]
    async fn query_row(&self, ctx: &Context, sql: &str, args: &[SqlValue]) -> Result<AnyRow> {
        once(ctx, ops::fetch_row(&self.pool, self.backend, sql, args)).await
    }

    #[instrument(skip_all, fields(operation = "prepare", dialect = ?self.dialect()))]
    async fn prepare(&self, ctx: &Context, sql: &str) -> Result<Prepared> {
        let pool = &self.pool;
        retry(ctx, &self.backoff(), "prepare", move || ops::prepare(pool, sql)).await
    }

    #[instrument(skip_all, fields(operation = "exec_prepared", dialect = ?self.dialect()))]
    async fn exec_prepared(&self, ctx: &Context, prepared: &Prepared, args: &[SqlValue]) -> Result<ExecOutcome> {
        let (pool, backend) = (&self.pool, self.backend);
        retry(ctx, &self.backoff(), "exec_prepared", move || async move {
            let mut conn = pool.acquire().await?;
            ops::execute_prepared(&mut conn, backend, prepared, args).await
        })
        .await
    }

    #[instrument(skip_all, fields(operation = "select_prepared", dialect = ?self.dialect()))]
    async fn select_prepared<T>(&self, ctx: &Context, prepared: &Prepared, args: &[SqlValue]) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let (pool, backend) = (&self.pool, self.backend);
        retry(ctx, &self.backoff(), "select_prepared", move || {
            ops::fetch_all_prepared(pool, backend, prepared, args)
        })
        .await
    }
}
