//! Single-attempt statement execution shared by both handles.
//!
//! Reads are generic over a sqlx [`Executor`], so [`DbConnection`] passes its pool and
//! [`DbTransaction`] passes its transaction's connection. Writes take one connection, checked
//! out of the pool or borrowed from the transaction. Retrying and cancellation are layered
//! on top by the handles.
//!
//! [`DbConnection`]: crate::db::DbConnection
//! [`DbTransaction`]: crate::db::DbTransaction

use futures::TryStreamExt;
use futures::stream::BoxStream;
use sqlx::any::{Any, AnyArguments, AnyQueryResult, AnyRow, AnyStatement};
use sqlx::AnyConnection;
use sqlx::{Arguments, Column, Executor, FromRow, Statement};
use std::borrow::Cow;
use std::fmt;

use crate::db::connection::Backend;
use crate::db::context::Context;
use crate::db::errors::{DbError, Result};
use crate::db::query::{self, SqlValue};

/// Outcome of a statement that returns no rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Row id generated by an `INSERT` on SQLite. Postgres reports none; use `RETURNING`.
    pub last_insert_id: Option<i64>,
}

impl From<AnyQueryResult> for ExecOutcome {
    fn from(result: AnyQueryResult) -> Self {
        ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_id(),
        }
    }
}

/// A compiled statement, reusable on the handle that prepared it
pub struct Prepared {
    pub(crate) statement: AnyStatement<'static>,
}

impl Prepared {
    pub fn sql(&self) -> &str {
        self.statement.sql()
    }

    /// Names of the result columns, empty for statements that return no rows
    pub fn column_names(&self) -> Vec<String> {
        self.statement.columns().iter().map(|column| column.name().to_string()).collect()
    }
}

impl fmt::Debug for Prepared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prepared").field("sql", &self.sql()).finish()
    }
}

/// Statement text and arguments as they go to the driver.
///
/// The Any driver binds a null with a concrete type, which Postgres rejects for columns of
/// any other type, so on Postgres null arguments are written into the statement as `NULL`.
pub(crate) fn bind<'a>(backend: Backend, sql: &'a str, args: &'a [SqlValue]) -> (Cow<'a, str>, Cow<'a, [SqlValue]>) {
    let inlined = match backend {
        Backend::Postgres => query::inline_nulls(sql, args),
        Backend::Sqlite => None,
    };
    match inlined {
        Some((sql, args)) => (Cow::Owned(sql), Cow::Owned(args)),
        None => (Cow::Borrowed(sql), Cow::Borrowed(args)),
    }
}

/// Bind positional values in order
pub(crate) fn arguments(args: &[SqlValue]) -> Result<AnyArguments<'_>> {
    let mut arguments = AnyArguments::default();
    for arg in args {
        let added = match arg {
            SqlValue::Null => arguments.add(None::<String>),
            SqlValue::Bool(v) => arguments.add(*v),
            SqlValue::Int(v) => arguments.add(*v),
            SqlValue::Float(v) => arguments.add(*v),
            SqlValue::Text(v) => arguments.add(v.as_str()),
            SqlValue::Bytes(v) => arguments.add(v.as_slice()),
        };
        added.map_err(|e| DbError::invalid_argument(format!("could not encode argument: {e}")))?;
    }
    Ok(arguments)
}

/// Whether `sql` starts with `INSERT` or `REPLACE`, the statements that set SQLite's row id
fn is_insert(sql: &str) -> bool {
    let keyword: String = sql
        .trim_start()
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();
    keyword.eq_ignore_ascii_case("insert") || keyword.eq_ignore_ascii_case("replace")
}

/// Attach the generated row id. SQLite keeps it per connection and the Any driver does not
/// report it, so it is read back on the connection that ran the insert.
async fn with_insert_id(conn: &mut AnyConnection, backend: Backend, sql: &str, result: AnyQueryResult) -> Result<ExecOutcome> {
    let mut outcome = ExecOutcome::from(result);
    if backend == Backend::Sqlite && outcome.last_insert_id.is_none() && outcome.rows_affected > 0 && is_insert(sql) {
        let (id,): (i64,) = sqlx::query_as::<Any, (i64,)>("SELECT last_insert_rowid()")
            .fetch_one(&mut *conn)
            .await?;
        outcome.last_insert_id = Some(id);
    }
    Ok(outcome)
}

pub(crate) async fn fetch_one<'c, E, T>(executor: E, backend: Backend, sql: &str, args: &[SqlValue]) -> Result<T>
where
    E: Executor<'c, Database = Any>,
    T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
{
    let (sql, args) = bind(backend, sql, args);
    let row = sqlx::query_as_with::<Any, T, _>(&sql, arguments(&args)?)
        .fetch_one(executor)
        .await?;
    Ok(row)
}

pub(crate) async fn fetch_all<'c, E, T>(executor: E, backend: Backend, sql: &str, args: &[SqlValue]) -> Result<Vec<T>>
where
    E: Executor<'c, Database = Any>,
    T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
{
    let (sql, args) = bind(backend, sql, args);
    let rows = sqlx::query_as_with::<Any, T, _>(&sql, arguments(&args)?)
        .fetch_all(executor)
        .await?;
    Ok(rows)
}

/// Run a statement on one connection, so a SQLite row id can be read back from it
pub(crate) async fn execute(conn: &mut AnyConnection, backend: Backend, sql: &str, args: &[SqlValue]) -> Result<ExecOutcome> {
    let (bound_sql, bound_args) = bind(backend, sql, args);
    let result = sqlx::query_with::<Any, _>(&bound_sql, arguments(&bound_args)?)
        .execute(&mut *conn)
        .await?;
    with_insert_id(conn, backend, sql, result).await
}

/// One raw row; zero rows is [`DbError::NotFound`]
pub(crate) async fn fetch_row<'c, E>(executor: E, backend: Backend, sql: &str, args: &[SqlValue]) -> Result<AnyRow>
where
    E: Executor<'c, Database = Any>,
{
    let (sql, args) = bind(backend, sql, args);
    sqlx::query_with::<Any, _>(&sql, arguments(&args)?)
        .fetch_optional(executor)
        .await?
        .ok_or(DbError::NotFound)
}

pub(crate) async fn prepare<'c, E>(executor: E, sql: &str) -> Result<Prepared>
where
    E: Executor<'c, Database = Any>,
{
    let statement = executor.prepare(sql).await?;
    Ok(Prepared {
        statement: Statement::to_owned(&statement),
    })
}

/// Prepared execution; statements whose nulls were inlined run from their text instead
pub(crate) async fn execute_prepared(conn: &mut AnyConnection, backend: Backend, prepared: &Prepared, args: &[SqlValue]) -> Result<ExecOutcome> {
    let (sql, bound_args) = bind(backend, prepared.sql(), args);
    let query = match &sql {
        Cow::Borrowed(_) => prepared.statement.query_with(arguments(&bound_args)?),
        Cow::Owned(inlined) => sqlx::query_with::<Any, _>(inlined, arguments(&bound_args)?),
    };
    let result = query.execute(&mut *conn).await?;
    with_insert_id(conn, backend, prepared.sql(), result).await
}

pub(crate) async fn fetch_all_prepared<'c, E, T>(executor: E, backend: Backend, prepared: &Prepared, args: &[SqlValue]) -> Result<Vec<T>>
where
    E: Executor<'c, Database = Any>,
    T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
{
    let (sql, bound_args) = bind(backend, prepared.sql(), args);
    let rows = match &sql {
        Cow::Borrowed(_) => {
            prepared
                .statement
                .query_as_with::<T, _>(arguments(&bound_args)?)
                .fetch_all(executor)
                .await?
        }
        Cow::Owned(inlined) => {
            sqlx::query_as_with::<Any, T, _>(inlined, arguments(&bound_args)?)
                .fetch_all(executor)
                .await?
        }
    };
    Ok(rows)
}

/// Next row from a driver cursor, abandoned if `ctx` fires first
pub(crate) async fn next_row(ctx: &Context, rows: &mut BoxStream<'_, std::result::Result<AnyRow, sqlx::Error>>) -> Result<Option<AnyRow>> {
    tokio::select! {
        biased;
        err = ctx.done() => Err(err),
        next = rows.try_next() => next.map_err(DbError::from),
    }
}
