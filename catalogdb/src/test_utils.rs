//! Fixtures shared by the unit tests.
//!
//! Every test gets a SQLite database in a temp directory. Setting `TEST_DATABASE_URL` (or
//! `DATABASE_URL`) to a Postgres URL also runs the suites that go through [`TestDb::all`]
//! against Postgres, each test in a schema of its own.

use std::time::Duration;
use tempfile::TempDir;

use crate::config::{DatabaseConfig, RetryConfig};
use crate::db::{Backend, Context, DbConnection, DbHandle};

const SQLITE_SCHEMA: &[&str] = &[
    "CREATE TABLE entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        color TEXT,
        rank INTEGER NOT NULL DEFAULT 0,
        position INTEGER
    )",
    "CREATE TABLE tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entry_id INTEGER NOT NULL REFERENCES entries(id),
        label TEXT NOT NULL
    )",
];

const POSTGRES_SCHEMA: &[&str] = &[
    "CREATE TABLE entries (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        color TEXT,
        rank BIGINT NOT NULL DEFAULT 0,
        position BIGINT
    )",
    "CREATE TABLE tags (
        id BIGSERIAL PRIMARY KEY,
        entry_id BIGINT NOT NULL REFERENCES entries(id),
        label TEXT NOT NULL
    )",
];

/// Retry policy that exhausts within a few milliseconds
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        initial_interval: Duration::from_millis(1),
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_interval: Duration::from_millis(10),
        max_elapsed_time: Duration::from_millis(50),
        classify_errors: false,
    }
}

fn postgres_url() -> Option<String> {
    ["TEST_DATABASE_URL", "DATABASE_URL"]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|url| url.starts_with("postgres://") || url.starts_with("postgresql://"))
}

enum Cleanup {
    Dir(TempDir),
    Schema { admin: DbConnection, name: String },
}

/// A connection with the catalog schema, torn down by [`TestDb::close`] (or on drop for SQLite)
pub struct TestDb {
    pub conn: DbConnection,
    cleanup: Cleanup,
}

impl TestDb {
    /// A file-backed SQLite database
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("catalog.db");
        let config = DatabaseConfig {
            driver: "sqlite".to_string(),
            url: path.to_str().expect("temp path is not UTF-8").to_string(),
            ..DatabaseConfig::default()
        };

        let conn = DbConnection::open_with(&config, fast_retry())
            .await
            .expect("Failed to open test database");
        create_schema(&conn, SQLITE_SCHEMA).await;

        Self {
            conn,
            cleanup: Cleanup::Dir(dir),
        }
    }

    /// A fresh schema on the configured Postgres server, `None` when none is configured
    pub async fn postgres() -> Option<Self> {
        let url = postgres_url()?;
        let name = format!("catalogdb_test_{:016x}", rand::random::<u64>());

        let admin_config = DatabaseConfig {
            driver: "postgres".to_string(),
            url: url.clone(),
            ..DatabaseConfig::default()
        };
        let admin = DbConnection::open_with(&admin_config, fast_retry())
            .await
            .expect("Failed to open Postgres test database");
        admin
            .exec(&Context::new(), &format!("CREATE SCHEMA {name}"), &[])
            .await
            .expect("Failed to create test schema");

        let separator = if url.contains('?') { '&' } else { '?' };
        let config = DatabaseConfig {
            url: format!("{url}{separator}options=-c%20search_path%3D{name}"),
            ..admin_config
        };
        let conn = DbConnection::open_with(&config, fast_retry())
            .await
            .expect("Failed to open Postgres test schema");
        create_schema(&conn, POSTGRES_SCHEMA).await;

        Some(Self {
            conn,
            cleanup: Cleanup::Schema { admin, name },
        })
    }

    /// SQLite, followed by Postgres when a server is configured
    pub async fn all() -> Vec<Self> {
        let mut dbs = vec![Self::new().await];
        dbs.extend(Self::postgres().await);
        dbs
    }

    pub fn backend(&self) -> Backend {
        self.conn.backend()
    }

    /// Rebind a `?` template for this database
    pub fn sql(&self, sql: &str) -> String {
        self.conn.rebind(sql, sql.matches('?').count())
    }

    pub async fn close(self) {
        self.conn.close().await;
        match self.cleanup {
            Cleanup::Dir(dir) => drop(dir),
            Cleanup::Schema { admin, name } => {
                admin
                    .exec(&Context::new(), &format!("DROP SCHEMA {name} CASCADE"), &[])
                    .await
                    .expect("Failed to drop test schema");
                admin.close().await;
            }
        }
    }
}

async fn create_schema(conn: &DbConnection, statements: &[&str]) {
    let ctx = Context::new();
    for statement in statements {
        conn.exec(&ctx, statement, &[]).await.expect("Failed to create schema");
    }
}

/// Insert an entry and return its id
pub async fn insert_entry(conn: &DbConnection, name: &str, rank: i64) -> i64 {
    let sql = conn.rebind("INSERT INTO entries (name, rank) VALUES (?, ?) RETURNING id", 2);
    let (id,): (i64,) = conn
        .get(&Context::new(), &sql, &[name.into(), rank.into()])
        .await
        .expect("Failed to insert entry");
    id
}
