//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use super::Database;

/// Latest schema version this build knows how to create
const SCHEMA_VERSION: i64 = 1;

fn connection_failed(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(DatabaseError::ConnectionFailed(format!("{}: {}", context, e)))
}

fn migration_failed(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(DatabaseError::MigrationFailed(format!("{}: {}", context, e)))
}

impl Database {
    /// Open (or create) the database at `path` and bring its schema up to date
    pub async fn new(path: &Path) -> Result<Self> {
        // `Path::parent` of a bare file name is "", which create_dir_all rejects
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        // WAL lets the record reads run while a writer batch is committing
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(connection_failed("Failed to parse database path"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(connection_failed("Failed to connect to database"))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(connection_failed("Failed to acquire connection"))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
        )
        .execute(&mut *conn)
        .await
        .map_err(migration_failed("Failed to create schema_version table"))?;

        // MAX over an empty table is a single NULL row, hence the flatten
        let applied: i64 =
            sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(migration_failed("Failed to query schema version"))?
                .flatten()
                .unwrap_or(0);

        if applied < 1 {
            Self::migrate_v1(&mut conn).await?;
        }
        if applied > SCHEMA_VERSION {
            tracing::warn!(
                applied,
                known = SCHEMA_VERSION,
                "database schema is newer than this build"
            );
        }
        Ok(())
    }

    /// Migration v1: option records and the ticker registry
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v1");

        // One transaction, so a failure halfway leaves no table without its version row
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(migration_failed("Failed to begin migration v1"))?;

        let applied = async {
            // The key is fixed-width TEXT, so text order is numeric key order
            sqlx::query(
                "CREATE TABLE option_records (
                    ticker TEXT NOT NULL,
                    collected_expiration_key TEXT NOT NULL,
                    calls TEXT,
                    puts TEXT,
                    PRIMARY KEY (ticker, collected_expiration_key)
                )",
            )
            .execute(&mut *conn)
            .await
            .map_err(migration_failed("Failed to create option_records table"))?;

            // `collecting` is "TRUE" while active and an opaque id once retired,
            // so a ticker can be re-added without clashing with its history
            sqlx::query(
                "CREATE TABLE tickers (
                    ticker TEXT NOT NULL,
                    collecting TEXT NOT NULL,
                    starting TEXT,
                    ending TEXT,
                    errors INTEGER NOT NULL DEFAULT 0,
                    err_emavg REAL,
                    flag_state TEXT,
                    flag_reason TEXT,
                    last_timestamp INTEGER,
                    PRIMARY KEY (ticker, collecting)
                )",
            )
            .execute(&mut *conn)
            .await
            .map_err(migration_failed("Failed to create tickers table"))?;

            sqlx::query("CREATE INDEX idx_tickers_collecting ON tickers(collecting)")
                .execute(&mut *conn)
                .await
                .map_err(migration_failed("Failed to create tickers index"))?;

            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (1, ?)")
                .bind(chrono::Utc::now().timestamp())
                .execute(&mut *conn)
                .await
                .map_err(migration_failed("Failed to record migration v1"))?;

            Ok::<(), Error>(())
        }
        .await;

        if let Err(e) = applied {
            // Rollback errors are secondary; the original failure is what matters
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(e);
        }

        sqlx::query("COMMIT")
            .execute(&mut *conn)
            .await
            .map_err(migration_failed("Failed to commit migration v1"))?;

        tracing::info!("Database migration v1 complete");
        Ok(())
    }

    /// Close the connection pool, waiting for in-flight queries
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
