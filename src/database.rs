//! SQLite database for persistent storage.
//!
//! Owns the connection pool and the schema for reports and the action log.
//! The forum directory tables (users, communities, posts, comments) are
//! created here too so a standalone deployment has somewhere to read them
//! from; their rows are written by the forum's own services.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{Sqlite, Transaction};

use crate::error::{Result, TribunalError};

/// How long a writer waits for a competing writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection.
    ///
    /// Creates the database file and initializes schema if needed.
    pub async fn new(path: &str) -> Result<Self> {
        let db_path = Path::new(path);

        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TribunalError::Io(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                TribunalError::Database(format!("Failed to connect to database: {}", e))
            })?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Create an in-memory database for testing.
    ///
    /// A single connection keeps the in-memory schema alive and serialises
    /// access, which concurrent tests rely on.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                TribunalError::Database(format!("Failed to create in-memory db: {}", e))
            })?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Initialize database schema.
    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a unit of work. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to begin transaction: {}", e)))
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| TribunalError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }
}

/// Truncate to the precision timestamps are stored at.
pub fn stored_precision(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(6)
}

/// Fixed-width UTC text form, so timestamps sort lexically.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TribunalError::Database(format!("Invalid {}: {}", column, e)))
}

/// True when `err` is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

const SCHEMA: &str = r#"
-- Forum directory (owned by the forum's CRUD services, read-only here)
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS communities (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY,
    community_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY,
    post_id INTEGER NOT NULL
);

-- Abuse reports
CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    reporter_id INTEGER NOT NULL,
    target_type TEXT NOT NULL CHECK (target_type IN ('POST', 'COMMENT', 'USER', 'COMMUNITY')),
    target_id INTEGER NOT NULL,
    target_username TEXT,
    community_id INTEGER,
    reason TEXT NOT NULL,
    detail TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING'
        CHECK (status IN ('PENDING', 'UNDER_REVIEW', 'ACTION_TAKEN', 'REJECTED')),
    severity INTEGER NOT NULL CHECK (severity BETWEEN 0 AND 3),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(reporter_id, target_type, target_id)
);

CREATE INDEX IF NOT EXISTS idx_reports_queue
    ON reports(status, severity DESC, created_at ASC, id ASC);
CREATE INDEX IF NOT EXISTS idx_reports_target
    ON reports(target_type, target_id, status);
CREATE INDEX IF NOT EXISTS idx_reports_reporter
    ON reports(reporter_id, created_at DESC);

-- Moderation audit trail (insert-only)
CREATE TABLE IF NOT EXISTS report_action_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id INTEGER NOT NULL,
    moderator_id INTEGER NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('WARN', 'REMOVE_CONTENT', 'SUSPEND_USER', 'NOTE')),
    note TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (report_id) REFERENCES reports(id)
);

CREATE INDEX IF NOT EXISTS idx_action_logs_report
    ON report_action_logs(report_id, id);

CREATE TRIGGER IF NOT EXISTS report_action_logs_no_update
BEFORE UPDATE ON report_action_logs
BEGIN
    SELECT RAISE(ABORT, 'report_action_logs is append-only');
END;

CREATE TRIGGER IF NOT EXISTS report_action_logs_no_delete
BEFORE DELETE ON report_action_logs
BEGIN
    SELECT RAISE(ABORT, 'report_action_logs is append-only');
END;
"#;
