//! Append-only audit trail of moderation decisions.
//!
//! The store exposes exactly two operations: append inside a caller's
//! transaction, and read back by report. Rows are never updated or deleted;
//! the schema enforces the same with triggers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use crate::database::{format_timestamp, parse_timestamp, stored_precision, Database};
use crate::error::{Result, TribunalError};
use crate::models::{ModerationAction, ReportActionLog};

/// A log entry ready to be appended.
#[derive(Debug, Clone)]
pub struct NewActionLog {
    pub report_id: i64,
    pub moderator_id: i64,
    pub action: ModerationAction,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert-only store over `report_action_logs`.
pub struct ActionLogStore {
    db: Arc<Database>,
}

impl ActionLogStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append an entry as part of the caller's unit of work.
    pub async fn append(
        conn: &mut SqliteConnection,
        entry: NewActionLog,
    ) -> Result<ReportActionLog> {
        let created_at = stored_precision(entry.created_at);

        let result = sqlx::query(
            "INSERT INTO report_action_logs (report_id, moderator_id, action, note, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.report_id)
        .bind(entry.moderator_id)
        .bind(entry.action.as_str())
        .bind(&entry.note)
        .bind(format_timestamp(created_at))
        .execute(&mut *conn)
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to append action log: {}", e)))?;

        Ok(ReportActionLog {
            id: result.last_insert_rowid(),
            report_id: entry.report_id,
            moderator_id: entry.moderator_id,
            action: entry.action,
            note: entry.note,
            created_at,
        })
    }

    /// All entries for a report, oldest first.
    pub async fn for_report(&self, report_id: i64) -> Result<Vec<ReportActionLog>> {
        let rows = sqlx::query(
            "SELECT id, report_id, moderator_id, action, note, created_at
             FROM report_action_logs WHERE report_id = ?
             ORDER BY id ASC",
        )
        .bind(report_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to get action log: {}", e)))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let action_str: String = row.get("action");
            let action = ModerationAction::parse(&action_str).ok_or_else(|| {
                TribunalError::Database(format!("Invalid action: {}", action_str))
            })?;
            let created_at: String = row.get("created_at");

            entries.push(ReportActionLog {
                id: row.get("id"),
                report_id: row.get("report_id"),
                moderator_id: row.get("moderator_id"),
                action,
                note: row.get("note"),
                created_at: parse_timestamp(&created_at, "created_at")?,
            });
        }

        Ok(entries)
    }
}
