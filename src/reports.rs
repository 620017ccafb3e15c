//! Report persistence and the queries the moderation workflow needs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Executor, Row, Sqlite};

use crate::database::{
    format_timestamp, is_unique_violation, parse_timestamp, stored_precision, Database,
};
use crate::error::{Result, TribunalError};
use crate::models::{Report, ReportStatus, Severity, Target, TargetType};
use crate::pagination::{Page, PageRequest};

const REPORT_COLUMNS: &str = "id, reporter_id, target_type, target_id, target_username,
     community_id, reason, detail, status, severity, created_at, updated_at";

const SELECT_REPORT_BY_ID: &str = "SELECT id, reporter_id, target_type, target_id, target_username,
     community_id, reason, detail, status, severity, created_at, updated_at
     FROM reports WHERE id = ?";

/// A report ready to be written; severity is already computed.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub reporter_id: i64,
    pub target: Target,
    pub target_username: Option<String>,
    pub community_id: Option<i64>,
    pub reason: String,
    pub detail: Option<String>,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

/// How an intake request names its target before it is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKey<'a> {
    Target(Target),
    /// `USER` target given only by name.
    Username(&'a str),
}

/// Report store over the `reports` table.
pub struct ReportStore {
    db: Arc<Database>,
}

impl ReportStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new `PENDING` report.
    ///
    /// A unique violation means another request by the same reporter won the
    /// race for this target and is reported as `DuplicateReport`.
    pub async fn insert(&self, new: &NewReport) -> Result<Report> {
        let created = stored_precision(new.created_at);
        let created_at = format_timestamp(created);

        let result = sqlx::query(
            "INSERT INTO reports (reporter_id, target_type, target_id, target_username,
                                  community_id, reason, detail, status, severity,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.reporter_id)
        .bind(new.target.kind().as_str())
        .bind(new.target.id())
        .bind(&new.target_username)
        .bind(new.community_id)
        .bind(&new.reason)
        .bind(&new.detail)
        .bind(ReportStatus::Pending.as_str())
        .bind(new.severity.as_u8() as i64)
        .bind(&created_at)
        .bind(&created_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TribunalError::DuplicateReport {
                    reporter_id: new.reporter_id,
                    kind: new.target.kind(),
                    reference: new.target.id().to_string(),
                }
            } else {
                TribunalError::Database(format!("Failed to create report: {}", e))
            }
        })?;

        Ok(Report {
            id: result.last_insert_rowid(),
            reporter_id: new.reporter_id,
            target: new.target,
            target_username: new.target_username.clone(),
            community_id: new.community_id,
            reason: new.reason.clone(),
            detail: new.detail.clone(),
            status: ReportStatus::Pending,
            severity: new.severity,
            created_at: created,
            updated_at: created,
        })
    }

    /// Get a report by ID.
    pub async fn get(&self, report_id: i64) -> Result<Option<Report>> {
        fetch_report(self.db.pool(), report_id).await
    }

    /// Id of an existing report by `reporter_id` against the same target.
    pub async fn find_duplicate(
        &self,
        reporter_id: i64,
        key: DuplicateKey<'_>,
    ) -> Result<Option<i64>> {
        let query = match key {
            DuplicateKey::Target(target) => sqlx::query(
                "SELECT id FROM reports
                 WHERE reporter_id = ? AND target_type = ? AND target_id = ?",
            )
            .bind(reporter_id)
            .bind(target.kind().as_str())
            .bind(target.id()),
            DuplicateKey::Username(username) => sqlx::query(
                "SELECT id FROM reports
                 WHERE reporter_id = ? AND target_type = ? AND target_username = ?",
            )
            .bind(reporter_id)
            .bind(TargetType::User.as_str())
            .bind(username),
        };

        let row = query
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to check duplicates: {}", e)))?;

        Ok(row.map(|row| row.get("id")))
    }

    /// Number of `PENDING` or `UNDER_REVIEW` reports against `target`.
    pub async fn count_open_for_target(&self, target: Target) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reports
             WHERE target_type = ? AND target_id = ? AND status IN (?, ?)",
        )
        .bind(target.kind().as_str())
        .bind(target.id())
        .bind(ReportStatus::Pending.as_str())
        .bind(ReportStatus::UnderReview.as_str())
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to count open reports: {}", e)))?;

        Ok(count as u64)
    }

    /// A reporter's own reports, newest first.
    pub async fn list_by_reporter(
        &self,
        reporter_id: i64,
        page: PageRequest,
    ) -> Result<Page<Report>> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports
             WHERE reporter_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query(&sql)
            .bind(reporter_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to list reports: {}", e)))?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports WHERE reporter_id = ?")
            .bind(reporter_id)
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to count reports: {}", e)))?;

        let items = rows.iter().map(report_from_row).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, total as u64, page))
    }

    /// Reports in `status`, highest severity first, oldest first within a
    /// severity. `community_id` narrows to one community.
    pub async fn moderation_queue(
        &self,
        status: ReportStatus,
        community_id: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<Report>> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports
             WHERE status = ? AND (? IS NULL OR community_id = ?)
             ORDER BY severity DESC, created_at ASC, id ASC
             LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(community_id)
            .bind(community_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to load queue: {}", e)))?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reports WHERE status = ? AND (? IS NULL OR community_id = ?)",
        )
        .bind(status.as_str())
        .bind(community_id)
        .bind(community_id)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to count queue: {}", e)))?;

        let items = rows.iter().map(report_from_row).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, total as u64, page))
    }

    /// Move a report from `from` to `to` inside the caller's transaction.
    ///
    /// Returns `false` when the report is no longer in `from`, i.e. a
    /// concurrent transition got there first.
    pub async fn update_status(
        conn: &mut SqliteConnection,
        report_id: i64,
        from: ReportStatus,
        to: ReportStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reports SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(format_timestamp(at))
        .bind(report_id)
        .bind(from.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to update report status: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    /// Read a report inside the caller's transaction.
    pub async fn get_in(conn: &mut SqliteConnection, report_id: i64) -> Result<Option<Report>> {
        fetch_report(&mut *conn, report_id).await
    }
}

async fn fetch_report<'e, E>(executor: E, report_id: i64) -> Result<Option<Report>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(SELECT_REPORT_BY_ID)
        .bind(report_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to get report: {}", e)))?;

    row.as_ref().map(report_from_row).transpose()
}

fn report_from_row(row: &SqliteRow) -> Result<Report> {
    let target_type: String = row.get("target_type");
    let kind = TargetType::parse(&target_type)
        .ok_or_else(|| TribunalError::Database(format!("Invalid target_type: {}", target_type)))?;

    let status_str: String = row.get("status");
    let status = ReportStatus::parse(&status_str)
        .ok_or_else(|| TribunalError::Database(format!("Invalid status: {}", status_str)))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Report {
        id: row.get("id"),
        reporter_id: row.get("reporter_id"),
        target: Target::new(kind, row.get("target_id")),
        target_username: row.get("target_username"),
        community_id: row.get("community_id"),
        reason: row.get("reason"),
        detail: row.get("detail"),
        status,
        severity: Severity::from_i64(row.get("severity")),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use crate::database::Database;
    use crate::error::TribunalError;
    use crate::models::{ReportStatus, Severity, Target};
    use crate::pagination::PageRequest;
    use crate::reports::{DuplicateKey, NewReport, ReportStore};

    fn new_report(reporter_id: i64, target: Target, severity: Severity) -> NewReport {
        NewReport {
            reporter_id,
            target,
            target_username: None,
            community_id: Some(10),
            reason: "spam".to_string(),
            detail: None,
            severity,
            created_at: Utc::now(),
        }
    }

    async fn test_store() -> (ReportStore, Arc<Database>) {
        let db = Arc::new(Database::in_memory().await.expect("should create db"));
        (ReportStore::new(db.clone()), db)
    }

    #[tokio::test]
    async fn insert_and_get_report() {
        let (store, _db) = test_store().await;

        let created = store
            .insert(&new_report(1, Target::Post(42), Severity::None))
            .await
            .expect("should insert");
        assert_eq!(created.status, ReportStatus::Pending);
        assert_eq!(created.created_at, created.updated_at);

        let fetched = store
            .get(created.id)
            .await
            .expect("should get")
            .expect("should exist");
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn unique_index_translates_to_duplicate() {
        let (store, _db) = test_store().await;
        let report = new_report(1, Target::Post(42), Severity::None);

        store.insert(&report).await.expect("first insert");
        let err = store.insert(&report).await.unwrap_err();
        assert!(matches!(err, TribunalError::DuplicateReport { reporter_id: 1, .. }));

        // Same id, different kind is a different target
        store
            .insert(&new_report(1, Target::Comment(42), Severity::None))
            .await
            .expect("different target kind");
    }

    #[tokio::test]
    async fn find_duplicate_by_target_and_username() {
        let (store, _db) = test_store().await;
        let mut report = new_report(1, Target::User(5), Severity::None);
        report.target_username = Some("troll".to_string());
        report.community_id = None;
        let created = store.insert(&report).await.expect("insert");

        assert_eq!(
            store
                .find_duplicate(1, DuplicateKey::Target(Target::User(5)))
                .await
                .unwrap(),
            Some(created.id)
        );
        assert_eq!(
            store
                .find_duplicate(1, DuplicateKey::Username("troll"))
                .await
                .unwrap(),
            Some(created.id)
        );
        assert_eq!(
            store
                .find_duplicate(2, DuplicateKey::Target(Target::User(5)))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn open_count_ignores_resolved_reports() {
        let (store, db) = test_store().await;
        let first = store
            .insert(&new_report(1, Target::Post(42), Severity::None))
            .await
            .unwrap();
        store
            .insert(&new_report(2, Target::Post(42), Severity::Low))
            .await
            .unwrap();
        store
            .insert(&new_report(3, Target::Post(43), Severity::None))
            .await
            .unwrap();

        assert_eq!(store.count_open_for_target(Target::Post(42)).await.unwrap(), 2);

        let mut tx = db.begin().await.unwrap();
        let moved = ReportStore::update_status(
            &mut tx,
            first.id,
            ReportStatus::Pending,
            ReportStatus::Rejected,
            Utc::now(),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        assert!(moved);

        assert_eq!(store.count_open_for_target(Target::Post(42)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn conditional_update_fails_on_stale_status() {
        let (store, db) = test_store().await;
        let report = store
            .insert(&new_report(1, Target::Post(42), Severity::None))
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        assert!(ReportStore::update_status(
            &mut tx,
            report.id,
            ReportStatus::Pending,
            ReportStatus::ActionTaken,
            Utc::now(),
        )
        .await
        .unwrap());
        assert!(!ReportStore::update_status(
            &mut tx,
            report.id,
            ReportStatus::Pending,
            ReportStatus::Rejected,
            Utc::now(),
        )
        .await
        .unwrap());
        tx.commit().await.unwrap();

        let stored = store.get(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::ActionTaken);
        assert!(stored.updated_at >= stored.created_at);
    }

    #[tokio::test]
    async fn queue_orders_by_severity_then_age() {
        let (store, _db) = test_store().await;
        let base = Utc::now();

        let mut ids = Vec::new();
        for (i, severity) in [Severity::None, Severity::Elevated, Severity::Low, Severity::Elevated]
            .into_iter()
            .enumerate()
        {
            let mut report = new_report(i as i64 + 1, Target::Post(42), severity);
            report.created_at = base + Duration::seconds(i as i64);
            ids.push(store.insert(&report).await.unwrap().id);
        }

        let page = store
            .moderation_queue(ReportStatus::Pending, None, PageRequest::first(10))
            .await
            .unwrap();
        let order: Vec<i64> = page.items.iter().map(|r| r.id).collect();
        assert_eq!(order, vec![ids[1], ids[3], ids[2], ids[0]]);
        assert_eq!(page.total, 4);
    }

    #[tokio::test]
    async fn queue_filters_by_community() {
        let (store, _db) = test_store().await;
        store
            .insert(&new_report(1, Target::Post(42), Severity::None))
            .await
            .unwrap();
        let mut other = new_report(1, Target::Post(99), Severity::None);
        other.community_id = Some(20);
        let other = store.insert(&other).await.unwrap();

        let page = store
            .moderation_queue(ReportStatus::Pending, Some(20), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, other.id);
    }

    #[tokio::test]
    async fn reporter_history_is_newest_first_and_private() {
        let (store, _db) = test_store().await;
        let base = Utc::now();

        let mut mine = Vec::new();
        for i in 0..3 {
            let mut report = new_report(1, Target::Post(100 + i), Severity::None);
            report.created_at = base + Duration::seconds(i);
            mine.push(store.insert(&report).await.unwrap().id);
        }
        store
            .insert(&new_report(2, Target::Post(100), Severity::Low))
            .await
            .unwrap();

        let page = store
            .list_by_reporter(1, PageRequest::new(1, 2, 100))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        let order: Vec<i64> = page.items.iter().map(|r| r.id).collect();
        assert_eq!(order, vec![mine[2], mine[1]]);
        assert!(page.has_more());
    }
}
