//! Report service: intake, moderation queue and resolution.
//!
//! This is the only writer to the report and action-log tables. Intake
//! validates, deduplicates, binds the target and freezes a severity;
//! resolution runs every status change through [`workflow::transition`]
//! and writes the status and its audit entry in one transaction.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::action_log::{ActionLogStore, NewActionLog};
use crate::config::ReasonCatalog;
use crate::database::Database;
use crate::directory::{IdentityResolver, TargetHandle, TargetResolver};
use crate::error::{Result, TribunalError};
use crate::models::{
    ModerationAction, Report, ReportActionLog, ReportStatus, Severity, Target, TargetType,
    MAX_TEXT_LEN,
};
use crate::pagination::{Page, PageRequest};
use crate::reports::{DuplicateKey, NewReport, ReportStore};
use crate::workflow::{self, ReportEvent};

/// Note recorded when a moderator rejects a report without one.
pub const DEFAULT_REJECT_NOTE: &str = "Rejected";

/// Conditional updates attempted per transition before giving up.
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Intake request as supplied by a reporting user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateReportRequest {
    #[serde(default)]
    pub target_type: String,
    pub target_id: Option<i64>,
    pub target_username: Option<String>,
    #[serde(default)]
    pub reason: String,
    pub detail: Option<String>,
}

/// A report's new state together with the audit entry that explains it.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub report: Report,
    pub log: ReportActionLog,
}

/// Target as named by the reporter, before it is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TargetRef {
    Id(Target),
    User { username: String, id: Option<i64> },
}

/// Intake request after validation.
#[derive(Debug, Clone)]
struct ValidatedReport {
    target: TargetRef,
    reason: String,
    detail: Option<String>,
}

/// Trimmed text, `None` when blank; errors past `MAX_TEXT_LEN` characters.
fn bounded_text(value: Option<&str>, field: &str) -> Result<Option<String>> {
    let Some(text) = value.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(TribunalError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_TEXT_LEN
        )));
    }
    Ok(Some(text.to_string()))
}

impl CreateReportRequest {
    fn validate(&self, reasons: &ReasonCatalog) -> Result<ValidatedReport> {
        let reason = self.reason.trim();
        if reason.is_empty() {
            return Err(TribunalError::Validation("reason is required".to_string()));
        }
        let reason = reasons
            .resolve(reason)
            .ok_or_else(|| TribunalError::Validation(format!("unknown reason: {}", reason)))?
            .to_string();

        let detail = bounded_text(self.detail.as_deref(), "detail")?;

        let kind = TargetType::parse(&self.target_type).ok_or_else(|| {
            TribunalError::Validation(format!("unknown target type: {:?}", self.target_type))
        })?;

        let username = self
            .target_username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());

        let target = match (kind, self.target_id, username) {
            (TargetType::User, id, Some(username)) => TargetRef::User {
                username: username.to_string(),
                id,
            },
            (kind, Some(id), _) => TargetRef::Id(Target::new(kind, id)),
            (TargetType::User, None, None) => {
                return Err(TribunalError::Validation(
                    "USER targets need a target_id or target_username".to_string(),
                ))
            }
            (kind, None, _) => {
                return Err(TribunalError::Validation(format!(
                    "{} targets need a target_id",
                    kind
                )))
            }
        };

        Ok(ValidatedReport {
            target,
            reason,
            detail,
        })
    }
}

/// Per-target async locks serialising the open-count read and the insert.
#[derive(Default)]
struct TargetLocks {
    locks: DashMap<Target, Arc<Mutex<()>>>,
}

impl TargetLocks {
    async fn lock(&self, target: Target) -> TargetGuard<'_> {
        let mutex = self
            .locks
            .entry(target)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;

        TargetGuard {
            locks: self,
            target,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

struct TargetGuard<'a> {
    locks: &'a TargetLocks,
    target: Target,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TargetGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Forget the lock once nobody holds or waits on it
        self.locks
            .locks
            .remove_if(&self.target, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Orchestrates the report workflow over the two stores.
pub struct ReportService {
    db: Arc<Database>,
    reports: ReportStore,
    action_log: ActionLogStore,
    identity: Arc<dyn IdentityResolver>,
    targets: Arc<dyn TargetResolver>,
    reasons: ReasonCatalog,
    target_locks: TargetLocks,
}

impl ReportService {
    pub fn new(
        db: Arc<Database>,
        identity: Arc<dyn IdentityResolver>,
        targets: Arc<dyn TargetResolver>,
        reasons: ReasonCatalog,
    ) -> Self {
        Self {
            reports: ReportStore::new(db.clone()),
            action_log: ActionLogStore::new(db.clone()),
            db,
            identity,
            targets,
            reasons,
            target_locks: TargetLocks::default(),
        }
    }

    /// File a report against a post, comment, user or community.
    pub async fn create_report(
        &self,
        reporter_username: &str,
        request: CreateReportRequest,
    ) -> Result<Report> {
        let validated = request.validate(&self.reasons)?;
        let reporter = self.identity.resolve(reporter_username).await?;

        let duplicate_key = match &validated.target {
            TargetRef::Id(target) => DuplicateKey::Target(*target),
            TargetRef::User { id: Some(id), .. } => DuplicateKey::Target(Target::User(*id)),
            TargetRef::User { username, id: None } => DuplicateKey::Username(username),
        };
        if let Some(existing) = self.reports.find_duplicate(reporter.id, duplicate_key).await? {
            tracing::warn!(
                reporter_id = reporter.id,
                existing_report_id = existing,
                "Duplicate report rejected"
            );
            return Err(duplicate_error(reporter.id, &validated.target));
        }

        let handle = self.bind_target(&validated.target).await?;
        // A supplied numeric id still decides which target is counted
        let counted = match validated.target {
            TargetRef::User { id: Some(id), .. } => Target::User(id),
            _ => handle.target,
        };

        let _guard = self.target_locks.lock(counted).await;
        let open = self.reports.count_open_for_target(counted).await?;
        let severity = Severity::from_open_count(open);

        let target_username = match validated.target {
            TargetRef::User { username, .. } => Some(username),
            TargetRef::Id(_) => None,
        };

        let report = self
            .reports
            .insert(&NewReport {
                reporter_id: reporter.id,
                target: handle.target,
                target_username,
                community_id: handle.community_id,
                reason: validated.reason,
                detail: validated.detail,
                severity,
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            report_id = report.id,
            reporter_id = report.reporter_id,
            target = %report.target,
            severity = report.severity.as_u8(),
            open_reports = open,
            "Report created"
        );

        Ok(report)
    }

    async fn bind_target(&self, target: &TargetRef) -> Result<TargetHandle> {
        match target {
            TargetRef::Id(target) => self.targets.resolve(*target).await,
            TargetRef::User { username, .. } => {
                let id = self
                    .targets
                    .resolve_username(username)
                    .await
                    .map_err(|e| match e {
                        TribunalError::UserNotFound(_) => TribunalError::TargetNotFound {
                            kind: TargetType::User,
                            reference: username.clone(),
                        },
                        other => other,
                    })?;
                Ok(TargetHandle {
                    target: Target::User(id),
                    community_id: None,
                })
            }
        }
    }

    /// The caller's own reports, newest first.
    pub async fn my_reports(
        &self,
        reporter_username: &str,
        page: PageRequest,
    ) -> Result<Page<Report>> {
        let reporter = self.identity.resolve(reporter_username).await?;
        self.reports.list_by_reporter(reporter.id, page).await
    }

    /// Reports in `status`, highest severity first, oldest first within a
    /// severity, optionally narrowed to one community.
    pub async fn moderation_queue(
        &self,
        status: ReportStatus,
        community_id: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<Report>> {
        self.reports.moderation_queue(status, community_id, page).await
    }

    pub async fn get_report(&self, report_id: i64) -> Result<Report> {
        self.reports
            .get(report_id)
            .await?
            .ok_or(TribunalError::ReportNotFound(report_id))
    }

    /// Audit entries for a report, oldest first.
    pub async fn action_log(&self, report_id: i64) -> Result<Vec<ReportActionLog>> {
        // Distinguish "no such report" from "no decisions yet"
        self.get_report(report_id).await?;
        self.action_log.for_report(report_id).await
    }

    /// Claim a pending report. Informational only: no audit entry.
    pub async fn mark_under_review(
        &self,
        report_id: i64,
        moderator_username: &str,
    ) -> Result<Report> {
        let (report, _) = self
            .apply(report_id, moderator_username, ReportEvent::MarkUnderReview, None)
            .await?;
        Ok(report)
    }

    /// Resolve a report with a moderation action.
    pub async fn take_action(
        &self,
        report_id: i64,
        moderator_username: &str,
        action: ModerationAction,
        note: Option<&str>,
    ) -> Result<Resolution> {
        let note = bounded_text(note, "note")?;
        self.resolve(report_id, moderator_username, ReportEvent::TakeAction, action, note)
            .await
    }

    /// Resolve a report as not actionable.
    pub async fn reject(
        &self,
        report_id: i64,
        moderator_username: &str,
        note: Option<&str>,
    ) -> Result<Resolution> {
        let note = bounded_text(note, "note")?.unwrap_or_else(|| DEFAULT_REJECT_NOTE.to_string());
        self.resolve(
            report_id,
            moderator_username,
            ReportEvent::Reject,
            ModerationAction::Note,
            Some(note),
        )
        .await
    }

    async fn resolve(
        &self,
        report_id: i64,
        moderator_username: &str,
        event: ReportEvent,
        action: ModerationAction,
        note: Option<String>,
    ) -> Result<Resolution> {
        let (report, log) = self
            .apply(report_id, moderator_username, event, Some((action, note)))
            .await?;
        let log = log.ok_or_else(|| {
            TribunalError::Database(format!("No action log written for report {}", report_id))
        })?;
        Ok(Resolution { report, log })
    }

    /// One status change as a single unit of work.
    ///
    /// The update is conditional on the status seen before it; if another
    /// moderator moved the report in between, the event is re-checked
    /// against the status they left. Nothing is written unless the update
    /// and the audit entry both succeed.
    async fn apply(
        &self,
        report_id: i64,
        moderator_username: &str,
        event: ReportEvent,
        entry: Option<(ModerationAction, Option<String>)>,
    ) -> Result<(Report, Option<ReportActionLog>)> {
        let moderator = self.identity.resolve(moderator_username).await?;
        let mut from = self.get_report(report_id).await?.status;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let mut attempts = 0;
        let to = loop {
            let to = workflow::transition(from, event).inspect_err(|_| {
                tracing::warn!(
                    report_id,
                    moderator_id = moderator.id,
                    status = %from,
                    event = %event,
                    "Transition refused"
                );
            })?;

            if ReportStore::update_status(&mut tx, report_id, from, to, now).await? {
                break to;
            }

            attempts += 1;
            if attempts >= MAX_TRANSITION_ATTEMPTS {
                return Err(TribunalError::Database(format!(
                    "Report {} kept changing during {}",
                    report_id, event
                )));
            }
            from = ReportStore::get_in(&mut tx, report_id)
                .await?
                .ok_or(TribunalError::ReportNotFound(report_id))?
                .status;
        };

        let log = match entry.filter(|_| event.is_audited()) {
            Some((action, note)) => Some(
                ActionLogStore::append(
                    &mut tx,
                    NewActionLog {
                        report_id,
                        moderator_id: moderator.id,
                        action,
                        note,
                        created_at: now,
                    },
                )
                .await?,
            ),
            None => None,
        };

        let report = ReportStore::get_in(&mut tx, report_id)
            .await?
            .ok_or(TribunalError::ReportNotFound(report_id))?;

        tx.commit()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to commit transition: {}", e)))?;

        tracing::info!(
            report_id,
            moderator_id = moderator.id,
            from = %from,
            to = %to,
            action = log.as_ref().map(|l| l.action.as_str()),
            "Report transitioned"
        );

        Ok((report, log))
    }
}

fn duplicate_error(reporter_id: i64, target: &TargetRef) -> TribunalError {
    let (kind, reference) = match target {
        TargetRef::Id(target) => (target.kind(), target.id().to_string()),
        TargetRef::User { id: Some(id), .. } => (TargetType::User, id.to_string()),
        TargetRef::User { username, id: None } => (TargetType::User, username.clone()),
    };
    TribunalError::DuplicateReport {
        reporter_id,
        kind,
        reference,
    }
}
