//! Core data models for Tribunal.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted `detail` on a report and `note` on an action, in characters.
pub const MAX_TEXT_LEN: usize = 1000;

/// Kind of entity a report is filed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetType {
    Post,
    Comment,
    User,
    Community,
}

impl TargetType {
    /// Parse a caller-supplied target type, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POST" => Some(Self::Post),
            "COMMENT" => Some(Self::Comment),
            "USER" => Some(Self::User),
            "COMMUNITY" => Some(Self::Community),
            _ => None,
        }
    }

    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Comment => "COMMENT",
            Self::User => "USER",
            Self::Community => "COMMUNITY",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single entity a report points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Target {
    Post(i64),
    Comment(i64),
    User(i64),
    Community(i64),
}

impl Target {
    pub fn new(kind: TargetType, id: i64) -> Self {
        match kind {
            TargetType::Post => Self::Post(id),
            TargetType::Comment => Self::Comment(id),
            TargetType::User => Self::User(id),
            TargetType::Community => Self::Community(id),
        }
    }

    pub fn kind(&self) -> TargetType {
        match self {
            Self::Post(_) => TargetType::Post,
            Self::Comment(_) => TargetType::Comment,
            Self::User(_) => TargetType::User,
            Self::Community(_) => TargetType::Community,
        }
    }

    pub fn id(&self) -> i64 {
        match *self {
            Self::Post(id) | Self::Comment(id) | Self::User(id) | Self::Community(id) => id,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str().to_ascii_lowercase(), self.id())
    }
}

/// Lifecycle status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pending,
    UnderReview,
    ActionTaken,
    Rejected,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] = [
        Self::Pending,
        Self::UnderReview,
        Self::ActionTaken,
        Self::Rejected,
    ];

    /// Convert from database string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "UNDER_REVIEW" => Some(Self::UnderReview),
            "ACTION_TAKEN" => Some(Self::ActionTaken),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::UnderReview => "UNDER_REVIEW",
            Self::ActionTaken => "ACTION_TAKEN",
            Self::Rejected => "REJECTED",
        }
    }

    /// Not yet resolved by a moderator.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::UnderReview)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of a report, derived from how many open reports its target
/// already had when it was filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
pub enum Severity {
    None = 0,
    Low = 1,
    Elevated = 2,
    Critical = 3,
}

impl Severity {
    /// Map the number of open reports already filed against a target.
    ///
    /// ```
    /// use tribunal::models::Severity;
    ///
    /// assert_eq!(Severity::from_open_count(0), Severity::None);
    /// assert_eq!(Severity::from_open_count(2), Severity::Low);
    /// assert_eq!(Severity::from_open_count(5), Severity::Elevated);
    /// assert_eq!(Severity::from_open_count(6), Severity::Critical);
    /// ```
    pub fn from_open_count(count: u64) -> Self {
        match count {
            0 => Self::None,
            1..=2 => Self::Low,
            3..=5 => Self::Elevated,
            _ => Self::Critical,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            i64::MIN..=0 => Self::None,
            1 => Self::Low,
            2 => Self::Elevated,
            _ => Self::Critical, // Cap at critical
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.as_u8()
    }
}

/// What a moderator did when resolving a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationAction {
    Warn,
    RemoveContent,
    SuspendUser,
    Note,
}

impl ModerationAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WARN" => Some(Self::Warn),
            "REMOVE_CONTENT" => Some(Self::RemoveContent),
            "SUSPEND_USER" => Some(Self::SuspendUser),
            "NOTE" => Some(Self::Note),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "WARN",
            Self::RemoveContent => "REMOVE_CONTENT",
            Self::SuspendUser => "SUSPEND_USER",
            Self::Note => "NOTE",
        }
    }
}

/// A user's complaint against exactly one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: i64,
    pub reporter_id: i64,
    pub target: Target,
    /// Username the reporter gave for a `USER` target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_username: Option<String>,
    /// Community the target lived in when the report was filed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community_id: Option<i64>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub status: ReportStatus,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable audit record of one moderation decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportActionLog {
    pub id: i64,
    pub report_id: i64,
    pub moderator_id: i64,
    pub action: ModerationAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A forum user as seen by the identity resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
}


#[cfg(test)]
mod property_tests {
    use crate::models::Severity;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Severity never decreases as the open-report count grows.
        #[test]
        fn prop_severity_monotonic(a in 0u64..10_000, b in 0u64..10_000) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(Severity::from_open_count(low) <= Severity::from_open_count(high));
        }

        /// Severity stays within 0..=3 and survives the database round trip.
        #[test]
        fn prop_severity_bounded(count in any::<u64>()) {
            let severity = Severity::from_open_count(count);
            prop_assert!(severity.as_u8() <= 3);
            prop_assert_eq!(Severity::from_i64(severity.as_u8() as i64), severity);
        }
    }
}
