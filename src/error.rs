//! Error types for Tribunal.
//!
//! All errors are explicitly typed using thiserror. No panics in production code.

use thiserror::Error;

use crate::models::{ReportStatus, TargetType};
use crate::workflow::ReportEvent;

/// Central error type for all Tribunal operations.
#[derive(Debug, Error)]
pub enum TribunalError {
    /// Reporter or moderator username does not resolve.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// The reported post, comment, user or community does not exist.
    #[error("Target not found: {kind} {reference}")]
    TargetNotFound {
        kind: TargetType,
        /// Numeric id or username, as supplied.
        reference: String,
    },

    /// No report with this id.
    #[error("Report not found: {0}")]
    ReportNotFound(i64),

    /// The reporter already filed a report against this target.
    #[error("Duplicate report: user {reporter_id} already reported {kind} {reference}")]
    DuplicateReport {
        reporter_id: i64,
        kind: TargetType,
        reference: String,
    },

    /// The report's current status does not accept this event.
    #[error("Invalid state transition: cannot {event} a report that is {from}")]
    InvalidStateTransition {
        from: ReportStatus,
        event: ReportEvent,
    },

    /// Malformed input, rejected before any store access.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error (missing env vars, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),
}

impl TribunalError {
    /// Log error with full context using tracing.
    ///
    /// Client errors are expected traffic and logged at debug/warn; store
    /// and IO failures are logged at error.
    pub fn log_with_context(&self, context: &ErrorContext) {
        match self {
            Self::Database(_) | Self::Io(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    report_id = ?context.report_id,
                    user = ?context.username,
                    operation = %context.operation,
                    "Infrastructure error"
                );
            }
            Self::DuplicateReport { .. } | Self::InvalidStateTransition { .. } => {
                tracing::warn!(
                    error = %self,
                    request_id = %context.request_id,
                    report_id = ?context.report_id,
                    user = ?context.username,
                    operation = %context.operation,
                    "Request conflicts with current state"
                );
            }
            Self::UserNotFound(_)
            | Self::TargetNotFound { .. }
            | Self::ReportNotFound(_)
            | Self::Validation(_) => {
                tracing::debug!(
                    error = %self,
                    request_id = %context.request_id,
                    operation = %context.operation,
                    "Client error"
                );
            }
            Self::Config(_) | Self::Json(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    operation = %context.operation,
                    "Configuration or data error"
                );
            }
        }
    }

    /// True for errors caused by the caller's input or the report's state.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_)
                | Self::TargetNotFound { .. }
                | Self::ReportNotFound(_)
                | Self::DuplicateReport { .. }
                | Self::InvalidStateTransition { .. }
                | Self::Validation(_)
        )
    }

    /// Get user-friendly error message (hides internal details).
    pub fn user_message(&self) -> String {
        match self {
            Self::Database(_) => "Database service temporarily unavailable".to_string(),
            Self::Io(_) => "File system error".to_string(),
            Self::Config(_) => "Service configuration error".to_string(),
            Self::Json(_) => "Data format error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Context information for error logging.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Unique request identifier for correlation
    pub request_id: String,
    /// Report the operation targets, if any
    pub report_id: Option<i64>,
    /// Username of the caller, if known
    pub username: Option<String>,
    /// Operation being performed
    pub operation: String,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            report_id: None,
            username: None,
            operation: operation.into(),
        }
    }

    pub fn with_report_id(mut self, report_id: i64) -> Self {
        self.report_id = Some(report_id);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Result type alias for Tribunal operations.
pub type Result<T> = std::result::Result<T, TribunalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_duplicate_report() {
        let err = TribunalError::DuplicateReport {
            reporter_id: 7,
            kind: TargetType::Post,
            reference: "42".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate report: user 7 already reported POST 42"
        );
    }

    #[test]
    fn error_display_invalid_transition() {
        let err = TribunalError::InvalidStateTransition {
            from: ReportStatus::ActionTaken,
            event: ReportEvent::Reject,
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition: cannot reject a report that is ACTION_TAKEN"
        );
    }

    #[test]
    fn error_classification() {
        assert!(TribunalError::UserNotFound("alice".to_string()).is_client_error());
        assert!(TribunalError::Validation("bad".to_string()).is_client_error());
        assert!(TribunalError::ReportNotFound(1).is_client_error());
        assert!(!TribunalError::Database("locked".to_string()).is_client_error());
        assert!(!TribunalError::Io("disk".to_string()).is_client_error());
    }

    #[test]
    fn error_user_message_hides_details() {
        let err = TribunalError::Database("SELECT * FROM secret_table".to_string());
        assert_eq!(
            err.user_message(),
            "Database service temporarily unavailable"
        );
        assert!(!err.user_message().contains("secret_table"));

        // Client errors are safe to show verbatim
        let err = TribunalError::ReportNotFound(99);
        assert_eq!(err.user_message(), "Report not found: 99");
    }

    #[test]
    fn error_context_builder() {
        let ctx = ErrorContext::new("take_action")
            .with_report_id(12)
            .with_username("bob")
            .with_request_id("req-123");

        assert_eq!(ctx.operation, "take_action");
        assert_eq!(ctx.report_id, Some(12));
        assert_eq!(ctx.username.as_deref(), Some("bob"));
        assert_eq!(ctx.request_id, "req-123");
    }

    #[test]
    fn error_context_generates_request_id() {
        let ctx1 = ErrorContext::new("op1");
        let ctx2 = ErrorContext::new("op2");

        assert_ne!(ctx1.request_id, ctx2.request_id);
        assert!(!ctx1.request_id.is_empty());
    }
}
