//! Report resolution state machine.
//!
//! `PENDING -> UNDER_REVIEW -> ACTION_TAKEN | REJECTED`, where the review
//! step is optional. Every status change in the crate goes through
//! [`transition`], so terminal reports are rejected uniformly.

use std::fmt;

use serde::Serialize;

use crate::error::{Result, TribunalError};
use crate::models::ReportStatus;

/// Something a moderator does to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportEvent {
    /// Claim the report; informational, no audit entry.
    MarkUnderReview,
    TakeAction,
    Reject,
}

impl ReportEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkUnderReview => "mark under review",
            Self::TakeAction => "take action on",
            Self::Reject => "reject",
        }
    }

    /// Whether a successful transition appends to the action log.
    pub fn is_audited(&self) -> bool {
        !matches!(self, Self::MarkUnderReview)
    }
}

impl fmt::Display for ReportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Next status for `event` applied to a report in `current`.
pub fn transition(current: ReportStatus, event: ReportEvent) -> Result<ReportStatus> {
    use ReportStatus::*;

    let next = match (current, event) {
        (Pending, ReportEvent::MarkUnderReview) => Some(UnderReview),
        (Pending | UnderReview, ReportEvent::TakeAction) => Some(ActionTaken),
        (Pending | UnderReview, ReportEvent::Reject) => Some(Rejected),
        _ => None,
    };

    next.ok_or(TribunalError::InvalidStateTransition {
        from: current,
        event,
    })
}

#[cfg(test)]
mod tests {
    use crate::error::TribunalError;
    use crate::models::ReportStatus;
    use crate::workflow::{transition, ReportEvent};

    #[test]
    fn pending_accepts_every_event() {
        assert_eq!(
            transition(ReportStatus::Pending, ReportEvent::MarkUnderReview).unwrap(),
            ReportStatus::UnderReview
        );
        assert_eq!(
            transition(ReportStatus::Pending, ReportEvent::TakeAction).unwrap(),
            ReportStatus::ActionTaken
        );
        assert_eq!(
            transition(ReportStatus::Pending, ReportEvent::Reject).unwrap(),
            ReportStatus::Rejected
        );
    }

    #[test]
    fn under_review_resolves_but_cannot_be_claimed_twice() {
        assert_eq!(
            transition(ReportStatus::UnderReview, ReportEvent::TakeAction).unwrap(),
            ReportStatus::ActionTaken
        );
        assert_eq!(
            transition(ReportStatus::UnderReview, ReportEvent::Reject).unwrap(),
            ReportStatus::Rejected
        );
        assert!(transition(ReportStatus::UnderReview, ReportEvent::MarkUnderReview).is_err());
    }

    #[test]
    fn terminal_reject_after_action_reports_both_sides() {
        let err = transition(ReportStatus::ActionTaken, ReportEvent::Reject).unwrap_err();
        match err {
            TribunalError::InvalidStateTransition { from, event } => {
                assert_eq!(from, ReportStatus::ActionTaken);
                assert_eq!(event, ReportEvent::Reject);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn only_review_is_unaudited() {
        assert!(!ReportEvent::MarkUnderReview.is_audited());
        assert!(ReportEvent::TakeAction.is_audited());
        assert!(ReportEvent::Reject.is_audited());
    }
}

#[cfg(test)]
mod property_tests {
    use crate::models::ReportStatus;
    use crate::workflow::{transition, ReportEvent};
    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = ReportStatus> {
        prop::sample::select(ReportStatus::ALL.to_vec())
    }

    fn arb_event() -> impl Strategy<Value = ReportEvent> {
        prop::sample::select(vec![
            ReportEvent::MarkUnderReview,
            ReportEvent::TakeAction,
            ReportEvent::Reject,
        ])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Terminal reports accept no event at all.
        #[test]
        fn prop_terminal_states_are_final(status in arb_status(), event in arb_event()) {
            let result = transition(status, event);
            if status.is_terminal() {
                prop_assert!(result.is_err());
            }
        }

        /// Audited events always land in a terminal state.
        #[test]
        fn prop_audited_events_are_terminal(status in arb_status(), event in arb_event()) {
            if let Ok(next) = transition(status, event) {
                prop_assert_eq!(next.is_terminal(), event.is_audited());
                prop_assert_ne!(next, status);
            }
        }
    }
}
