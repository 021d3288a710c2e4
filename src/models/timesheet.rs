use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "timesheet_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TimesheetStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl TimesheetStatus {
    /// Linear transition guard: draft -> submitted -> approved | rejected.
    /// A rejected timesheet may be reworked and resubmitted.
    pub fn can_transition_to(self, next: TimesheetStatus) -> bool {
        matches!(
            (self, next),
            (TimesheetStatus::Draft, TimesheetStatus::Submitted)
                | (TimesheetStatus::Rejected, TimesheetStatus::Submitted)
                | (TimesheetStatus::Submitted, TimesheetStatus::Approved)
                | (TimesheetStatus::Submitted, TimesheetStatus::Rejected)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Timesheet {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: TimesheetStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimesheetApproval {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub timesheet_id: Uuid,
    pub approver_id: Uuid,
    pub approved: bool,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_linear() {
        use TimesheetStatus::*;
        assert!(Draft.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Approved));
        assert!(Submitted.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(Submitted));

        assert!(!Draft.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Submitted));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Submitted.can_transition_to(Draft));
    }
}
