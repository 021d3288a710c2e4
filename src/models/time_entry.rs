use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recorded work interval. Entries flagged `billable` are candidates for
/// invoicing; once consumed they carry the locking `invoice_id`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimeEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub project_id: Uuid,
    pub task_id: Option<Uuid>,
    pub user_id: Uuid,
    pub work_date: NaiveDate,
    pub minutes: i32,
    pub billable: bool,
    pub notes: Option<String>,
    pub invoice_id: Option<Uuid>,
    pub timesheet_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeEntry {
    /// An entry is frozen once it has been invoiced or rolled into a
    /// submitted timesheet.
    pub fn is_locked(&self) -> bool {
        self.invoice_id.is_some() || self.timesheet_id.is_some()
    }
}
