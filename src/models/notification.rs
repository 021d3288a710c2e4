use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Notification kinds double as preference keys
pub mod kinds {
    pub const TIMESHEET_SUBMITTED: &str = "timesheet_submitted";
    pub const TIMESHEET_DECIDED: &str = "timesheet_decided";
    pub const INVOICE_SENT: &str = "invoice_sent";
    pub const PAYMENT_RECEIVED: &str = "payment_received";
    pub const PAYROLL_PROCESSED: &str = "payroll_processed";
    pub const INVITATION_ACCEPTED: &str = "invitation_accepted";

    pub const ALL: &[&str] = &[
        TIMESHEET_SUBMITTED,
        TIMESHEET_DECIDED,
        INVOICE_SENT,
        PAYMENT_RECEIVED,
        PAYROLL_PROCESSED,
        INVITATION_ACCEPTED,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub payload: Value,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationPreference {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub enabled: bool,
}
