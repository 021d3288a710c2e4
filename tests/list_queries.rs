//! List endpoints take pagination and resource filters as two separate
//! `Query` extractors; these check that a query string carrying both
//! `_start`/`_end` paging and typed filter fields deserializes for every
//! filtered resource.

use axum::extract::Query;
use axum::http::Uri;

use crewhq_api::api::pagination::ListParams;
use crewhq_api::handlers::protected::invitations::InvitationFilter;
use crewhq_api::handlers::protected::invoices::InvoiceFilter;
use crewhq_api::handlers::protected::notifications::NotificationFilter;
use crewhq_api::handlers::protected::payments::PaymentFilter;
use crewhq_api::handlers::protected::tasks::TaskFilter;
use crewhq_api::handlers::protected::time_entries::TimeEntryFilter;
use crewhq_api::handlers::protected::timesheets::TimesheetFilter;
use crewhq_api::models::invitation::InvitationStatus;
use crewhq_api::models::invoice::InvoiceStatus;
use crewhq_api::models::timesheet::TimesheetStatus;

const MEMBER: &str = "7f3b2a10-0000-0000-0000-000000000001";

fn uri(path_and_query: &str) -> Uri {
    path_and_query.parse().unwrap()
}

fn paging(path_and_query: &str) -> ListParams {
    Query::<ListParams>::try_from_uri(&uri(path_and_query)).unwrap().0
}

#[test]
fn paging_params_deserialize_alongside_filters() {
    let page = paging("/api/invoices?_start=25&_end=50&_sort=total&_order=desc&status=sent");
    assert_eq!(page.offset(), 25);
    assert_eq!(page.limit(), 25);
    assert_eq!(page.sort.as_deref(), Some("total"));
}

#[test]
fn invoice_filter_ignores_paging_keys() {
    let q = format!("/api/invoices?_start=0&_end=25&status=draft&customer_id={}", MEMBER);
    let filter = Query::<InvoiceFilter>::try_from_uri(&uri(&q)).unwrap().0;
    assert_eq!(filter.status, Some(InvoiceStatus::Draft));
    assert!(filter.customer_id.is_some());
}

#[test]
fn payment_filter_accepts_windowed_queries() {
    let q = format!("/api/payments?_start=0&_end=25&invoice_id={}", MEMBER);
    let filter = Query::<PaymentFilter>::try_from_uri(&uri(&q)).unwrap().0;
    assert!(filter.invoice_id.is_some());

    let empty = Query::<PaymentFilter>::try_from_uri(&uri("/api/payments?_start=0&_end=25"))
        .unwrap()
        .0;
    assert!(empty.invoice_id.is_none());
}

#[test]
fn timesheet_filter_accepts_windowed_queries() {
    let q = format!("/api/timesheets?_start=10&_end=20&status=submitted&user_id={}", MEMBER);
    let filter = Query::<TimesheetFilter>::try_from_uri(&uri(&q)).unwrap().0;
    assert_eq!(filter.status, Some(TimesheetStatus::Submitted));
    assert!(filter.user_id.is_some());
}

#[test]
fn time_entry_filter_accepts_dates_and_window() {
    let q = format!(
        "/api/time-entries?_start=0&_end=100&from=2025-06-01&to=2025-06-30&user_id={}",
        MEMBER
    );
    let filter = Query::<TimeEntryFilter>::try_from_uri(&uri(&q)).unwrap().0;
    assert_eq!(filter.from.unwrap().to_string(), "2025-06-01");
    assert_eq!(filter.to.unwrap().to_string(), "2025-06-30");
    assert!(filter.project_id.is_none());
}

#[test]
fn notification_filter_parses_unread_flag() {
    let filter = Query::<NotificationFilter>::try_from_uri(&uri(
        "/api/notifications?_start=0&_end=25&unread=true",
    ))
    .unwrap()
    .0;
    assert_eq!(filter.unread, Some(true));
}

#[test]
fn invitation_filter_parses_status() {
    let filter = Query::<InvitationFilter>::try_from_uri(&uri(
        "/api/invitations?_start=0&_end=25&status=pending",
    ))
    .unwrap()
    .0;
    assert_eq!(filter.status, Some(InvitationStatus::Pending));
}

#[test]
fn task_filter_accepts_windowed_queries() {
    let q = format!("/api/tasks?_start=0&_end=25&project_id={}&assignee_id={}", MEMBER, MEMBER);
    let filter = Query::<TaskFilter>::try_from_uri(&uri(&q)).unwrap().0;
    assert!(filter.project_id.is_some());
    assert!(filter.assignee_id.is_some());
}
