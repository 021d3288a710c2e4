//! Role/permission matrix and the workflow state machines, exercised the way
//! the middleware and handlers consult them.

use crewhq_api::models::invoice::InvoiceStatus;
use crewhq_api::models::membership::Role;
use crewhq_api::models::timesheet::TimesheetStatus;
use crewhq_api::permissions::Permission;

#[test]
fn members_track_time_but_do_not_bill() {
    assert!(Role::Member.allows(Permission::TrackTime));
    assert!(Role::Member.allows(Permission::SubmitTimesheets));
    assert!(Role::Member.allows(Permission::ManageTasks));

    assert!(!Role::Member.allows(Permission::ApproveTimesheets));
    assert!(!Role::Member.allows(Permission::ViewBilling));
    assert!(!Role::Member.allows(Permission::ManageInvoices));
    assert!(!Role::Member.allows(Permission::ManageMembers));
}

#[test]
fn managers_run_projects_and_approvals() {
    assert!(Role::Manager.allows(Permission::ManageCustomers));
    assert!(Role::Manager.allows(Permission::ManageProjects));
    assert!(Role::Manager.allows(Permission::ApproveTimesheets));
    assert!(Role::Manager.allows(Permission::ViewBilling));

    assert!(!Role::Manager.allows(Permission::ManageInvoices));
    assert!(!Role::Manager.allows(Permission::ManagePayroll));
    assert!(!Role::Manager.allows(Permission::ManageTenant));
}

#[test]
fn admins_and_owners_hold_everything() {
    for role in [Role::Admin, Role::Owner] {
        assert!(role.allows(Permission::ManageTenant));
        assert!(role.allows(Permission::ManageMembers));
        assert!(role.allows(Permission::ManageInvoices));
        assert!(role.allows(Permission::ManagePayments));
        assert!(role.allows(Permission::ManagePayroll));
        assert!(role.allows(Permission::ManageInvitations));
        assert!(role.allows(Permission::TrackTime));
    }
}

#[test]
fn timesheet_flow_is_linear_with_rework() {
    use TimesheetStatus::*;

    assert!(Draft.can_transition_to(Submitted));
    assert!(Submitted.can_transition_to(Approved));
    assert!(Submitted.can_transition_to(Rejected));
    assert!(Rejected.can_transition_to(Submitted));

    assert!(!Draft.can_transition_to(Approved));
    assert!(!Approved.can_transition_to(Submitted));
    assert!(!Approved.can_transition_to(Rejected));
}

#[test]
fn only_open_invoices_accept_payments() {
    assert!(InvoiceStatus::Sent.accepts_payments());
    assert!(InvoiceStatus::PartiallyPaid.accepts_payments());

    assert!(!InvoiceStatus::Draft.accepts_payments());
    assert!(!InvoiceStatus::Paid.accepts_payments());
    assert!(!InvoiceStatus::Void.accepts_payments());
}
