//! Static role/permission map. Authorization is a lookup, not a policy
//! engine: each permission names the minimum role that holds it.

use crate::models::membership::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ManageTenant,
    ManageMembers,
    ManageInvitations,
    ManagePositions,
    ManageCustomers,
    ManageProjects,
    ManageTasks,
    TrackTime,
    SubmitTimesheets,
    ApproveTimesheets,
    ManageInvoices,
    ManagePayments,
    ManagePayroll,
    ViewBilling,
}

impl Permission {
    /// Minimum role required for this permission
    pub fn minimum_role(self) -> Role {
        match self {
            Permission::ManageTenant
            | Permission::ManageMembers
            | Permission::ManageInvitations
            | Permission::ManagePositions
            | Permission::ManageInvoices
            | Permission::ManagePayments
            | Permission::ManagePayroll => Role::Admin,

            Permission::ManageCustomers
            | Permission::ManageProjects
            | Permission::ApproveTimesheets
            | Permission::ViewBilling => Role::Manager,

            Permission::ManageTasks
            | Permission::TrackTime
            | Permission::SubmitTimesheets => Role::Member,
        }
    }
}

impl Role {
    pub fn allows(self, permission: Permission) -> bool {
        self.at_least(permission.minimum_role())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_tracks_time_but_cannot_bill() {
        assert!(Role::Member.allows(Permission::TrackTime));
        assert!(Role::Member.allows(Permission::ManageTasks));
        assert!(!Role::Member.allows(Permission::ApproveTimesheets));
        assert!(!Role::Member.allows(Permission::ManageInvoices));
    }

    #[test]
    fn manager_approves_but_does_not_manage_billing() {
        assert!(Role::Manager.allows(Permission::ApproveTimesheets));
        assert!(Role::Manager.allows(Permission::ManageProjects));
        assert!(Role::Manager.allows(Permission::ViewBilling));
        assert!(!Role::Manager.allows(Permission::ManagePayments));
        assert!(!Role::Manager.allows(Permission::ManageMembers));
    }

    #[test]
    fn admin_and_owner_hold_everything() {
        for perm in [
            Permission::ManageTenant,
            Permission::ManageInvoices,
            Permission::ManagePayroll,
            Permission::TrackTime,
        ] {
            assert!(Role::Admin.allows(perm));
            assert!(Role::Owner.allows(perm));
        }
    }
}
