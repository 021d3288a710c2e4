pub mod auth;
pub mod customers;
pub mod invitations;
pub mod invoices;
pub mod notifications;
pub mod payments;
pub mod payroll;
pub mod positions;
pub mod projects;
pub mod tasks;
pub mod tenant;
pub mod time_entries;
pub mod timesheets;
