pub mod customer;
pub mod invitation;
pub mod invoice;
pub mod membership;
pub mod notification;
pub mod payment;
pub mod payroll;
pub mod position;
pub mod project;
pub mod task;
pub mod tenant;
pub mod time_entry;
pub mod timesheet;
pub mod user;
