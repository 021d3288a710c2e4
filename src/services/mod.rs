pub mod billing;
pub mod notify;
pub mod payroll;
