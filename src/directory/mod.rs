/// Employee and department directory
pub mod departments;
pub mod employees;

pub use departments::{Department, DepartmentManager};
pub use employees::{Employee, EmployeeManager};
