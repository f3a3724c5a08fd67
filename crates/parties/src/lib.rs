//! Parties domain module: suppliers and employees.
//!
//! Deterministic validation rules only (no IO, no HTTP, no storage).

pub mod contact;
pub mod employee;
pub mod supplier;

pub use contact::ContactInfo;
pub use employee::{Employee, EmployeeRole, EmployeeUpdate, NewEmployee};
pub use supplier::{NewSupplier, Supplier, SupplierUpdate};
