//! `pansoft-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{DomainError, DomainResult};
pub use id::{
    EmployeeId, MovementId, ProductId, ProductionOrderId, SalesOrderId, SupplierId, SupplyId,
};
