//! Inventory domain module: stock levels and the movement ledger.
//!
//! Every stock change for a product or supply is decided here as a `Movement`
//! (pure, deterministic logic; no IO, no HTTP, no storage). Stores persist the
//! decided movements and the stock projection together.

pub mod ledger;
pub mod movement;
pub mod plan;
pub mod stock;

pub use ledger::{LedgerAudit, LedgerIssue, LedgerRepair, audit_subject, plan_repairs, replay};
pub use movement::{Movement, MovementReference, MovementType, StockSubject, SubjectKind};
pub use plan::MovementPlan;
pub use stock::{RecordMovement, StockLevel, StockPolicy};
