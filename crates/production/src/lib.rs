//! Production orders domain module.
//!
//! A production order turns supplies into a finished product. Completing it
//! consumes the supplies and adds the produced quantity to stock.

pub mod order;

pub use order::{
    ChangeProductionOrderStatus, NewProductionOrder, ProductionOrder, ProductionOrderStatus,
    ProductionStatusChanged, SupplyUsage,
};
