//! Catalog domain: finished-goods products and raw-material supplies.
//!
//! Pure validation and update rules (no IO, no HTTP, no storage). Stock
//! quantities are projections owned by the inventory ledger; nothing here
//! changes them.

pub mod product;
pub mod supply;

pub use product::{NewProduct, Product, ProductUpdate};
pub use supply::{NewSupply, Supply, SupplyUpdate};

use pansoft_core::{DomainError, DomainResult};
use rust_decimal::Decimal;

pub(crate) fn non_negative(field: &str, value: Decimal) -> DomainResult<Decimal> {
    if value < Decimal::ZERO {
        return Err(DomainError::validation(format!("{field} cannot be negative")));
    }
    Ok(value.normalize())
}
