use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pansoft_core::error::{optional_text, require_text};
use pansoft_core::{AggregateRoot, DomainResult, ProductId};

use crate::non_negative;

pub const DEFAULT_PRODUCT_UNIT: &str = "unidad";

/// A finished good sold by the bakery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub unit: String,
    /// Stock projection; only the ledger moves it.
    pub quantity: Decimal,
    pub min_stock: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn low_stock(&self) -> bool {
        self.quantity <= self.min_stock
    }

    /// Inactive products cannot be ordered.
    pub fn can_be_sold(&self) -> bool {
        self.active
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        0
    }
}

/// Input for creating a product.
///
/// `initial_quantity` is not written to the projection directly; the store
/// records it as an opening `entrada`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub unit: Option<String>,
    pub initial_quantity: Decimal,
    pub min_stock: Decimal,
}

impl NewProduct {
    /// Validate and build the product row (with zero stock).
    pub fn into_product(self, id: ProductId, now: DateTime<Utc>) -> DomainResult<Product> {
        require_text("sku", &self.sku)?;
        require_text("name", &self.name)?;
        non_negative("initial quantity", self.initial_quantity)?;

        Ok(Product {
            id,
            sku: self.sku.trim().to_string(),
            name: self.name.trim().to_string(),
            description: optional_text(self.description),
            price: non_negative("price", self.price)?,
            unit: optional_text(self.unit).unwrap_or_else(|| DEFAULT_PRODUCT_UNIT.to_string()),
            quantity: Decimal::ZERO,
            min_stock: non_negative("min stock", self.min_stock)?,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub unit: Option<String>,
    pub min_stock: Option<Decimal>,
    pub active: Option<bool>,
}

impl ProductUpdate {
    /// Apply to `product`, validating every provided field first.
    ///
    /// On error the product is left unchanged.
    pub fn apply_to(self, product: &mut Product, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = product.clone();

        if let Some(sku) = self.sku {
            require_text("sku", &sku)?;
            next.sku = sku.trim().to_string();
        }
        if let Some(name) = self.name {
            require_text("name", &name)?;
            next.name = name.trim().to_string();
        }
        if self.description.is_some() {
            next.description = optional_text(self.description);
        }
        if let Some(price) = self.price {
            next.price = non_negative("price", price)?;
        }
        if let Some(unit) = self.unit {
            require_text("unit", &unit)?;
            next.unit = unit.trim().to_string();
        }
        if let Some(min_stock) = self.min_stock {
            next.min_stock = non_negative("min stock", min_stock)?;
        }
        if let Some(active) = self.active {
            next.active = active;
        }

        next.updated_at = now;
        *product = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pansoft_core::DomainError;
    use rust_decimal_macros::dec;

    fn new_product() -> NewProduct {
        NewProduct {
            sku: " PAN-001 ".into(),
            name: "Pan francés".into(),
            description: Some("  ".into()),
            price: dec!(0.50),
            unit: None,
            initial_quantity: dec!(40),
            min_stock: dec!(10),
        }
    }

    #[test]
    fn creation_normalizes_and_starts_at_zero_stock() {
        let p = new_product()
            .into_product(ProductId::new(), Utc::now())
            .unwrap();
        assert_eq!(p.sku, "PAN-001");
        assert_eq!(p.description, None);
        assert_eq!(p.unit, DEFAULT_PRODUCT_UNIT);
        assert_eq!(p.quantity, Decimal::ZERO);
        assert!(p.active);
        assert!(p.low_stock());
    }

    #[test]
    fn creation_rejects_blank_sku_and_negative_price() {
        let mut input = new_product();
        input.sku = "".into();
        assert!(matches!(
            input.into_product(ProductId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));

        let mut input = new_product();
        input.price = dec!(-1);
        assert!(matches!(
            input.into_product(ProductId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn failed_update_leaves_product_untouched() {
        let mut p = new_product()
            .into_product(ProductId::new(), Utc::now())
            .unwrap();
        let before = p.clone();

        let update = ProductUpdate {
            name: Some("Pan integral".into()),
            min_stock: Some(dec!(-5)),
            ..ProductUpdate::default()
        };
        assert!(update.apply_to(&mut p, Utc::now()).is_err());
        assert_eq!(p, before);
    }

    #[test]
    fn update_applies_provided_fields_only() {
        let mut p = new_product()
            .into_product(ProductId::new(), Utc::now())
            .unwrap();
        ProductUpdate {
            price: Some(dec!(0.75)),
            active: Some(false),
            ..ProductUpdate::default()
        }
        .apply_to(&mut p, Utc::now())
        .unwrap();

        assert_eq!(p.price, dec!(0.75));
        assert!(!p.can_be_sold());
        assert_eq!(p.name, "Pan francés");
    }
}
