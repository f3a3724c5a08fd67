use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pansoft_core::error::{optional_text, require_text};
use pansoft_core::{AggregateRoot, DomainResult, SupplierId, SupplyId};

use crate::non_negative;

/// A raw material (flour, yeast, butter...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supply {
    pub id: SupplyId,
    pub name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub min_stock: Decimal,
    pub cost_per_unit: Decimal,
    pub supplier_id: Option<SupplierId>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Supply {
    pub fn low_stock(&self) -> bool {
        self.quantity <= self.min_stock
    }
}

impl AggregateRoot for Supply {
    type Id = SupplyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewSupply {
    pub name: String,
    pub unit: String,
    pub cost_per_unit: Decimal,
    pub initial_quantity: Decimal,
    pub min_stock: Decimal,
    pub supplier_id: Option<SupplierId>,
}

impl NewSupply {
    pub fn into_supply(self, id: SupplyId, now: DateTime<Utc>) -> DomainResult<Supply> {
        require_text("name", &self.name)?;
        require_text("unit", &self.unit)?;
        non_negative("initial quantity", self.initial_quantity)?;

        Ok(Supply {
            id,
            name: self.name.trim().to_string(),
            unit: self.unit.trim().to_string(),
            quantity: Decimal::ZERO,
            min_stock: non_negative("min stock", self.min_stock)?,
            cost_per_unit: non_negative("cost per unit", self.cost_per_unit)?,
            supplier_id: self.supplier_id,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update. `clear_supplier` detaches the supplier; it wins over
/// `supplier_id`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupplyUpdate {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub cost_per_unit: Option<Decimal>,
    pub min_stock: Option<Decimal>,
    pub supplier_id: Option<SupplierId>,
    pub clear_supplier: bool,
    pub active: Option<bool>,
}

impl SupplyUpdate {
    pub fn apply_to(self, supply: &mut Supply, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = supply.clone();

        if let Some(name) = self.name {
            require_text("name", &name)?;
            next.name = name.trim().to_string();
        }
        if let Some(unit) = optional_text(self.unit) {
            next.unit = unit;
        }
        if let Some(cost) = self.cost_per_unit {
            next.cost_per_unit = non_negative("cost per unit", cost)?;
        }
        if let Some(min_stock) = self.min_stock {
            next.min_stock = non_negative("min stock", min_stock)?;
        }
        if self.clear_supplier {
            next.supplier_id = None;
        } else if self.supplier_id.is_some() {
            next.supplier_id = self.supplier_id;
        }
        if let Some(active) = self.active {
            next.active = active;
        }

        next.updated_at = now;
        *supply = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pansoft_core::DomainError;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn flour() -> Supply {
        NewSupply {
            name: "Harina de trigo".into(),
            unit: "kg".into(),
            cost_per_unit: dec!(1.20),
            initial_quantity: dec!(25),
            min_stock: dec!(5),
            supplier_id: Some(SupplierId::new()),
        }
        .into_supply(SupplyId::new(), Utc::now())
        .unwrap()
    }

    #[test]
    fn supply_requires_a_unit() {
        let input = NewSupply {
            name: "Levadura".into(),
            unit: " ".into(),
            ..NewSupply::default()
        };
        assert!(matches!(
            input.into_supply(SupplyId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn clear_supplier_detaches() {
        let mut s = flour();
        SupplyUpdate {
            clear_supplier: true,
            supplier_id: Some(SupplierId::new()),
            ..SupplyUpdate::default()
        }
        .apply_to(&mut s, Utc::now())
        .unwrap();
        assert_eq!(s.supplier_id, None);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 200,
            ..ProptestConfig::default()
        })]

        /// Property: an update never touches the stock projection.
        #[test]
        fn update_never_changes_quantity(cost in -500i64..500, min in -500i64..500) {
            let mut s = flour();
            let before = s.quantity;
            let _ = SupplyUpdate {
                cost_per_unit: Some(Decimal::new(cost, 2)),
                min_stock: Some(Decimal::new(min, 1)),
                ..SupplyUpdate::default()
            }
            .apply_to(&mut s, Utc::now());
            prop_assert_eq!(s.quantity, before);
        }
    }
}
