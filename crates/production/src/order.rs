use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pansoft_core::error::optional_text;
use pansoft_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, EmployeeId, ProductId,
    ProductionOrderId, SupplyId,
};
use pansoft_inventory::{MovementReference, MovementType, RecordMovement, StockSubject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionOrderStatus {
    Pendiente,
    EnProceso,
    Completado,
    Cancelado,
}

impl ProductionOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionOrderStatus::Pendiente => "pendiente",
            ProductionOrderStatus::EnProceso => "en_proceso",
            ProductionOrderStatus::Completado => "completado",
            ProductionOrderStatus::Cancelado => "cancelado",
        }
    }

    pub fn can_transition_to(&self, next: ProductionOrderStatus) -> bool {
        use ProductionOrderStatus::*;
        matches!(
            (self, next),
            (Pendiente, EnProceso | Completado | Cancelado) | (EnProceso, Completado | Cancelado)
        )
    }
}

impl core::fmt::Display for ProductionOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductionOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "pendiente" => Ok(ProductionOrderStatus::Pendiente),
            "en_proceso" => Ok(ProductionOrderStatus::EnProceso),
            "completado" => Ok(ProductionOrderStatus::Completado),
            "cancelado" => Ok(ProductionOrderStatus::Cancelado),
            other => Err(DomainError::validation(format!(
                "unknown production order status '{other}'"
            ))),
        }
    }
}

/// A supply consumed by a production run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyUsage {
    pub supply_id: SupplyId,
    pub quantity: Decimal,
}

/// Aggregate root: ProductionOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub id: ProductionOrderId,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub supplies: Vec<SupplyUsage>,
    pub notes: Option<String>,
    pub status: ProductionOrderStatus,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductionOrder {
    /// Ledger commands for completing the run: supplies out first, then the
    /// product in.
    pub fn completion_commands(
        &self,
        user_id: Option<EmployeeId>,
        occurred_at: DateTime<Utc>,
    ) -> Vec<RecordMovement> {
        let reference = MovementReference::ProductionOrder(self.id);

        let mut commands: Vec<RecordMovement> = self
            .supplies
            .iter()
            .map(|usage| {
                RecordMovement::new(
                    StockSubject::Supply(usage.supply_id),
                    MovementType::Salida,
                    usage.quantity,
                )
                .with_reason(format!("consumo - producción {}", self.id))
                .by_user(user_id)
                .with_reference(reference)
                .at(occurred_at)
            })
            .collect();

        commands.push(
            RecordMovement::new(
                StockSubject::Product(self.product_id),
                MovementType::Entrada,
                self.quantity,
            )
            .with_reason(format!("producción {}", self.id))
            .by_user(user_id)
            .with_reference(reference)
            .at(occurred_at),
        );

        commands
    }
}

impl AggregateRoot for ProductionOrder {
    type Id = ProductionOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProductionOrder {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub supplies: Vec<SupplyUsage>,
    pub notes: Option<String>,
}

impl NewProductionOrder {
    pub fn into_order(
        self,
        id: ProductionOrderId,
        now: DateTime<Utc>,
    ) -> DomainResult<ProductionOrder> {
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(
                "quantity to produce must be greater than zero",
            ));
        }

        let mut supplies: Vec<SupplyUsage> = Vec::with_capacity(self.supplies.len());
        for usage in self.supplies {
            if usage.quantity <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "supply {}: quantity must be greater than zero",
                    usage.supply_id
                )));
            }
            // Repeated supplies are merged into one usage.
            match supplies.iter_mut().find(|u| u.supply_id == usage.supply_id) {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .checked_add(usage.quantity)
                        .ok_or_else(|| {
                            DomainError::validation(format!(
                                "supply {}: quantity is too large",
                                usage.supply_id
                            ))
                        })?;
                }
                None => supplies.push(usage),
            }
        }
        for usage in &mut supplies {
            usage.quantity = usage.quantity.normalize();
        }

        Ok(ProductionOrder {
            id,
            product_id: self.product_id,
            quantity: self.quantity.normalize(),
            supplies,
            notes: optional_text(self.notes),
            status: ProductionOrderStatus::Pendiente,
            completed_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProductionOrderStatus {
    pub order_id: ProductionOrderId,
    pub status: ProductionOrderStatus,
    pub user_id: Option<EmployeeId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionStatusChanged {
    pub order_id: ProductionOrderId,
    pub from: ProductionOrderStatus,
    pub to: ProductionOrderStatus,
    /// True when this change completes the run and must move stock.
    pub produces: bool,
    pub user_id: Option<EmployeeId>,
    pub occurred_at: DateTime<Utc>,
}

impl Aggregate for ProductionOrder {
    type Command = ChangeProductionOrderStatus;
    type Event = ProductionStatusChanged;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        self.status = event.to;
        if event.produces {
            self.completed_at = Some(event.occurred_at);
        }
        self.updated_at = event.occurred_at;
        self.version += 1;
    }

    fn handle(&self, cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if cmd.order_id != self.id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        if cmd.status == self.status {
            return Err(DomainError::validation(format!(
                "production order is already {}",
                self.status
            )));
        }
        if !self.status.can_transition_to(cmd.status) {
            return Err(DomainError::invariant(format!(
                "cannot change production order from {} to {}",
                self.status, cmd.status
            )));
        }

        Ok(vec![ProductionStatusChanged {
            order_id: self.id,
            from: self.status,
            to: cmd.status,
            produces: cmd.status == ProductionOrderStatus::Completado,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_order() -> ProductionOrder {
        let flour = SupplyId::new();
        NewProductionOrder {
            product_id: ProductId::new(),
            quantity: dec!(100),
            supplies: vec![
                SupplyUsage {
                    supply_id: flour,
                    quantity: dec!(5),
                },
                SupplyUsage {
                    supply_id: SupplyId::new(),
                    quantity: dec!(0.25),
                },
                SupplyUsage {
                    supply_id: flour,
                    quantity: dec!(1.5),
                },
            ],
            notes: Some("turno mañana".into()),
        }
        .into_order(ProductionOrderId::new(), Utc::now())
        .unwrap()
    }

    fn cmd(order: &ProductionOrder, status: ProductionOrderStatus) -> ChangeProductionOrderStatus {
        ChangeProductionOrderStatus {
            order_id: order.id,
            status,
            user_id: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn repeated_supplies_are_merged() {
        let order = test_order();
        assert_eq!(order.supplies.len(), 2);
        assert_eq!(order.supplies[0].quantity, dec!(6.5));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let input = NewProductionOrder {
            product_id: ProductId::new(),
            quantity: Decimal::ZERO,
            supplies: vec![],
            notes: None,
        };
        assert!(matches!(
            input.into_order(ProductionOrderId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn completion_produces_and_is_terminal() {
        let mut order = test_order();
        let events = order.handle(&cmd(&order, ProductionOrderStatus::Completado)).unwrap();
        assert!(events[0].produces);
        order.apply(&events[0]);
        assert!(order.completed_at.is_some());

        let err = order.handle(&cmd(&order, ProductionOrderStatus::Cancelado)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn starting_does_not_produce() {
        let order = test_order();
        let events = order.handle(&cmd(&order, ProductionOrderStatus::EnProceso)).unwrap();
        assert!(!events[0].produces);
    }

    #[test]
    fn completion_commands_consume_then_produce() {
        let order = test_order();
        let cmds = order.completion_commands(None, Utc::now());
        assert_eq!(cmds.len(), 3);
        assert!(cmds[..2].iter().all(|c| c.movement_type == MovementType::Salida
            && matches!(c.subject, StockSubject::Supply(_))));
        let last = &cmds[2];
        assert_eq!(last.movement_type, MovementType::Entrada);
        assert_eq!(last.subject, StockSubject::Product(order.product_id));
        assert_eq!(last.quantity, dec!(100));
        assert_eq!(last.reference, Some(MovementReference::ProductionOrder(order.id)));
    }

    #[test]
    fn merging_huge_usages_is_rejected() {
        let flour = SupplyId::new();
        let usage = || SupplyUsage {
            supply_id: flour,
            quantity: Decimal::MAX,
        };
        let err = NewProductionOrder {
            product_id: ProductId::new(),
            quantity: dec!(10),
            supplies: vec![usage(), usage()],
            notes: None,
        }
        .into_order(ProductionOrderId::new(), Utc::now())
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref m) if m.contains("too large")));
    }
}
