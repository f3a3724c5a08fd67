use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pansoft_core::error::{optional_text, require_text};
use pansoft_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, EmployeeId, ProductId, SalesOrderId,
};
use pansoft_inventory::{MovementReference, MovementType, RecordMovement, StockSubject};

/// Sales order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesOrderStatus {
    Pendiente,
    EnProceso,
    Completado,
    Entregado,
    Cancelado,
}

impl SalesOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SalesOrderStatus::Pendiente => "pendiente",
            SalesOrderStatus::EnProceso => "en_proceso",
            SalesOrderStatus::Completado => "completado",
            SalesOrderStatus::Entregado => "entregado",
            SalesOrderStatus::Cancelado => "cancelado",
        }
    }

    pub fn can_transition_to(&self, next: SalesOrderStatus) -> bool {
        use SalesOrderStatus::*;
        matches!(
            (self, next),
            (Pendiente, EnProceso | Completado | Entregado | Cancelado)
                | (EnProceso, Completado | Entregado | Cancelado)
                | (Completado, Entregado | Cancelado)
                | (Entregado, Cancelado)
        )
    }

    /// Statuses in which the ordered goods have left the shelf.
    pub fn consumes_stock(&self) -> bool {
        matches!(self, SalesOrderStatus::Completado | SalesOrderStatus::Entregado)
    }
}

impl core::fmt::Display for SalesOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SalesOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "pendiente" => Ok(SalesOrderStatus::Pendiente),
            "en_proceso" => Ok(SalesOrderStatus::EnProceso),
            "completado" => Ok(SalesOrderStatus::Completado),
            "entregado" => Ok(SalesOrderStatus::Entregado),
            "cancelado" => Ok(SalesOrderStatus::Cancelado),
            other => Err(DomainError::validation(format!(
                "unknown sales order status '{other}'"
            ))),
        }
    }
}

/// Order line: product, quantity, unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl OrderLine {
    /// Saturates instead of overflowing; orders built by `into_order` never
    /// reach the bound.
    pub fn subtotal(&self) -> Decimal {
        self.quantity.saturating_mul(self.unit_price)
    }
}

/// What a status change does to stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockEffect {
    None,
    /// One `salida` per line.
    Deduct,
    /// One `devolucion` per line.
    Restore,
}

/// Aggregate root: SalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: SalesOrderId,
    pub customer_name: String,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub lines: Vec<OrderLine>,
    pub total: Decimal,
    pub status: SalesOrderStatus,
    /// Whether the order's lines are currently deducted from stock.
    pub inventory_applied: bool,
    #[serde(skip)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SalesOrder {
    /// Products referenced by the order, deduplicated.
    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids: Vec<ProductId> = self.lines.iter().map(|l| l.product_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Ledger commands implementing `effect` for this order.
    pub fn movement_commands(
        &self,
        effect: StockEffect,
        user_id: Option<EmployeeId>,
        occurred_at: DateTime<Utc>,
    ) -> Vec<RecordMovement> {
        let (movement_type, reason) = match effect {
            StockEffect::None => return Vec::new(),
            StockEffect::Deduct => (MovementType::Salida, format!("venta - pedido {}", self.id)),
            StockEffect::Restore => (
                MovementType::Devolucion,
                format!("cancelación - pedido {}", self.id),
            ),
        };

        self.lines
            .iter()
            .map(|line| {
                RecordMovement::new(
                    StockSubject::Product(line.product_id),
                    movement_type,
                    line.quantity,
                )
                .with_reason(reason.clone())
                .by_user(user_id)
                .with_reference(MovementReference::SalesOrder(self.id))
                .at(occurred_at)
            })
            .collect()
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewSalesOrder {
    pub customer_name: String,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub lines: Vec<NewOrderLine>,
}

impl NewSalesOrder {
    /// Validate and build a `pendiente` order.
    ///
    /// Product existence is checked by the store.
    pub fn into_order(self, id: SalesOrderId, now: DateTime<Utc>) -> DomainResult<SalesOrder> {
        require_text("customer name", &self.customer_name)?;
        if self.lines.is_empty() {
            return Err(DomainError::validation("order must have at least one line"));
        }

        let mut lines = Vec::with_capacity(self.lines.len());
        let mut total = Decimal::ZERO;
        for (idx, line) in self.lines.into_iter().enumerate() {
            if line.quantity <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "line {}: quantity must be greater than zero",
                    idx + 1
                )));
            }
            if line.unit_price < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "line {}: unit price cannot be negative",
                    idx + 1
                )));
            }
            total = line
                .quantity
                .checked_mul(line.unit_price)
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or_else(|| {
                    DomainError::validation(format!("line {}: amount is too large", idx + 1))
                })?;
            lines.push(OrderLine {
                line_no: (idx as u32) + 1,
                product_id: line.product_id,
                quantity: line.quantity.normalize(),
                unit_price: line.unit_price.normalize(),
            });
        }
        let total = total.normalize();

        Ok(SalesOrder {
            id,
            customer_name: self.customer_name.trim().to_string(),
            delivery_date: self.delivery_date,
            notes: optional_text(self.notes),
            lines,
            total,
            status: SalesOrderStatus::Pendiente,
            inventory_applied: false,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Command: move the order to another status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSalesOrderStatus {
    pub order_id: SalesOrderId,
    pub status: SalesOrderStatus,
    pub user_id: Option<EmployeeId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: the status changed, with the stock effect it implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderStatusChanged {
    pub order_id: SalesOrderId,
    pub from: SalesOrderStatus,
    pub to: SalesOrderStatus,
    pub stock_effect: StockEffect,
    pub user_id: Option<EmployeeId>,
    pub occurred_at: DateTime<Utc>,
}

impl Aggregate for SalesOrder {
    type Command = ChangeSalesOrderStatus;
    type Event = SalesOrderStatusChanged;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        self.status = event.to;
        match event.stock_effect {
            StockEffect::Deduct => self.inventory_applied = true,
            StockEffect::Restore => self.inventory_applied = false,
            StockEffect::None => {}
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
                "order is already {}",
                self.status
            )));
        }
        if !self.status.can_transition_to(cmd.status) {
            return Err(DomainError::invariant(format!(
                "cannot change order from {} to {}",
                self.status, cmd.status
            )));
        }

        let stock_effect = if cmd.status.consumes_stock() && !self.inventory_applied {
            StockEffect::Deduct
        } else if cmd.status == SalesOrderStatus::Cancelado && self.inventory_applied {
            StockEffect::Restore
        } else {
            StockEffect::None
        };

        Ok(vec![SalesOrderStatusChanged {
            order_id: self.id,
            from: self.status,
            to: cmd.status,
            stock_effect,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_order() -> SalesOrder {
        NewSalesOrder {
            customer_name: "Cafetería Lima".into(),
            delivery_date: None,
            notes: None,
            lines: vec![
                NewOrderLine {
                    product_id: ProductId::new(),
                    quantity: dec!(12),
                    unit_price: dec!(0.50),
                },
                NewOrderLine {
                    product_id: ProductId::new(),
                    quantity: dec!(2),
                    unit_price: dec!(15),
                },
            ],
        }
        .into_order(SalesOrderId::new(), Utc::now())
        .unwrap()
    }

    fn change(order: &mut SalesOrder, status: SalesOrderStatus) -> SalesOrderStatusChanged {
        let cmd = ChangeSalesOrderStatus {
            order_id: order.id,
            status,
            user_id: None,
            occurred_at: Utc::now(),
        };
        let mut events = order.handle(&cmd).unwrap();
        assert_eq!(events.len(), 1);
        order.apply(&events[0]);
        events.remove(0)
    }

    #[test]
    fn creation_computes_total_and_numbers_lines() {
        let order = test_order();
        assert_eq!(order.total, dec!(36));
        assert_eq!(order.lines[1].line_no, 2);
        assert_eq!(order.status, SalesOrderStatus::Pendiente);
        assert!(!order.inventory_applied);
    }

    #[test]
    fn order_without_lines_or_with_zero_quantity_is_rejected() {
        let empty = NewSalesOrder {
            customer_name: "X".into(),
            ..NewSalesOrder::default()
        };
        assert!(empty.into_order(SalesOrderId::new(), Utc::now()).is_err());

        let zero = NewSalesOrder {
            customer_name: "X".into(),
            lines: vec![NewOrderLine {
                product_id: ProductId::new(),
                quantity: Decimal::ZERO,
                unit_price: dec!(1),
            }],
            ..NewSalesOrder::default()
        };
        assert!(matches!(
            zero.into_order(SalesOrderId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn completing_deducts_once() {
        let mut order = test_order();
        let mut effect = |status| change(&mut order, status).stock_effect;
        assert_eq!(effect(SalesOrderStatus::EnProceso), StockEffect::None);
        assert_eq!(effect(SalesOrderStatus::Completado), StockEffect::Deduct);
        assert_eq!(effect(SalesOrderStatus::Entregado), StockEffect::None);
        assert!(order.inventory_applied);
        assert_eq!(order.version(), 3);
    }

    #[test]
    fn cancelling_after_delivery_restores() {
        let mut order = test_order();
        change(&mut order, SalesOrderStatus::Entregado);
        let e = change(&mut order, SalesOrderStatus::Cancelado);
        assert_eq!(e.stock_effect, StockEffect::Restore);
        assert!(!order.inventory_applied);
    }

    #[test]
    fn cancelling_pending_order_touches_no_stock() {
        let mut order = test_order();
        let e = change(&mut order, SalesOrderStatus::Cancelado);
        assert_eq!(e.stock_effect, StockEffect::None);
    }

    #[test]
    fn cancelled_is_terminal_and_same_status_rejected() {
        let mut order = test_order();
        let same = ChangeSalesOrderStatus {
            order_id: order.id,
            status: SalesOrderStatus::Pendiente,
            user_id: None,
            occurred_at: Utc::now(),
        };
        assert!(matches!(order.handle(&same), Err(DomainError::Validation(_))));

        change(&mut order, SalesOrderStatus::Cancelado);
        let reopen = ChangeSalesOrderStatus {
            status: SalesOrderStatus::EnProceso,
            ..same
        };
        assert!(matches!(
            order.handle(&reopen),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn movement_commands_follow_effect() {
        let order = test_order();
        let user = Some(EmployeeId::new());
        let now = Utc::now();

        let deduct = order.movement_commands(StockEffect::Deduct, user, now);
        assert_eq!(deduct.len(), 2);
        assert!(deduct.iter().all(|c| c.movement_type == MovementType::Salida));
        assert_eq!(deduct[0].quantity, dec!(12));
        assert_eq!(deduct[0].reference, Some(MovementReference::SalesOrder(order.id)));
        assert_eq!(deduct[0].user_id, user);

        let restore = order.movement_commands(StockEffect::Restore, None, now);
        assert!(restore.iter().all(|c| c.movement_type == MovementType::Devolucion));
        assert!(order.movement_commands(StockEffect::None, None, now).is_empty());
    }

    #[test]
    fn status_parses_with_spaces() {
        assert_eq!(
            "En Proceso".parse::<SalesOrderStatus>().unwrap(),
            SalesOrderStatus::EnProceso
        );
        assert!("enviado".parse::<SalesOrderStatus>().is_err());
    }

    fn status() -> impl Strategy<Value = SalesOrderStatus> {
        prop::sample::select(vec![
            SalesOrderStatus::Pendiente,
            SalesOrderStatus::EnProceso,
            SalesOrderStatus::Completado,
            SalesOrderStatus::Entregado,
            SalesOrderStatus::Cancelado,
        ])
    }

    #[test]
    fn oversized_amounts_are_rejected_not_overflowed() {
        let new = |quantity, unit_price| NewSalesOrder {
            customer_name: "Hotel Plaza".into(),
            lines: vec![NewOrderLine {
                product_id: ProductId::new(),
                quantity,
                unit_price,
            }],
            ..Default::default()
        };

        let err = new(Decimal::MAX, dec!(2))
            .into_order(SalesOrderId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref m) if m.contains("too large")));

        let huge = Decimal::from_i128_with_scale(10i128.pow(20), 0);
        let err = new(huge, huge)
            .into_order(SalesOrderId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let line = OrderLine {
            line_no: 1,
            product_id: ProductId::new(),
            quantity: Decimal::MAX,
            unit_price: dec!(3),
        };
        assert_eq!(line.subtotal(), Decimal::MAX);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 300,
            ..ProptestConfig::default()
        })]

        /// Property: along any accepted status path, stock is deducted at most
        /// once more than it is restored, and `inventory_applied` tracks the
        /// balance.
        #[test]
        fn stock_effects_stay_balanced(path in prop::collection::vec(status(), 1..12)) {
            let mut order = test_order();
            let mut balance = 0i32;
            for next in path {
                let cmd = ChangeSalesOrderStatus {
                    order_id: order.id,
                    status: next,
                    user_id: None,
                    occurred_at: Utc::now(),
                };
                if let Ok(events) = order.handle(&cmd) {
                    for e in &events {
                        match e.stock_effect {
                            StockEffect::Deduct => balance += 1,
                            StockEffect::Restore => balance -= 1,
                            StockEffect::None => {}
                        }
                        order.apply(e);
                    }
                }
                prop_assert!(balance == 0 || balance == 1);
                prop_assert_eq!(order.inventory_applied, balance == 1);
            }
        }
    }
}
