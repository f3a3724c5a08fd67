use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pansoft_core::error::optional_text;
use pansoft_core::{Aggregate, AggregateRoot, DomainError, DomainResult, EmployeeId, MovementId};

use crate::movement::{Movement, MovementReference, MovementType, StockSubject};

/// Limits applied to every movement request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPolicy {
    /// Largest quantity a single movement may request.
    pub max_quantity: Decimal,
}

impl Default for StockPolicy {
    fn default() -> Self {
        Self {
            max_quantity: Decimal::from(100_000),
        }
    }
}

impl StockPolicy {
    /// Reject `quantity` above the per-movement maximum.
    pub fn check_quantity(&self, what: &str, quantity: Decimal) -> DomainResult<()> {
        if quantity > self.max_quantity {
            return Err(DomainError::validation(format!(
                "{what} {quantity} exceeds the maximum allowed ({})",
                self.max_quantity
            )));
        }
        Ok(())
    }
}

/// Aggregate root: the current stock of one product or supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    subject: StockSubject,
    quantity: Decimal,
    policy: StockPolicy,
    version: u64,
}

impl StockLevel {
    /// Load a stock level from its persisted projection.
    pub fn new(subject: StockSubject, quantity: Decimal, policy: StockPolicy) -> Self {
        Self {
            subject,
            quantity,
            policy,
            version: 0,
        }
    }

    pub fn subject(&self) -> StockSubject {
        self.subject
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }
}

impl AggregateRoot for StockLevel {
    type Id = StockSubject;

    fn id(&self) -> &Self::Id {
        &self.subject
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: record one stock movement.
///
/// `quantity` is interpreted per movement type: the amount moved for
/// `entrada`/`salida`/`devolucion`, the counted stock for `ajuste`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub movement_id: MovementId,
    pub subject: StockSubject,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub user_id: Option<EmployeeId>,
    pub reference: Option<MovementReference>,
    pub occurred_at: DateTime<Utc>,
}

impl RecordMovement {
    pub fn new(subject: StockSubject, movement_type: MovementType, quantity: Decimal) -> Self {
        Self {
            movement_id: MovementId::new(),
            subject,
            movement_type,
            quantity,
            reason: None,
            notes: None,
            user_id: None,
            reference: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn by_user(mut self, user_id: Option<EmployeeId>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_reference(mut self, reference: MovementReference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

impl Aggregate for StockLevel {
    type Command = RecordMovement;
    type Event = Movement;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        self.quantity = event.new_quantity;
        self.version += 1;
    }

    fn handle(&self, cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if cmd.subject != self.subject {
            return Err(DomainError::invariant("movement subject mismatch"));
        }
        if cmd.quantity < Decimal::ZERO {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        self.policy.check_quantity("quantity", cmd.quantity)?;

        let previous = self.quantity;
        let change = match cmd.movement_type {
            MovementType::Entrada | MovementType::Devolucion => {
                ensure_positive(cmd.quantity)?;
                cmd.quantity
            }
            MovementType::Salida => {
                ensure_positive(cmd.quantity)?;
                if cmd.quantity > previous {
                    return Err(DomainError::invariant(format!(
                        "insufficient stock for {}: available {}, requested {}",
                        self.subject, previous, cmd.quantity
                    )));
                }
                -cmd.quantity
            }
            MovementType::Ajuste => {
                let change = cmd.quantity - previous;
                if change.is_zero() {
                    return Err(DomainError::validation(format!(
                        "adjustment does not change stock (already {previous})"
                    )));
                }
                change
            }
        };

        Ok(vec![Movement {
            id: cmd.movement_id,
            subject: self.subject,
            movement_type: cmd.movement_type,
            quantity_change: change.normalize(),
            previous_quantity: previous.normalize(),
            new_quantity: (previous + change).normalize(),
            reason: optional_text(cmd.reason.clone()),
            notes: optional_text(cmd.notes.clone()),
            user_id: cmd.user_id,
            reference: cmd.reference,
            created_at: cmd.occurred_at,
        }])
    }
}

fn ensure_positive(quantity: Decimal) -> Result<(), DomainError> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation("quantity must be greater than zero"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pansoft_core::ProductId;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn level(quantity: Decimal) -> StockLevel {
        StockLevel::new(
            StockSubject::Product(ProductId::new()),
            quantity,
            StockPolicy::default(),
        )
    }

    fn record(level: &mut StockLevel, kind: MovementType, quantity: Decimal) -> Movement {
        let cmd = RecordMovement::new(level.subject(), kind, quantity);
        let events = level.handle(&cmd).unwrap();
        assert_eq!(events.len(), 1);
        level.apply(&events[0]);
        events.into_iter().next().unwrap()
    }

    #[test]
    fn entrada_adds_to_stock() {
        let mut stock = level(dec!(10));
        let m = record(&mut stock, MovementType::Entrada, dec!(2.5));
        assert_eq!(m.previous_quantity, dec!(10));
        assert_eq!(m.quantity_change, dec!(2.5));
        assert_eq!(m.new_quantity, dec!(12.5));
        assert_eq!(stock.quantity(), dec!(12.5));
        assert_eq!(stock.version(), 1);
    }

    #[test]
    fn salida_subtracts_and_records_negative_change() {
        let mut stock = level(dec!(10));
        let m = record(&mut stock, MovementType::Salida, dec!(4));
        assert_eq!(m.quantity_change, dec!(-4));
        assert_eq!(m.new_quantity, dec!(6));
        assert!(m.is_consistent());
    }

    #[test]
    fn salida_beyond_stock_is_rejected() {
        let stock = level(dec!(3));
        let cmd = RecordMovement::new(stock.subject(), MovementType::Salida, dec!(5));
        let err = stock.handle(&cmd).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) => assert!(msg.contains("insufficient stock")),
            other => panic!("expected insufficient stock, got {other:?}"),
        }
    }

    #[test]
    fn ajuste_sets_counted_stock() {
        let mut stock = level(dec!(10));
        let m = record(&mut stock, MovementType::Ajuste, dec!(7));
        assert_eq!(m.quantity_change, dec!(-3));
        assert_eq!(m.previous_quantity, dec!(10));
        assert_eq!(m.new_quantity, dec!(7));

        let m = record(&mut stock, MovementType::Ajuste, dec!(0));
        assert_eq!(m.quantity_change, dec!(-7));
        assert_eq!(stock.quantity(), Decimal::ZERO);
    }

    #[test]
    fn ajuste_to_current_stock_is_rejected() {
        let stock = level(dec!(10));
        let cmd = RecordMovement::new(stock.subject(), MovementType::Ajuste, dec!(10.00));
        assert!(matches!(stock.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        let stock = level(dec!(10));
        for kind in [MovementType::Entrada, MovementType::Salida, MovementType::Devolucion] {
            let cmd = RecordMovement::new(stock.subject(), kind, Decimal::ZERO);
            assert!(matches!(stock.handle(&cmd), Err(DomainError::Validation(_))));
        }
        let cmd = RecordMovement::new(stock.subject(), MovementType::Entrada, dec!(-1));
        assert!(matches!(stock.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn quantity_over_policy_maximum_is_rejected() {
        let stock = StockLevel::new(
            StockSubject::Product(ProductId::new()),
            Decimal::ZERO,
            StockPolicy {
                max_quantity: dec!(500),
            },
        );
        let cmd = RecordMovement::new(stock.subject(), MovementType::Entrada, dec!(500.01));
        match stock.handle(&cmd).unwrap_err() {
            DomainError::Validation(msg) => assert!(msg.contains("exceeds the maximum")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn subject_mismatch_is_rejected() {
        let stock = level(dec!(1));
        let cmd = RecordMovement::new(
            StockSubject::Product(ProductId::new()),
            MovementType::Entrada,
            dec!(1),
        );
        assert!(matches!(stock.handle(&cmd), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn blank_reason_is_dropped_and_metadata_kept() {
        let stock = level(dec!(1));
        let user = EmployeeId::new();
        let cmd = RecordMovement::new(stock.subject(), MovementType::Entrada, dec!(1))
            .with_reason("   ")
            .with_notes(Some("lote 42".into()))
            .by_user(Some(user));
        let m = stock.handle(&cmd).unwrap().remove(0);
        assert_eq!(m.reason, None);
        assert_eq!(m.notes.as_deref(), Some("lote 42"));
        assert_eq!(m.user_id, Some(user));
        assert_eq!(m.id, cmd.movement_id);
    }

    fn movement_type() -> impl Strategy<Value = MovementType> {
        prop::sample::select(MovementType::ALL.to_vec())
    }

    fn amount() -> impl Strategy<Value = Decimal> {
        (0i64..20_000).prop_map(|cents| Decimal::new(cents, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 500,
            ..ProptestConfig::default()
        })]

        /// Property: handle never mutates state.
        #[test]
        fn handle_does_not_mutate_state(
            kind in movement_type(),
            qty in amount(),
            start in amount(),
        ) {
            let stock = level(start);
            let before = stock.clone();
            let cmd = RecordMovement::new(stock.subject(), kind, qty);
            let first = stock.handle(&cmd);
            let second = stock.handle(&cmd);
            prop_assert_eq!(&before, &stock);
            prop_assert_eq!(first, second);
        }

        /// Property: every accepted movement is arithmetically consistent,
        /// non-zero, and never drives stock negative.
        #[test]
        fn accepted_movements_are_consistent(
            ops in prop::collection::vec((movement_type(), amount()), 1..60)
        ) {
            let mut stock = level(Decimal::ZERO);
            for (kind, qty) in ops {
                let cmd = RecordMovement::new(stock.subject(), kind, qty);
                if let Ok(events) = stock.handle(&cmd) {
                    for m in &events {
                        prop_assert!(m.is_consistent());
                        prop_assert!(!m.quantity_change.is_zero());
                        prop_assert!(m.new_quantity >= Decimal::ZERO);
                        prop_assert_eq!(m.previous_quantity, stock.quantity());
                        stock.apply(m);
                    }
                }
            }
        }
    }
}
