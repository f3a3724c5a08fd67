//! Multi-movement planning over preloaded stock levels.
//!
//! A store loads (and locks) every subject a write touches, feeds the current
//! quantities into a `MovementPlan`, records the commands in order, and then
//! persists `movements()` plus `final_levels()` in the same transaction. Any
//! rejected command aborts the whole plan.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use pansoft_core::{Aggregate, DomainError, DomainResult};

use crate::movement::{Movement, StockSubject};
use crate::stock::{RecordMovement, StockLevel, StockPolicy};

#[derive(Debug, Clone)]
pub struct MovementPlan {
    policy: StockPolicy,
    levels: BTreeMap<StockSubject, StockLevel>,
    /// `created_at` of each subject's latest movement.
    last_recorded: BTreeMap<StockSubject, DateTime<Utc>>,
    recorded_at: Option<DateTime<Utc>>,
    movements: Vec<Movement>,
}

impl MovementPlan {
    pub fn new(policy: StockPolicy) -> Self {
        Self {
            policy,
            levels: BTreeMap::new(),
            last_recorded: BTreeMap::new(),
            recorded_at: None,
            movements: Vec::new(),
        }
    }

    /// Record every movement at `now` instead of the command's own time.
    ///
    /// Stores pass the clock read after the stock rows are locked, so the
    /// ledger's `created_at` order matches commit order.
    pub fn stamped_at(mut self, now: DateTime<Utc>) -> Self {
        self.recorded_at = Some(now);
        self
    }

    /// Subjects referenced by `commands`, sorted and deduplicated.
    ///
    /// Stores lock rows in this order.
    pub fn subjects_of(commands: &[RecordMovement]) -> Vec<StockSubject> {
        let mut subjects: Vec<StockSubject> = commands.iter().map(|c| c.subject).collect();
        subjects.sort();
        subjects.dedup();
        subjects
    }

    /// Seed the current persisted stock of a subject.
    pub fn load(&mut self, subject: StockSubject, quantity: Decimal) {
        self.levels
            .insert(subject, StockLevel::new(subject, quantity, self.policy));
    }

    /// Like `load`, also seeding the time of the subject's latest movement.
    /// New movements are never stamped before it.
    pub fn load_with_last(
        &mut self,
        subject: StockSubject,
        quantity: Decimal,
        last_recorded_at: Option<DateTime<Utc>>,
    ) {
        self.load(subject, quantity);
        match last_recorded_at {
            Some(at) => self.last_recorded.insert(subject, at),
            None => self.last_recorded.remove(&subject),
        };
    }

    /// Decide and apply one movement.
    pub fn record(&mut self, cmd: &RecordMovement) -> DomainResult<&Movement> {
        let level = self
            .levels
            .get_mut(&cmd.subject)
            .ok_or_else(|| DomainError::not_found(format!("stock subject {}", cmd.subject)))?;

        let mut at = self.recorded_at.unwrap_or(cmd.occurred_at);
        if let Some(last) = self.last_recorded.get(&cmd.subject) {
            at = at.max(*last);
        }
        let cmd = cmd.clone().at(at);

        for movement in level.handle(&cmd)? {
            level.apply(&movement);
            self.last_recorded.insert(movement.subject, movement.created_at);
            self.movements.push(movement);
        }

        self.movements
            .last()
            .ok_or_else(|| DomainError::invariant("movement was not recorded"))
    }

    pub fn record_all(&mut self, commands: &[RecordMovement]) -> DomainResult<()> {
        for cmd in commands {
            self.record(cmd)?;
        }
        Ok(())
    }

    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    pub fn into_movements(self) -> Vec<Movement> {
        self.movements
    }

    /// Final quantity of every subject that received at least one movement.
    pub fn final_levels(&self) -> Vec<(StockSubject, Decimal)> {
        let mut touched: Vec<StockSubject> = self.movements.iter().map(|m| m.subject).collect();
        touched.sort();
        touched.dedup();
        touched
            .into_iter()
            .filter_map(|s| self.levels.get(&s).map(|l| (s, l.quantity())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::MovementType;
    use pansoft_core::{ProductId, SupplyId};
    use rust_decimal_macros::dec;

    #[test]
    fn movements_on_the_same_subject_chain() {
        let flour = StockSubject::Supply(SupplyId::new());
        let mut plan = MovementPlan::new(StockPolicy::default());
        plan.load(flour, dec!(10));

        plan.record_all(&[
            RecordMovement::new(flour, MovementType::Salida, dec!(3)),
            RecordMovement::new(flour, MovementType::Salida, dec!(2)),
        ])
        .unwrap();

        let ms = plan.movements();
        assert_eq!(ms.len(), 2);
        assert_eq!(ms[0].new_quantity, dec!(7));
        assert_eq!(ms[1].previous_quantity, dec!(7));
        assert_eq!(ms[1].new_quantity, dec!(5));
        assert_eq!(plan.final_levels(), vec![(flour, dec!(5))]);
    }

    #[test]
    fn unloaded_subject_is_not_found() {
        let mut plan = MovementPlan::new(StockPolicy::default());
        let cmd = RecordMovement::new(
            StockSubject::Product(ProductId::new()),
            MovementType::Entrada,
            dec!(1),
        );
        assert!(matches!(plan.record(&cmd), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn rejection_stops_the_plan() {
        let bread = StockSubject::Product(ProductId::new());
        let mut plan = MovementPlan::new(StockPolicy::default());
        plan.load(bread, dec!(2));

        let err = plan
            .record_all(&[
                RecordMovement::new(bread, MovementType::Salida, dec!(2)),
                RecordMovement::new(bread, MovementType::Salida, dec!(1)),
            ])
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn stamped_plan_ignores_the_command_time() {
        let bread = StockSubject::Product(ProductId::new());
        let now = Utc::now();
        let mut plan = MovementPlan::new(StockPolicy::default()).stamped_at(now);
        plan.load(bread, dec!(0));

        let stale = RecordMovement::new(bread, MovementType::Entrada, dec!(4))
            .at(now - chrono::Duration::seconds(30));
        assert_eq!(plan.record(&stale).unwrap().created_at, now);
    }

    #[test]
    fn movements_never_predate_the_subject_latest() {
        let bread = StockSubject::Product(ProductId::new());
        let now = Utc::now();
        // Another writer's clock ran ahead of ours.
        let latest = now + chrono::Duration::seconds(5);
        let mut plan = MovementPlan::new(StockPolicy::default()).stamped_at(now);
        plan.load_with_last(bread, dec!(10), Some(latest));

        plan.record_all(&[
            RecordMovement::new(bread, MovementType::Salida, dec!(4)),
            RecordMovement::new(bread, MovementType::Salida, dec!(1)),
        ])
        .unwrap();

        let ms = plan.movements();
        assert!(ms.iter().all(|m| m.created_at == latest));
    }

    #[test]
    fn subjects_are_sorted_and_unique() {
        let a = StockSubject::Product(ProductId::new());
        let b = StockSubject::Supply(SupplyId::new());
        let cmds = vec![
            RecordMovement::new(b, MovementType::Entrada, dec!(1)),
            RecordMovement::new(a, MovementType::Entrada, dec!(1)),
            RecordMovement::new(b, MovementType::Entrada, dec!(1)),
        ];
        let subjects = MovementPlan::subjects_of(&cmds);
        assert_eq!(subjects.len(), 2);
        assert!(subjects.windows(2).all(|w| w[0] < w[1]));
    }
}
