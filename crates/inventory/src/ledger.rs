//! Ledger replay, audit and repair planning.
//!
//! The ledger is the source of truth: a subject's stock must equal the
//! `new_quantity` of its latest movement, and the movements ordered by
//! `created_at` must chain (`previous_quantity` of each equals `new_quantity`
//! of the one before). Audits detect where legacy data breaks this; repairs
//! bring the derived columns back in line without deleting history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use pansoft_core::MovementId;

use crate::movement::{Movement, MovementType, StockSubject};

/// Reason recorded on the opening adjustment appended for unrecorded stock.
pub const OPENING_ADJUSTMENT_REASON: &str = "regularización de inventario";

/// Final stock obtained by applying `movements` in order from `opening`.
pub fn replay<'a>(opening: Decimal, movements: impl IntoIterator<Item = &'a Movement>) -> Decimal {
    movements
        .into_iter()
        .fold(opening, |acc, m| acc + m.quantity_change)
}

/// A single inconsistency found while auditing one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum LedgerIssue {
    /// `quantity_change` was stored as zero although the stock moved.
    ZeroChange {
        movement_id: MovementId,
        expected_change: Decimal,
    },
    /// `quantity_change != new_quantity - previous_quantity`.
    ArithmeticMismatch {
        movement_id: MovementId,
        recorded_change: Decimal,
        expected_change: Decimal,
    },
    /// The movement does not start where the previous one ended.
    BrokenChain {
        movement_id: MovementId,
        expected_previous: Decimal,
        found_previous: Decimal,
    },
    /// A movement left the stock below zero.
    NegativeStock {
        movement_id: MovementId,
        new_quantity: Decimal,
    },
    /// The stock projection disagrees with the latest movement.
    ProjectionDrift { projected: Decimal, ledger: Decimal },
    /// The subject holds stock but has no movements at all.
    UnrecordedStock { projected: Decimal },
}

/// Audit result for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerAudit {
    pub subject: StockSubject,
    /// Stock before the first movement (non-zero only for seeded data).
    pub opening_quantity: Decimal,
    /// `new_quantity` of the latest movement (or the opening when empty).
    pub ledger_quantity: Decimal,
    /// Current value of the stock projection.
    pub projected_quantity: Decimal,
    pub movement_count: usize,
    pub issues: Vec<LedgerIssue>,
}

impl LedgerAudit {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Audit one subject's movements (oldest first) against its projection.
pub fn audit_subject(
    subject: StockSubject,
    projected: Decimal,
    movements: &[Movement],
) -> LedgerAudit {
    let opening = movements
        .first()
        .map(|m| m.previous_quantity)
        .unwrap_or(Decimal::ZERO);

    let mut issues = Vec::new();
    let mut running = opening;

    for m in movements {
        let expected_change = m.new_quantity - m.previous_quantity;
        if m.quantity_change != expected_change {
            if m.quantity_change.is_zero() {
                issues.push(LedgerIssue::ZeroChange {
                    movement_id: m.id,
                    expected_change,
                });
            } else {
                issues.push(LedgerIssue::ArithmeticMismatch {
                    movement_id: m.id,
                    recorded_change: m.quantity_change,
                    expected_change,
                });
            }
        }

        if m.previous_quantity != running {
            issues.push(LedgerIssue::BrokenChain {
                movement_id: m.id,
                expected_previous: running,
                found_previous: m.previous_quantity,
            });
        }

        if m.new_quantity < Decimal::ZERO {
            issues.push(LedgerIssue::NegativeStock {
                movement_id: m.id,
                new_quantity: m.new_quantity,
            });
        }

        // Follow the recorded quantities, so one broken link is reported once.
        running = m.new_quantity;
    }

    let ledger_quantity = running;
    if movements.is_empty() {
        if !projected.is_zero() {
            issues.push(LedgerIssue::UnrecordedStock { projected });
        }
    } else if projected != ledger_quantity {
        issues.push(LedgerIssue::ProjectionDrift {
            projected,
            ledger: ledger_quantity,
        });
    }

    LedgerAudit {
        subject,
        opening_quantity: opening,
        ledger_quantity,
        projected_quantity: projected,
        movement_count: movements.len(),
        issues,
    }
}

/// A corrective write derived from an audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "repair", rename_all = "snake_case")]
pub enum LedgerRepair {
    /// Rewrite the derived `quantity_change` column of a corrupt row.
    RecomputeChange {
        movement_id: MovementId,
        quantity_change: Decimal,
    },
    /// Set the stock projection to the ledger's final value. `projected` is
    /// the stale value the audit saw; stores only overwrite that value.
    ResyncProjection {
        subject: StockSubject,
        projected: Decimal,
        quantity: Decimal,
    },
    /// Append an `ajuste` from zero so unrecorded stock enters the ledger.
    OpeningAdjustment { movement: Movement },
}

/// Repairs for one audit. Chain breaks and negative stock are reported but
/// need a human decision, so they produce no repair.
pub fn plan_repairs(audit: &LedgerAudit, now: DateTime<Utc>) -> Vec<LedgerRepair> {
    let mut repairs = Vec::new();

    for issue in &audit.issues {
        match issue {
            LedgerIssue::ZeroChange {
                movement_id,
                expected_change,
            }
            | LedgerIssue::ArithmeticMismatch {
                movement_id,
                expected_change,
                ..
            } => repairs.push(LedgerRepair::RecomputeChange {
                movement_id: *movement_id,
                quantity_change: *expected_change,
            }),
            LedgerIssue::ProjectionDrift { projected, ledger } => {
                repairs.push(LedgerRepair::ResyncProjection {
                    subject: audit.subject,
                    projected: *projected,
                    quantity: *ledger,
                })
            }
            LedgerIssue::UnrecordedStock { projected } => {
                repairs.push(LedgerRepair::OpeningAdjustment {
                    movement: Movement {
                        id: MovementId::new(),
                        subject: audit.subject,
                        movement_type: MovementType::Ajuste,
                        quantity_change: *projected,
                        previous_quantity: Decimal::ZERO,
                        new_quantity: *projected,
                        reason: Some(OPENING_ADJUSTMENT_REASON.to_string()),
                        notes: None,
                        user_id: None,
                        reference: None,
                        created_at: now,
                    },
                })
            }
            LedgerIssue::BrokenChain { .. } | LedgerIssue::NegativeStock { .. } => {}
        }
    }

    repairs
}
