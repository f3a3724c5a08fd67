//! Ledger maintenance for legacy data.
//!
//! The regular write path cannot produce drift, but databases populated by
//! older releases may hold corrupt `quantity_change` values or projections
//! that disagree with the ledger. `audit_ledger` reports them and
//! `repair_ledger` applies the automatic fixes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use pansoft_inventory::{LedgerAudit, LedgerRepair, SubjectKind, audit_subject, plan_repairs};

use crate::store::{LedgerStore, StoreResult};

/// Outcome of a repair run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub kind: SubjectKind,
    pub subjects_audited: usize,
    pub repairs: Vec<LedgerRepair>,
    /// Audits that still carry issues needing a manual decision.
    pub unresolved: Vec<LedgerAudit>,
}

/// Audit every subject of `kind`; only subjects with issues are returned.
#[instrument(skip(store), err)]
pub async fn audit_ledger<S>(store: &S, kind: SubjectKind) -> StoreResult<Vec<LedgerAudit>>
where
    S: LedgerStore + ?Sized,
{
    let snapshot = store.ledger_snapshot(kind).await?;
    let subjects = snapshot.len();

    let audits: Vec<LedgerAudit> = snapshot
        .iter()
        .map(|ledger| audit_subject(ledger.subject, ledger.projected, &ledger.movements))
        .filter(|audit| !audit.is_clean())
        .collect();

    info!(subjects, with_issues = audits.len(), "ledger audited");
    Ok(audits)
}

/// Audit `kind` and apply every automatic repair in one atomic batch.
#[instrument(skip(store), err)]
pub async fn repair_ledger<S>(
    store: &S,
    kind: SubjectKind,
    now: DateTime<Utc>,
) -> StoreResult<RepairReport>
where
    S: LedgerStore + ?Sized,
{
    let snapshot = store.ledger_snapshot(kind).await?;
    let subjects_audited = snapshot.len();

    let mut repairs = Vec::new();
    let mut unresolved = Vec::new();
    for ledger in &snapshot {
        let audit = audit_subject(ledger.subject, ledger.projected, &ledger.movements);
        if audit.is_clean() {
            continue;
        }
        let planned = plan_repairs(&audit, now);
        // Issues without a repair (broken chains, negative stock) stay reported.
        if planned.len() < audit.issues.len() {
            warn!(
                subject = %audit.subject,
                issues = audit.issues.len(),
                "ledger issues need manual review"
            );
            unresolved.push(audit);
        }
        repairs.extend(planned);
    }

    if !repairs.is_empty() {
        store.apply_repairs(&repairs).await?;
    }

    info!(
        subjects_audited,
        repairs = repairs.len(),
        unresolved = unresolved.len(),
        "ledger repaired"
    );
    Ok(RepairReport {
        kind,
        subjects_audited,
        repairs,
        unresolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn clean_store_needs_no_repairs() {
        let store = MemoryStore::default();
        assert!(audit_ledger(&store, SubjectKind::Product).await.unwrap().is_empty());

        let report = repair_ledger(&store, SubjectKind::Supply, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.subjects_audited, 0);
        assert!(report.repairs.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "supply");
        assert_eq!(json["repairs"], serde_json::json!([]));
    }
}
