use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use pansoft_core::{DomainError, EmployeeId, MovementId, ProductId, SupplyId};
use pansoft_inventory::{
    LedgerRepair, Movement, MovementPlan, MovementReference, MovementType, RecordMovement,
    StockPolicy, StockSubject, SubjectKind,
};

use super::{PostgresStore, col, decode_error, map_sqlx_error};
use crate::store::{
    LedgerStore, MovementPage, MovementQuery, MovementView, StoreError, StoreResult,
    SubjectLedger,
};

pub(super) const MOVEMENT_COLUMNS: &str = "m.id, m.product_id, m.supply_id, m.movement_type, \
     m.quantity_change, m.previous_quantity, m.new_quantity, m.reason, m.notes, m.user_id, \
     m.reference_type, m.reference_id, m.created_at";

fn table(kind: SubjectKind) -> &'static str {
    match kind {
        SubjectKind::Product => "products",
        SubjectKind::Supply => "supplies",
    }
}

fn subject_column(kind: SubjectKind) -> &'static str {
    match kind {
        SubjectKind::Product => "product_id",
        SubjectKind::Supply => "supply_id",
    }
}

/// Lock a stock row for the rest of the transaction and read its quantity.
pub(super) async fn lock_stock(
    tx: &mut Transaction<'_, Postgres>,
    subject: StockSubject,
) -> StoreResult<Decimal> {
    let sql = format!(
        "SELECT quantity FROM {} WHERE id = $1 FOR UPDATE",
        table(subject.kind())
    );
    let row = sqlx::query(&sql)
        .bind(subject.uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_stock", e))?;

    match row {
        Some(row) => col(&row, "quantity"),
        None => Err(StoreError::NotFound(format!(
            "{} {}",
            subject.kind().as_str(),
            subject.uuid()
        ))),
    }
}

/// `created_at` of the subject's latest movement, if any.
async fn last_recorded_at(
    tx: &mut Transaction<'_, Postgres>,
    subject: StockSubject,
) -> StoreResult<Option<DateTime<Utc>>> {
    let sql = format!(
        "SELECT MAX(created_at) FROM inventory_movements WHERE {} = $1",
        subject_column(subject.kind())
    );
    sqlx::query_scalar(&sql)
        .bind(subject.uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("last_recorded_at", e))
}

async fn write_stock(
    tx: &mut Transaction<'_, Postgres>,
    subject: StockSubject,
    quantity: Decimal,
) -> StoreResult<()> {
    let sql = format!(
        "UPDATE {} SET quantity = $2, updated_at = now() WHERE id = $1",
        table(subject.kind())
    );
    sqlx::query(&sql)
        .bind(subject.uuid())
        .bind(quantity)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("write_stock", e))?;
    Ok(())
}

async fn insert_movement(tx: &mut Transaction<'_, Postgres>, m: &Movement) -> StoreResult<()> {
    let (product_id, supply_id): (Option<Uuid>, Option<Uuid>) = match m.subject {
        StockSubject::Product(id) => (Some(*id.as_uuid()), None),
        StockSubject::Supply(id) => (None, Some(*id.as_uuid())),
    };

    sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id,
            product_id,
            supply_id,
            movement_type,
            quantity_change,
            previous_quantity,
            new_quantity,
            reason,
            notes,
            user_id,
            reference_type,
            reference_id,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(m.id.as_uuid())
    .bind(product_id)
    .bind(supply_id)
    .bind(m.movement_type.as_str())
    .bind(m.quantity_change)
    .bind(m.previous_quantity)
    .bind(m.new_quantity)
    .bind(m.reason.as_deref())
    .bind(m.notes.as_deref())
    .bind(m.user_id.map(Uuid::from))
    .bind(m.reference.map(|r| r.kind_str()))
    .bind(m.reference.map(|r| r.uuid()))
    .bind(m.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;
    Ok(())
}

/// Lock, decide, and persist a batch of movements inside `tx`.
pub(super) async fn record_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    policy: StockPolicy,
    commands: &[RecordMovement],
) -> StoreResult<Vec<Movement>> {
    if commands.is_empty() {
        return Ok(Vec::new());
    }

    let mut locked = Vec::new();
    for subject in MovementPlan::subjects_of(commands) {
        let quantity = lock_stock(tx, subject).await?;
        let last = last_recorded_at(tx, subject).await?;
        locked.push((subject, quantity, last));
    }

    // Stamped only once every row is locked, so `created_at` follows commit order.
    let mut plan = MovementPlan::new(policy).stamped_at(Utc::now());
    for (subject, quantity, last) in locked {
        plan.load_with_last(subject, quantity, last);
    }
    plan.record_all(commands)?;

    for m in plan.movements() {
        insert_movement(tx, m).await?;
    }
    for (subject, quantity) in plan.final_levels() {
        write_stock(tx, subject, quantity).await?;
    }

    let movements = plan.into_movements();
    for m in &movements {
        info!(
            subject = %m.subject,
            movement_type = %m.movement_type,
            quantity_change = %m.quantity_change,
            new_quantity = %m.new_quantity,
            "movement recorded"
        );
    }
    Ok(movements)
}

pub(super) fn movement_from_row(row: &PgRow) -> StoreResult<Movement> {
    let product_id: Option<Uuid> = col(row, "product_id")?;
    let supply_id: Option<Uuid> = col(row, "supply_id")?;
    let subject = match (product_id, supply_id) {
        (Some(id), None) => StockSubject::Product(ProductId::from_uuid(id)),
        (None, Some(id)) => StockSubject::Supply(SupplyId::from_uuid(id)),
        _ => {
            return Err(decode_error(
                "movement",
                "expected exactly one of product_id / supply_id",
            ));
        }
    };

    let movement_type = col::<String>(row, "movement_type")?
        .parse::<MovementType>()
        .map_err(|e| decode_error("movement_type", e))?;

    let reference_type: Option<String> = col(row, "reference_type")?;
    let reference_id: Option<Uuid> = col(row, "reference_id")?;
    let reference = match (reference_type, reference_id) {
        (Some(kind), Some(id)) => MovementReference::from_parts(&kind, id),
        _ => None,
    };

    Ok(Movement {
        id: MovementId::from_uuid(col(row, "id")?),
        subject,
        movement_type,
        quantity_change: col(row, "quantity_change")?,
        previous_quantity: col(row, "previous_quantity")?,
        new_quantity: col(row, "new_quantity")?,
        reason: col(row, "reason")?,
        notes: col(row, "notes")?,
        user_id: col::<Option<Uuid>>(row, "user_id")?.map(EmployeeId::from_uuid),
        reference,
        created_at: col(row, "created_at")?,
    })
}

#[async_trait]
impl LedgerStore for PostgresStore {
    #[instrument(skip(self, commands), fields(command_count = commands.len()), err)]
    async fn record_movements(&self, commands: Vec<RecordMovement>) -> StoreResult<Vec<Movement>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let movements = match record_in_tx(&mut tx, self.policy, &commands).await {
            Ok(m) => m,
            Err(e) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(e);
            }
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(movements)
    }

    #[instrument(skip(self), err)]
    async fn list_movements(&self, query: MovementQuery) -> StoreResult<MovementPage> {
        let kind = query.kind.map(|k| k.as_str());
        let subject = query.subject.map(|s| s.uuid());
        let movement_type = query.movement_type.map(|t| t.as_str());

        const FILTER: &str = r#"
            WHERE ($1::text IS NULL
                    OR ($1 = 'product' AND m.product_id IS NOT NULL)
                    OR ($1 = 'supply' AND m.supply_id IS NOT NULL))
                AND ($2::uuid IS NULL OR m.product_id = $2 OR m.supply_id = $2)
                AND ($3::text IS NULL
                    OR m.movement_type = $3
                    OR ($3 = 'devolucion' AND m.movement_type = 'devolución'))
        "#;

        let count_sql = format!("SELECT COUNT(*) AS total FROM inventory_movements m {FILTER}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(kind)
            .bind(subject)
            .bind(movement_type)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let page_sql = format!(
            r#"
            SELECT {MOVEMENT_COLUMNS},
                COALESCE(p.name, s.name, '') AS subject_name,
                p.sku AS sku,
                s.unit AS unit,
                e.full_name AS user_name
            FROM inventory_movements m
            LEFT JOIN products p ON p.id = m.product_id
            LEFT JOIN supplies s ON s.id = m.supply_id
            LEFT JOIN employees e ON e.id = m.user_id
            {FILTER}
            ORDER BY m.created_at DESC, m.seq DESC
            LIMIT $4 OFFSET $5
            "#
        );
        let rows = sqlx::query(&page_sql)
            .bind(kind)
            .bind(subject)
            .bind(movement_type)
            .bind(query.limit as i64)
            .bind(query.offset as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_movements", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(MovementView {
                movement: movement_from_row(row)?,
                subject_name: col(row, "subject_name")?,
                sku: col(row, "sku")?,
                unit: col(row, "unit")?,
                user_name: col(row, "user_name")?,
            });
        }

        Ok(MovementPage {
            items,
            total: total as u64,
        })
    }

    #[instrument(skip(self), err)]
    async fn ledger_snapshot(&self, kind: SubjectKind) -> StoreResult<Vec<SubjectLedger>> {
        let subjects_sql = format!("SELECT id, quantity FROM {} ORDER BY id", table(kind));
        let subject_rows = sqlx::query(&subjects_sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ledger_subjects", e))?;

        let mut ledgers: BTreeMap<StockSubject, SubjectLedger> = BTreeMap::new();
        for row in &subject_rows {
            let subject = StockSubject::from_parts(kind, col(row, "id")?);
            ledgers.insert(
                subject,
                SubjectLedger {
                    subject,
                    projected: col(row, "quantity")?,
                    movements: Vec::new(),
                },
            );
        }

        let column = subject_column(kind);
        let movement_rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements m \
             WHERE m.{column} IS NOT NULL ORDER BY m.{column}, m.created_at, m.seq"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ledger_movements", e))?;

        for row in &movement_rows {
            let m = movement_from_row(row)?;
            if let Some(ledger) = ledgers.get_mut(&m.subject) {
                ledger.movements.push(m);
            }
        }

        Ok(ledgers.into_values().collect())
    }

    #[instrument(skip(self, repairs), fields(repair_count = repairs.len()), err)]
    async fn apply_repairs(&self, repairs: &[LedgerRepair]) -> StoreResult<usize> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for repair in repairs {
            match repair {
                LedgerRepair::RecomputeChange {
                    movement_id,
                    quantity_change,
                } => {
                    let result = sqlx::query(
                        "UPDATE inventory_movements SET quantity_change = $2 WHERE id = $1",
                    )
                    .bind(movement_id.as_uuid())
                    .bind(*quantity_change)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("recompute_change", e))?;
                    if result.rows_affected() == 0 {
                        return Err(StoreError::NotFound(format!("movement {movement_id}")));
                    }
                }
                LedgerRepair::ResyncProjection {
                    subject,
                    projected,
                    quantity,
                } => {
                    let current = lock_stock(&mut tx, *subject).await?;
                    if current != *projected {
                        return Err(DomainError::conflict(format!(
                            "stock of {subject} changed since the audit"
                        ))
                        .into());
                    }
                    write_stock(&mut tx, *subject, *quantity).await?;
                }
                LedgerRepair::OpeningAdjustment { movement } => {
                    let current = lock_stock(&mut tx, movement.subject).await?;
                    let column = subject_column(movement.subject.kind());
                    let has_movements: bool = sqlx::query_scalar(&format!(
                        "SELECT EXISTS (SELECT 1 FROM inventory_movements WHERE {column} = $1)"
                    ))
                    .bind(movement.subject.uuid())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("opening_adjustment", e))?;

                    if current != movement.new_quantity || has_movements {
                        return Err(DomainError::conflict(format!(
                            "ledger of {} changed since the audit",
                            movement.subject
                        ))
                        .into());
                    }
                    insert_movement(&mut tx, movement).await?;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        info!(repairs = repairs.len(), "ledger repairs applied");
        Ok(repairs.len())
    }
}
