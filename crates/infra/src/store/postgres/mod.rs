//! Postgres-backed store.
//!
//! ## Atomicity
//!
//! Every write that moves stock runs in one transaction: the stock rows are
//! locked with `SELECT ... FOR UPDATE` in `StockSubject` order (so concurrent
//! writers cannot deadlock), the movements are decided by a `MovementPlan`
//! over the locked quantities, and the ledger rows plus projections are
//! written before commit. Any failure rolls everything back.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |----------------------|------------|----------|
//! | `23505` | `Duplicate` | unique sku / name / email |
//! | `23503` | `Domain(Validation)` | reference to a missing row |
//! | `23514` | `Domain(Validation)` | check constraint (e.g. negative stock) |
//! | other | `Database` | connection failures, pool closed, etc. |

use std::sync::Arc;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::{info, instrument};

use pansoft_core::DomainError;
use pansoft_inventory::StockPolicy;

use super::{StoreError, StoreResult};

mod catalog;
mod ledger;
mod orders;
mod parties;
pub mod schema;

/// Postgres implementation of every store trait.
///
/// `Send + Sync`; clones share the same pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
    policy: StockPolicy,
}

impl PostgresStore {
    pub fn new(pool: PgPool, policy: StockPolicy) -> Self {
        Self {
            pool: Arc::new(pool),
            policy,
        }
    }

    /// Connect and bootstrap the schema.
    #[instrument(skip(database_url, policy), err)]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        policy: StockPolicy,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self::new(pool, policy);
        store.bootstrap().await?;
        info!(max_connections, "postgres store ready");
        Ok(store)
    }

    /// Run the idempotent schema statements.
    #[instrument(skip(self), err)]
    pub async fn bootstrap(&self) -> StoreResult<()> {
        for statement in schema::BOOTSTRAP {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("bootstrap", e))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map SQLx errors to `StoreError`.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => {
                    StoreError::Duplicate(duplicate_message(db_err.constraint()).to_string())
                }
                Some("23503") => StoreError::Domain(DomainError::validation(format!(
                    "referenced record does not exist ({})",
                    db_err.constraint().unwrap_or("foreign key")
                ))),
                Some("23514") => StoreError::Domain(DomainError::validation(format!(
                    "value rejected by {}",
                    db_err.constraint().unwrap_or("check constraint")
                ))),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Database(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn duplicate_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("products_sku_key") => "a product with this sku already exists",
        Some("supplies_name_key") => "a supply with this name already exists",
        Some("suppliers_name_key") => "a supplier with this name already exists",
        Some("employees_email_key") => "an employee with this email already exists",
        _ => "record already exists",
    }
}

/// Map a row decoding failure.
pub(crate) fn decode_error(what: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Database(format!("failed to decode {what}: {err}"))
}

/// Read one column, mapping decode failures.
pub(crate) fn col<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(|e| decode_error(name, e))
}
