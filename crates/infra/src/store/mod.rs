//! Persistence boundary.
//!
//! Every write that touches stock goes through a `MovementPlan` inside a
//! single atomic unit (one lock in memory, one transaction in Postgres), so
//! the ledger and the stock projections never diverge.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use pansoft_core::{
    DomainError, EmployeeId, ProductId, ProductionOrderId, SalesOrderId, SupplierId, SupplyId,
};
use pansoft_inventory::{
    LedgerRepair, Movement, MovementType, RecordMovement, StockPolicy, StockSubject, SubjectKind,
};
use pansoft_parties::{
    Employee, EmployeeUpdate, NewEmployee, NewSupplier, Supplier, SupplierUpdate,
};
use pansoft_production::{ChangeProductionOrderStatus, NewProductionOrder, ProductionOrder};
use pansoft_products::{NewProduct, NewSupply, Product, ProductUpdate, Supply, SupplyUpdate};
use pansoft_sales::{ChangeSalesOrderStatus, NewSalesOrder, SalesOrder, SalesOrderStatus};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Reason recorded on the movement created for a product's or supply's
/// initial stock.
pub const OPENING_STOCK_REASON: &str = "stock inicial";

/// Store operation error.
///
/// Domain rejections pass through unchanged; everything else is an
/// infrastructure failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Listing filter shared by products and supplies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub include_inactive: bool,
    pub low_stock_only: bool,
}

/// Movement history query. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementQuery {
    pub kind: Option<SubjectKind>,
    pub subject: Option<StockSubject>,
    pub movement_type: Option<MovementType>,
    pub limit: u32,
    pub offset: u32,
}

impl MovementQuery {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn for_kind(kind: SubjectKind) -> Self {
        Self {
            kind: Some(kind),
            subject: None,
            movement_type: None,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn for_subject(subject: StockSubject) -> Self {
        Self {
            subject: Some(subject),
            ..Self::for_kind(subject.kind())
        }
    }

    /// Clamp a requested limit into `[1, MAX_LIMIT]`.
    pub fn with_limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        self
    }

    pub fn with_offset(mut self, offset: Option<u32>) -> Self {
        self.offset = offset.unwrap_or(0);
        self
    }

    pub fn with_type(mut self, movement_type: Option<MovementType>) -> Self {
        self.movement_type = movement_type;
        self
    }

    pub(crate) fn matches(&self, m: &Movement) -> bool {
        self.kind.is_none_or(|k| m.subject.kind() == k)
            && self.subject.is_none_or(|s| m.subject == s)
            && self.movement_type.is_none_or(|t| m.movement_type == t)
    }
}

/// A movement joined with the names the history screens display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementView {
    pub movement: Movement,
    /// Product or supply name.
    pub subject_name: String,
    /// Product sku (products only).
    pub sku: Option<String>,
    /// Supply unit (supplies only).
    pub unit: Option<String>,
    /// Full name of the employee who recorded it.
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementPage {
    pub items: Vec<MovementView>,
    pub total: u64,
}

/// One subject's projection and its full ledger, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectLedger {
    pub subject: StockSubject,
    pub projected: Decimal,
    pub movements: Vec<Movement>,
}

/// Result of an order status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange<T> {
    pub order: T,
    pub movements: Vec<Movement>,
}

impl<T> StatusChange<T> {
    pub fn inventory_updated(&self) -> bool {
        !self.movements.is_empty()
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Create a product; a positive initial quantity is recorded as an
    /// opening `entrada` in the same atomic unit.
    async fn create_product(
        &self,
        input: NewProduct,
        user_id: Option<EmployeeId>,
    ) -> StoreResult<(Product, Option<Movement>)>;
    async fn get_product(&self, id: ProductId) -> StoreResult<Product>;
    async fn list_products(&self, filter: CatalogFilter) -> StoreResult<Vec<Product>>;
    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> StoreResult<Product>;
    async fn deactivate_product(&self, id: ProductId) -> StoreResult<Product>;

    async fn create_supply(
        &self,
        input: NewSupply,
        user_id: Option<EmployeeId>,
    ) -> StoreResult<(Supply, Option<Movement>)>;
    async fn get_supply(&self, id: SupplyId) -> StoreResult<Supply>;
    async fn list_supplies(&self, filter: CatalogFilter) -> StoreResult<Vec<Supply>>;
    async fn update_supply(&self, id: SupplyId, update: SupplyUpdate) -> StoreResult<Supply>;
    async fn deactivate_supply(&self, id: SupplyId) -> StoreResult<Supply>;
}

#[async_trait]
pub trait PartyStore: Send + Sync {
    async fn create_supplier(&self, input: NewSupplier) -> StoreResult<Supplier>;
    async fn get_supplier(&self, id: SupplierId) -> StoreResult<Supplier>;
    async fn list_suppliers(&self) -> StoreResult<Vec<Supplier>>;
    async fn update_supplier(&self, id: SupplierId, update: SupplierUpdate)
    -> StoreResult<Supplier>;
    /// Hard delete; supplies referencing the supplier are detached.
    async fn delete_supplier(&self, id: SupplierId) -> StoreResult<()>;

    async fn create_employee(&self, input: NewEmployee) -> StoreResult<Employee>;
    async fn get_employee(&self, id: EmployeeId) -> StoreResult<Employee>;
    async fn list_employees(&self, include_inactive: bool) -> StoreResult<Vec<Employee>>;
    async fn update_employee(&self, id: EmployeeId, update: EmployeeUpdate)
    -> StoreResult<Employee>;
    async fn deactivate_employee(&self, id: EmployeeId) -> StoreResult<Employee>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Record a batch of movements atomically; any rejection aborts all.
    async fn record_movements(&self, commands: Vec<RecordMovement>) -> StoreResult<Vec<Movement>>;
    async fn list_movements(&self, query: MovementQuery) -> StoreResult<MovementPage>;
    /// Every subject of `kind` with its projection and ascending ledger.
    async fn ledger_snapshot(&self, kind: SubjectKind) -> StoreResult<Vec<SubjectLedger>>;
    /// Apply repairs atomically. A repair whose precondition no longer holds
    /// (stock moved since the audit) fails the batch with a conflict.
    async fn apply_repairs(&self, repairs: &[LedgerRepair]) -> StoreResult<usize>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_sales_order(&self, input: NewSalesOrder) -> StoreResult<SalesOrder>;
    async fn get_sales_order(&self, id: SalesOrderId) -> StoreResult<SalesOrder>;
    async fn list_sales_orders(
        &self,
        status: Option<SalesOrderStatus>,
    ) -> StoreResult<Vec<SalesOrder>>;
    /// Change status and record the stock cascade in one atomic unit.
    async fn change_sales_order_status(
        &self,
        cmd: ChangeSalesOrderStatus,
    ) -> StoreResult<StatusChange<SalesOrder>>;

    async fn create_production_order(
        &self,
        input: NewProductionOrder,
    ) -> StoreResult<ProductionOrder>;
    async fn get_production_order(&self, id: ProductionOrderId) -> StoreResult<ProductionOrder>;
    async fn list_production_orders(&self) -> StoreResult<Vec<ProductionOrder>>;
    async fn change_production_order_status(
        &self,
        cmd: ChangeProductionOrderStatus,
    ) -> StoreResult<StatusChange<ProductionOrder>>;
}

/// Everything the API needs from persistence.
pub trait Store: CatalogStore + PartyStore + LedgerStore + OrderStore {}

impl<T> Store for T where T: CatalogStore + PartyStore + LedgerStore + OrderStore {}

pub(crate) fn opening_entry(
    subject: StockSubject,
    quantity: Decimal,
    user_id: Option<EmployeeId>,
    now: DateTime<Utc>,
) -> Option<RecordMovement> {
    (quantity > Decimal::ZERO).then(|| {
        RecordMovement::new(subject, MovementType::Entrada, quantity)
            .with_reason(OPENING_STOCK_REASON)
            .by_user(user_id)
            .at(now)
    })
}

/// Every quantity an order will move must fit one movement, so its cascade
/// can always be recorded.
pub(crate) fn check_sales_order(policy: StockPolicy, order: &SalesOrder) -> StoreResult<()> {
    for line in &order.lines {
        policy.check_quantity(&format!("line {}: quantity", line.line_no), line.quantity)?;
    }
    Ok(())
}

pub(crate) fn check_production_order(
    policy: StockPolicy,
    order: &ProductionOrder,
) -> StoreResult<()> {
    policy.check_quantity("quantity to produce", order.quantity)?;
    for usage in &order.supplies {
        policy.check_quantity(&format!("supply {}: quantity", usage.supply_id), usage.quantity)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        let q = MovementQuery::for_kind(SubjectKind::Product);
        assert_eq!(q.clone().with_limit(None).limit, 50);
        assert_eq!(q.clone().with_limit(Some(0)).limit, 1);
        assert_eq!(q.with_limit(Some(10_000)).limit, 500);
    }

    #[test]
    fn order_quantities_are_capped_by_the_policy() {
        let policy = StockPolicy {
            max_quantity: Decimal::from(50),
        };
        let order = NewSalesOrder {
            customer_name: "Hotel Plaza".into(),
            lines: vec![pansoft_sales::NewOrderLine {
                product_id: ProductId::new(),
                quantity: Decimal::from(51),
                unit_price: Decimal::ONE,
            }],
            ..Default::default()
        }
        .into_order(SalesOrderId::new(), Utc::now())
        .unwrap();
        assert!(matches!(
            check_sales_order(policy, &order),
            Err(StoreError::Domain(DomainError::Validation(_)))
        ));

        let run = NewProductionOrder {
            product_id: ProductId::new(),
            quantity: Decimal::from(10),
            supplies: vec![pansoft_production::SupplyUsage {
                supply_id: SupplyId::new(),
                quantity: Decimal::from(80),
            }],
            notes: None,
        }
        .into_order(ProductionOrderId::new(), Utc::now())
        .unwrap();
        assert!(check_production_order(policy, &run).is_err());
        assert!(check_production_order(StockPolicy::default(), &run).is_ok());
    }

    #[test]
    fn opening_entry_only_for_positive_stock() {
        let s = StockSubject::Product(ProductId::new());
        assert!(opening_entry(s, Decimal::ZERO, None, Utc::now()).is_none());
        let cmd = opening_entry(s, Decimal::TEN, None, Utc::now()).unwrap();
        assert_eq!(cmd.movement_type, MovementType::Entrada);
        assert_eq!(cmd.reason.as_deref(), Some(OPENING_STOCK_REASON));
    }
}
