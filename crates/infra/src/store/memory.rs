//! In-memory store for development and tests.
//!
//! All state sits behind one `RwLock`, so every operation (including the
//! multi-movement cascades) is atomic: decisions are computed on a read of
//! the state and committed only if every step succeeded.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use pansoft_core::{
    Aggregate, DomainError, EmployeeId, ProductId, ProductionOrderId, SalesOrderId, SupplierId,
    SupplyId,
};
use pansoft_inventory::{
    LedgerRepair, Movement, MovementPlan, RecordMovement, StockPolicy, StockSubject, SubjectKind,
};
use pansoft_parties::{
    Employee, EmployeeUpdate, NewEmployee, NewSupplier, Supplier, SupplierUpdate,
};
use pansoft_production::{ChangeProductionOrderStatus, NewProductionOrder, ProductionOrder};
use pansoft_products::{NewProduct, NewSupply, Product, ProductUpdate, Supply, SupplyUpdate};
use pansoft_sales::{ChangeSalesOrderStatus, NewSalesOrder, SalesOrder, SalesOrderStatus};

use super::{
    CatalogFilter, CatalogStore, LedgerStore, MovementPage, MovementQuery, MovementView,
    OrderStore, PartyStore, StatusChange, StoreError, StoreResult, SubjectLedger,
    check_production_order, check_sales_order, opening_entry,
};

#[derive(Debug, Default)]
pub(crate) struct MemoryState {
    pub(crate) products: BTreeMap<ProductId, Product>,
    pub(crate) supplies: BTreeMap<SupplyId, Supply>,
    pub(crate) suppliers: BTreeMap<SupplierId, Supplier>,
    pub(crate) employees: BTreeMap<EmployeeId, Employee>,
    /// Ledger in append order (oldest first).
    pub(crate) movements: Vec<Movement>,
    pub(crate) sales_orders: BTreeMap<SalesOrderId, SalesOrder>,
    pub(crate) production_orders: BTreeMap<ProductionOrderId, ProductionOrder>,
}

impl MemoryState {
    fn stock_of(&self, subject: StockSubject) -> StoreResult<Decimal> {
        match subject {
            StockSubject::Product(id) => self
                .products
                .get(&id)
                .map(|p| p.quantity)
                .ok_or_else(|| StoreError::NotFound(format!("product {id}"))),
            StockSubject::Supply(id) => self
                .supplies
                .get(&id)
                .map(|s| s.quantity)
                .ok_or_else(|| StoreError::NotFound(format!("supply {id}"))),
        }
    }

    fn set_stock(&mut self, subject: StockSubject, quantity: Decimal) {
        let now = Utc::now();
        match subject {
            StockSubject::Product(id) => {
                if let Some(p) = self.products.get_mut(&id) {
                    p.quantity = quantity;
                    p.updated_at = now;
                }
            }
            StockSubject::Supply(id) => {
                if let Some(s) = self.supplies.get_mut(&id) {
                    s.quantity = quantity;
                    s.updated_at = now;
                }
            }
        }
    }

    /// Decide every movement without touching state.
    fn plan(&self, policy: StockPolicy, commands: &[RecordMovement]) -> StoreResult<MovementPlan> {
        for cmd in commands {
            if let Some(user) = cmd.user_id {
                if !self.employees.contains_key(&user) {
                    return Err(DomainError::validation(format!("unknown employee {user}")).into());
                }
            }
        }

        // The write lock is held by the caller; stamp now.
        let mut plan = MovementPlan::new(policy).stamped_at(Utc::now());
        for subject in MovementPlan::subjects_of(commands) {
            plan.load_with_last(subject, self.stock_of(subject)?, self.last_recorded_at(subject));
        }
        plan.record_all(commands)?;
        Ok(plan)
    }

    fn last_recorded_at(&self, subject: StockSubject) -> Option<DateTime<Utc>> {
        self.movements
            .iter()
            .filter(|m| m.subject == subject)
            .map(|m| m.created_at)
            .max()
    }

    /// Movements matching `keep`, ordered by `created_at` with append order
    /// breaking ties (the Postgres `created_at, seq` order).
    fn ordered_movements(&self, keep: impl Fn(&Movement) -> bool) -> Vec<&Movement> {
        let mut movements: Vec<&Movement> = self.movements.iter().filter(|m| keep(m)).collect();
        movements.sort_by_key(|m| m.created_at);
        movements
    }

    fn commit(&mut self, plan: MovementPlan) -> Vec<Movement> {
        for (subject, quantity) in plan.final_levels() {
            self.set_stock(subject, quantity);
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
        self.movements.extend(movements.iter().cloned());
        movements
    }

    fn view(&self, m: &Movement) -> MovementView {
        let (subject_name, sku, unit) = match m.subject {
            StockSubject::Product(id) => match self.products.get(&id) {
                Some(p) => (p.name.clone(), Some(p.sku.clone()), None),
                None => (String::new(), None, None),
            },
            StockSubject::Supply(id) => match self.supplies.get(&id) {
                Some(s) => (s.name.clone(), None, Some(s.unit.clone())),
                None => (String::new(), None, None),
            },
        };
        MovementView {
            movement: m.clone(),
            subject_name,
            sku,
            unit,
            user_name: m
                .user_id
                .and_then(|u| self.employees.get(&u))
                .map(|e| e.full_name.clone()),
        }
    }

    fn ensure_unique_sku(&self, sku: &str, except: Option<ProductId>) -> StoreResult<()> {
        if self
            .products
            .values()
            .any(|p| p.sku == sku && Some(p.id) != except)
        {
            return Err(StoreError::Duplicate(format!("product sku '{sku}' already exists")));
        }
        Ok(())
    }

    fn ensure_unique_supply_name(&self, name: &str, except: Option<SupplyId>) -> StoreResult<()> {
        if self
            .supplies
            .values()
            .any(|s| s.name.eq_ignore_ascii_case(name) && Some(s.id) != except)
        {
            return Err(StoreError::Duplicate(format!("supply '{name}' already exists")));
        }
        Ok(())
    }

    fn ensure_unique_supplier_name(
        &self,
        name: &str,
        except: Option<SupplierId>,
    ) -> StoreResult<()> {
        if self
            .suppliers
            .values()
            .any(|s| s.name.eq_ignore_ascii_case(name) && Some(s.id) != except)
        {
            return Err(StoreError::Duplicate(format!("supplier '{name}' already exists")));
        }
        Ok(())
    }

    fn ensure_unique_email(
        &self,
        email: Option<&str>,
        except: Option<EmployeeId>,
    ) -> StoreResult<()> {
        let Some(email) = email else {
            return Ok(());
        };
        if self
            .employees
            .values()
            .any(|e| e.email() == Some(email) && Some(e.id) != except)
        {
            return Err(StoreError::Duplicate(format!("employee email '{email}' already exists")));
        }
        Ok(())
    }

    fn ensure_supplier_exists(&self, id: Option<SupplierId>) -> StoreResult<()> {
        match id {
            Some(id) if !self.suppliers.contains_key(&id) => {
                Err(DomainError::validation(format!("unknown supplier {id}")).into())
            }
            _ => Ok(()),
        }
    }
}

/// In-memory implementation of every store trait.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    policy: StockPolicy,
}

impl MemoryStore {
    pub fn new(policy: StockPolicy) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            policy,
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| StoreError::Database("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| StoreError::Database("lock poisoned".to_string()))
    }

    /// Direct state access for seeding legacy data in tests.
    #[cfg(test)]
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut state = self.state.write().unwrap();
        f(&mut state)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StockPolicy::default())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn create_product(
        &self,
        input: NewProduct,
        user_id: Option<EmployeeId>,
    ) -> StoreResult<(Product, Option<Movement>)> {
        let now = Utc::now();
        let initial = input.initial_quantity;
        let product = input.into_product(ProductId::new(), now)?;

        let mut state = self.write()?;
        state.ensure_unique_sku(&product.sku, None)?;

        let opening = opening_entry(StockSubject::Product(product.id), initial, user_id, now);
        let id = product.id;
        state.products.insert(id, product);

        let movement = match opening {
            Some(cmd) => match state.plan(self.policy, std::slice::from_ref(&cmd)) {
                Ok(plan) => state.commit(plan).into_iter().next(),
                Err(e) => {
                    state.products.remove(&id);
                    return Err(e);
                }
            },
            None => None,
        };

        let product = state
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("product {id}")))?;
        debug!(product_id = %id, sku = %product.sku, "product created");
        Ok((product, movement))
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        self.read()?
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("product {id}")))
    }

    async fn list_products(&self, filter: CatalogFilter) -> StoreResult<Vec<Product>> {
        let state = self.read()?;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| filter.include_inactive || p.active)
            .filter(|p| !filter.low_stock_only || p.low_stock())
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> StoreResult<Product> {
        let mut state = self.write()?;
        let mut product = state
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("product {id}")))?;
        update.apply_to(&mut product, Utc::now())?;
        state.ensure_unique_sku(&product.sku, Some(id))?;
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn deactivate_product(&self, id: ProductId) -> StoreResult<Product> {
        let mut state = self.write()?;
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("product {id}")))?;
        product.active = false;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn create_supply(
        &self,
        input: NewSupply,
        user_id: Option<EmployeeId>,
    ) -> StoreResult<(Supply, Option<Movement>)> {
        let now = Utc::now();
        let initial = input.initial_quantity;
        let supply = input.into_supply(SupplyId::new(), now)?;

        let mut state = self.write()?;
        state.ensure_unique_supply_name(&supply.name, None)?;
        state.ensure_supplier_exists(supply.supplier_id)?;

        let opening = opening_entry(StockSubject::Supply(supply.id), initial, user_id, now);
        let id = supply.id;
        state.supplies.insert(id, supply);

        let movement = match opening {
            Some(cmd) => match state.plan(self.policy, std::slice::from_ref(&cmd)) {
                Ok(plan) => state.commit(plan).into_iter().next(),
                Err(e) => {
                    state.supplies.remove(&id);
                    return Err(e);
                }
            },
            None => None,
        };

        let supply = state
            .supplies
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("supply {id}")))?;
        Ok((supply, movement))
    }

    async fn get_supply(&self, id: SupplyId) -> StoreResult<Supply> {
        self.read()?
            .supplies
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("supply {id}")))
    }

    async fn list_supplies(&self, filter: CatalogFilter) -> StoreResult<Vec<Supply>> {
        let state = self.read()?;
        let mut supplies: Vec<Supply> = state
            .supplies
            .values()
            .filter(|s| filter.include_inactive || s.active)
            .filter(|s| !filter.low_stock_only || s.low_stock())
            .cloned()
            .collect();
        supplies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(supplies)
    }

    async fn update_supply(&self, id: SupplyId, update: SupplyUpdate) -> StoreResult<Supply> {
        let mut state = self.write()?;
        let mut supply = state
            .supplies
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("supply {id}")))?;
        update.apply_to(&mut supply, Utc::now())?;
        state.ensure_unique_supply_name(&supply.name, Some(id))?;
        state.ensure_supplier_exists(supply.supplier_id)?;
        state.supplies.insert(id, supply.clone());
        Ok(supply)
    }

    async fn deactivate_supply(&self, id: SupplyId) -> StoreResult<Supply> {
        let mut state = self.write()?;
        let supply = state
            .supplies
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("supply {id}")))?;
        supply.active = false;
        supply.updated_at = Utc::now();
        Ok(supply.clone())
    }
}

#[async_trait]
impl PartyStore for MemoryStore {
    async fn create_supplier(&self, input: NewSupplier) -> StoreResult<Supplier> {
        let supplier = input.into_supplier(SupplierId::new(), Utc::now())?;
        let mut state = self.write()?;
        state.ensure_unique_supplier_name(&supplier.name, None)?;
        state.suppliers.insert(supplier.id, supplier.clone());
        Ok(supplier)
    }

    async fn get_supplier(&self, id: SupplierId) -> StoreResult<Supplier> {
        self.read()?
            .suppliers
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("supplier {id}")))
    }

    async fn list_suppliers(&self) -> StoreResult<Vec<Supplier>> {
        let state = self.read()?;
        let mut suppliers: Vec<Supplier> = state.suppliers.values().cloned().collect();
        suppliers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(suppliers)
    }

    async fn update_supplier(
        &self,
        id: SupplierId,
        update: SupplierUpdate,
    ) -> StoreResult<Supplier> {
        let mut state = self.write()?;
        let mut supplier = state
            .suppliers
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("supplier {id}")))?;
        update.apply_to(&mut supplier, Utc::now())?;
        state.ensure_unique_supplier_name(&supplier.name, Some(id))?;
        state.suppliers.insert(id, supplier.clone());
        Ok(supplier)
    }

    async fn delete_supplier(&self, id: SupplierId) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.suppliers.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("supplier {id}")));
        }
        for supply in state.supplies.values_mut() {
            if supply.supplier_id == Some(id) {
                supply.supplier_id = None;
            }
        }
        Ok(())
    }

    async fn create_employee(&self, input: NewEmployee) -> StoreResult<Employee> {
        let employee = input.into_employee(EmployeeId::new(), Utc::now())?;
        let mut state = self.write()?;
        state.ensure_unique_email(employee.email(), None)?;
        state.employees.insert(employee.id, employee.clone());
        Ok(employee)
    }

    async fn get_employee(&self, id: EmployeeId) -> StoreResult<Employee> {
        self.read()?
            .employees
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("employee {id}")))
    }

    async fn list_employees(&self, include_inactive: bool) -> StoreResult<Vec<Employee>> {
        let state = self.read()?;
        let mut employees: Vec<Employee> = state
            .employees
            .values()
            .filter(|e| include_inactive || e.active)
            .cloned()
            .collect();
        employees.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(employees)
    }

    async fn update_employee(
        &self,
        id: EmployeeId,
        update: EmployeeUpdate,
    ) -> StoreResult<Employee> {
        let mut state = self.write()?;
        let mut employee = state
            .employees
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("employee {id}")))?;
        update.apply_to(&mut employee, Utc::now())?;
        state.ensure_unique_email(employee.email(), Some(id))?;
        state.employees.insert(id, employee.clone());
        Ok(employee)
    }

    async fn deactivate_employee(&self, id: EmployeeId) -> StoreResult<Employee> {
        let mut state = self.write()?;
        let employee = state
            .employees
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("employee {id}")))?;
        employee.active = false;
        employee.updated_at = Utc::now();
        Ok(employee.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn record_movements(&self, commands: Vec<RecordMovement>) -> StoreResult<Vec<Movement>> {
        let mut state = self.write()?;
        let plan = state.plan(self.policy, &commands)?;
        Ok(state.commit(plan))
    }

    async fn list_movements(&self, query: MovementQuery) -> StoreResult<MovementPage> {
        let state = self.read()?;
        let mut matching = state.ordered_movements(|m| query.matches(m));
        matching.reverse();
        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|m| state.view(m))
            .collect();
        Ok(MovementPage { items, total })
    }

    async fn ledger_snapshot(&self, kind: SubjectKind) -> StoreResult<Vec<SubjectLedger>> {
        let state = self.read()?;
        let subjects: Vec<(StockSubject, Decimal)> = match kind {
            SubjectKind::Product => state
                .products
                .values()
                .map(|p| (StockSubject::Product(p.id), p.quantity))
                .collect(),
            SubjectKind::Supply => state
                .supplies
                .values()
                .map(|s| (StockSubject::Supply(s.id), s.quantity))
                .collect(),
        };

        let mut ledgers: BTreeMap<StockSubject, SubjectLedger> = subjects
            .into_iter()
            .map(|(subject, projected)| {
                (
                    subject,
                    SubjectLedger {
                        subject,
                        projected,
                        movements: Vec::new(),
                    },
                )
            })
            .collect();
        for m in state.ordered_movements(|m| m.subject.kind() == kind) {
            if let Some(ledger) = ledgers.get_mut(&m.subject) {
                ledger.movements.push(m.clone());
            }
        }
        Ok(ledgers.into_values().collect())
    }

    async fn apply_repairs(&self, repairs: &[LedgerRepair]) -> StoreResult<usize> {
        let mut state = self.write()?;

        // Check every precondition before writing anything.
        for repair in repairs {
            match repair {
                LedgerRepair::RecomputeChange { movement_id, .. } => {
                    if !state.movements.iter().any(|m| m.id == *movement_id) {
                        return Err(StoreError::NotFound(format!("movement {movement_id}")));
                    }
                }
                LedgerRepair::ResyncProjection {
                    subject, projected, ..
                } => {
                    if state.stock_of(*subject)? != *projected {
                        return Err(DomainError::conflict(format!(
                            "stock of {subject} changed since the audit"
                        ))
                        .into());
                    }
                }
                LedgerRepair::OpeningAdjustment { movement } => {
                    if state.stock_of(movement.subject)? != movement.new_quantity
                        || state.movements.iter().any(|m| m.subject == movement.subject)
                    {
                        return Err(DomainError::conflict(format!(
                            "ledger of {} changed since the audit",
                            movement.subject
                        ))
                        .into());
                    }
                }
            }
        }

        for repair in repairs {
            match repair {
                LedgerRepair::RecomputeChange {
                    movement_id,
                    quantity_change,
                } => {
                    if let Some(m) = state.movements.iter_mut().find(|m| m.id == *movement_id) {
                        m.quantity_change = *quantity_change;
                    }
                }
                LedgerRepair::ResyncProjection {
                    subject, quantity, ..
                } => state.set_stock(*subject, *quantity),
                LedgerRepair::OpeningAdjustment { movement } => {
                    state.movements.push(movement.clone())
                }
            }
        }

        info!(repairs = repairs.len(), "ledger repairs applied");
        Ok(repairs.len())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_sales_order(&self, input: NewSalesOrder) -> StoreResult<SalesOrder> {
        let order = input.into_order(SalesOrderId::new(), Utc::now())?;
        check_sales_order(self.policy, &order)?;
        let mut state = self.write()?;
        for product_id in order.product_ids() {
            match state.products.get(&product_id) {
                None => {
                    return Err(
                        DomainError::validation(format!("product {product_id} does not exist"))
                            .into(),
                    );
                }
                Some(p) if !p.can_be_sold() => {
                    return Err(
                        DomainError::validation(format!("product '{}' is inactive", p.name)).into(),
                    );
                }
                Some(_) => {}
            }
        }
        state.sales_orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_sales_order(&self, id: SalesOrderId) -> StoreResult<SalesOrder> {
        self.read()?
            .sales_orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("sales order {id}")))
    }

    async fn list_sales_orders(
        &self,
        status: Option<SalesOrderStatus>,
    ) -> StoreResult<Vec<SalesOrder>> {
        let state = self.read()?;
        let mut orders: Vec<SalesOrder> = state
            .sales_orders
            .values()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn change_sales_order_status(
        &self,
        cmd: ChangeSalesOrderStatus,
    ) -> StoreResult<StatusChange<SalesOrder>> {
        let mut state = self.write()?;
        let mut order = state
            .sales_orders
            .get(&cmd.order_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("sales order {}", cmd.order_id)))?;

        let events = order.handle(&cmd)?;
        let mut commands = Vec::new();
        for event in &events {
            commands.extend(order.movement_commands(
                event.stock_effect,
                cmd.user_id,
                cmd.occurred_at,
            ));
            order.apply(event);
        }

        let plan = state.plan(self.policy, &commands)?;
        let movements = state.commit(plan);
        state.sales_orders.insert(order.id, order.clone());

        info!(
            order_id = %order.id,
            status = %order.status,
            movements = movements.len(),
            "sales order status changed"
        );
        Ok(StatusChange { order, movements })
    }

    async fn create_production_order(
        &self,
        input: NewProductionOrder,
    ) -> StoreResult<ProductionOrder> {
        let order = input.into_order(ProductionOrderId::new(), Utc::now())?;
        check_production_order(self.policy, &order)?;
        let mut state = self.write()?;
        if !state.products.contains_key(&order.product_id) {
            return Err(DomainError::validation(format!(
                "product {} does not exist",
                order.product_id
            ))
            .into());
        }
        for usage in &order.supplies {
            if !state.supplies.contains_key(&usage.supply_id) {
                return Err(DomainError::validation(format!(
                    "supply {} does not exist",
                    usage.supply_id
                ))
                .into());
            }
        }
        state.production_orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_production_order(&self, id: ProductionOrderId) -> StoreResult<ProductionOrder> {
        self.read()?
            .production_orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("production order {id}")))
    }

    async fn list_production_orders(&self) -> StoreResult<Vec<ProductionOrder>> {
        let state = self.read()?;
        let mut orders: Vec<ProductionOrder> = state.production_orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn change_production_order_status(
        &self,
        cmd: ChangeProductionOrderStatus,
    ) -> StoreResult<StatusChange<ProductionOrder>> {
        let mut state = self.write()?;
        let mut order = state
            .production_orders
            .get(&cmd.order_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("production order {}", cmd.order_id)))?;

        let events = order.handle(&cmd)?;
        let mut commands = Vec::new();
        for event in &events {
            if event.produces {
                commands.extend(order.completion_commands(cmd.user_id, cmd.occurred_at));
            }
            order.apply(event);
        }

        let plan = state.plan(self.policy, &commands)?;
        let movements = state.commit(plan);
        state.production_orders.insert(order.id, order.clone());

        info!(
            order_id = %order.id,
            status = %order.status,
            movements = movements.len(),
            "production order status changed"
        );
        Ok(StatusChange { order, movements })
    }
}
