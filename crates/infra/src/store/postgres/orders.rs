use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Executor, Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use pansoft_core::{Aggregate, DomainError, ProductId, ProductionOrderId, SalesOrderId, SupplyId};
use pansoft_production::{
    ChangeProductionOrderStatus, NewProductionOrder, ProductionOrder, ProductionOrderStatus,
    SupplyUsage,
};
use pansoft_sales::{
    ChangeSalesOrderStatus, NewSalesOrder, OrderLine, SalesOrder, SalesOrderStatus,
};

use super::ledger::record_in_tx;
use super::{PostgresStore, col, decode_error, map_sqlx_error};
use crate::store::{
    OrderStore, StatusChange, StoreError, StoreResult, check_production_order, check_sales_order,
};

const SALES_COLUMNS: &str = "id, customer_name, delivery_date, notes, total, status, \
     inventory_applied, created_at, updated_at";

const PRODUCTION_COLUMNS: &str =
    "id, product_id, quantity, notes, status, completed_at, created_at, updated_at";

fn sales_order_from_row(row: &PgRow, lines: Vec<OrderLine>) -> StoreResult<SalesOrder> {
    let status = col::<String>(row, "status")?
        .parse::<SalesOrderStatus>()
        .map_err(|e| decode_error("sales order status", e))?;
    Ok(SalesOrder {
        id: SalesOrderId::from_uuid(col(row, "id")?),
        customer_name: col(row, "customer_name")?,
        delivery_date: col(row, "delivery_date")?,
        notes: col(row, "notes")?,
        lines,
        total: col(row, "total")?,
        status,
        inventory_applied: col(row, "inventory_applied")?,
        version: 0,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn production_order_from_row(
    row: &PgRow,
    supplies: Vec<SupplyUsage>,
) -> StoreResult<ProductionOrder> {
    let status = col::<String>(row, "status")?
        .parse::<ProductionOrderStatus>()
        .map_err(|e| decode_error("production order status", e))?;
    Ok(ProductionOrder {
        id: ProductionOrderId::from_uuid(col(row, "id")?),
        product_id: ProductId::from_uuid(col(row, "product_id")?),
        quantity: col(row, "quantity")?,
        supplies,
        notes: col(row, "notes")?,
        status,
        completed_at: col(row, "completed_at")?,
        version: 0,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

/// Lines of every order in `order_ids`, grouped by order and sorted by line.
async fn load_lines<'e, E>(
    executor: E,
    order_ids: &[Uuid],
) -> StoreResult<HashMap<Uuid, Vec<OrderLine>>>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query(
        "SELECT order_id, line_no, product_id, quantity, unit_price \
         FROM sales_order_lines WHERE order_id = ANY($1) ORDER BY order_id, line_no",
    )
    .bind(order_ids)
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("load_order_lines", e))?;

    let mut grouped: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
    for row in &rows {
        let line_no: i32 = col(row, "line_no")?;
        grouped
            .entry(col(row, "order_id")?)
            .or_default()
            .push(OrderLine {
                line_no: u32::try_from(line_no).map_err(|e| decode_error("line_no", e))?,
                product_id: ProductId::from_uuid(col(row, "product_id")?),
                quantity: col(row, "quantity")?,
                unit_price: col(row, "unit_price")?,
            });
    }
    Ok(grouped)
}

async fn load_usages<'e, E>(
    executor: E,
    order_ids: &[Uuid],
) -> StoreResult<HashMap<Uuid, Vec<SupplyUsage>>>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query(
        "SELECT order_id, supply_id, quantity FROM production_order_supplies \
         WHERE order_id = ANY($1) ORDER BY order_id, supply_id",
    )
    .bind(order_ids)
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("load_order_supplies", e))?;

    let mut grouped: HashMap<Uuid, Vec<SupplyUsage>> = HashMap::new();
    for row in &rows {
        grouped
            .entry(col(row, "order_id")?)
            .or_default()
            .push(SupplyUsage {
                supply_id: SupplyId::from_uuid(col(row, "supply_id")?),
                quantity: col(row, "quantity")?,
            });
    }
    Ok(grouped)
}

async fn lock_sales_order(
    tx: &mut Transaction<'_, Postgres>,
    id: SalesOrderId,
) -> StoreResult<SalesOrder> {
    let row = sqlx::query(&format!(
        "SELECT {SALES_COLUMNS} FROM sales_orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_sales_order", e))?
    .ok_or_else(|| StoreError::NotFound(format!("sales order {id}")))?;

    let mut lines = load_lines(&mut **tx, &[*id.as_uuid()]).await?;
    sales_order_from_row(&row, lines.remove(id.as_uuid()).unwrap_or_default())
}

async fn lock_production_order(
    tx: &mut Transaction<'_, Postgres>,
    id: ProductionOrderId,
) -> StoreResult<ProductionOrder> {
    let row = sqlx::query(&format!(
        "SELECT {PRODUCTION_COLUMNS} FROM production_orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_production_order", e))?
    .ok_or_else(|| StoreError::NotFound(format!("production order {id}")))?;

    let mut usages = load_usages(&mut **tx, &[*id.as_uuid()]).await?;
    production_order_from_row(&row, usages.remove(id.as_uuid()).unwrap_or_default())
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[instrument(skip(self, input), fields(line_count = input.lines.len()), err)]
    async fn create_sales_order(&self, input: NewSalesOrder) -> StoreResult<SalesOrder> {
        let order = input.into_order(SalesOrderId::new(), chrono::Utc::now())?;
        check_sales_order(self.policy, &order)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let product_ids: Vec<Uuid> = order.product_ids().into_iter().map(Uuid::from).collect();
        let products = sqlx::query("SELECT id, name, active FROM products WHERE id = ANY($1)")
            .bind(&product_ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("check_products", e))?;
        for id in &product_ids {
            let row = products
                .iter()
                .find(|r| col::<Uuid>(r, "id").is_ok_and(|found| found == *id));
            match row {
                None => {
                    return Err(
                        DomainError::validation(format!("product {id} does not exist")).into(),
                    );
                }
                Some(row) if !col::<bool>(row, "active")? => {
                    let name: String = col(row, "name")?;
                    return Err(
                        DomainError::validation(format!("product '{name}' is inactive")).into(),
                    );
                }
                Some(_) => {}
            }
        }

        sqlx::query(
            r#"
            INSERT INTO sales_orders (
                id, customer_name, delivery_date, notes, total, status,
                inventory_applied, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.customer_name)
        .bind(order.delivery_date)
        .bind(order.notes.as_deref())
        .bind(order.total)
        .bind(order.status.as_str())
        .bind(order.inventory_applied)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_sales_order", e))?;

        for line in &order.lines {
            sqlx::query(
                "INSERT INTO sales_order_lines \
                 (order_id, line_no, product_id, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(order.id.as_uuid())
            .bind(line.line_no as i32)
            .bind(line.product_id.as_uuid())
            .bind(line.quantity)
            .bind(line.unit_price)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_sales_order_line", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        info!(order_id = %order.id, total = %order.total, "sales order created");
        Ok(order)
    }

    #[instrument(skip(self), err)]
    async fn get_sales_order(&self, id: SalesOrderId) -> StoreResult<SalesOrder> {
        let row = sqlx::query(&format!("SELECT {SALES_COLUMNS} FROM sales_orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_sales_order", e))?
            .ok_or_else(|| StoreError::NotFound(format!("sales order {id}")))?;
        let mut lines = load_lines(&*self.pool, &[*id.as_uuid()]).await?;
        sales_order_from_row(&row, lines.remove(id.as_uuid()).unwrap_or_default())
    }

    #[instrument(skip(self), err)]
    async fn list_sales_orders(
        &self,
        status: Option<SalesOrderStatus>,
    ) -> StoreResult<Vec<SalesOrder>> {
        let rows = sqlx::query(&format!(
            "SELECT {SALES_COLUMNS} FROM sales_orders \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_sales_orders", e))?;

        let ids = rows
            .iter()
            .map(|r| col::<Uuid>(r, "id"))
            .collect::<StoreResult<Vec<_>>>()?;
        let mut lines = load_lines(&*self.pool, &ids).await?;

        rows.iter()
            .zip(&ids)
            .map(|(row, id)| sales_order_from_row(row, lines.remove(id).unwrap_or_default()))
            .collect()
    }

    #[instrument(skip(self, cmd), fields(order_id = %cmd.order_id, status = %cmd.status), err)]
    async fn change_sales_order_status(
        &self,
        cmd: ChangeSalesOrderStatus,
    ) -> StoreResult<StatusChange<SalesOrder>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut order = lock_sales_order(&mut tx, cmd.order_id).await?;
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

        let movements = record_in_tx(&mut tx, self.policy, &commands).await?;

        sqlx::query(
            "UPDATE sales_orders SET status = $2, inventory_applied = $3, updated_at = $4 \
             WHERE id = $1",
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.inventory_applied)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_sales_order", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(
            order_id = %order.id,
            status = %order.status,
            movements = movements.len(),
            "sales order status changed"
        );
        Ok(StatusChange { order, movements })
    }

    #[instrument(skip(self, input), fields(product_id = %input.product_id), err)]
    async fn create_production_order(
        &self,
        input: NewProductionOrder,
    ) -> StoreResult<ProductionOrder> {
        let order = input.into_order(ProductionOrderId::new(), chrono::Utc::now())?;
        check_production_order(self.policy, &order)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Missing product or supplies surface as foreign-key validation errors.
        sqlx::query(
            r#"
            INSERT INTO production_orders (
                id, product_id, quantity, notes, status, completed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.product_id.as_uuid())
        .bind(order.quantity)
        .bind(order.notes.as_deref())
        .bind(order.status.as_str())
        .bind(order.completed_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_production_order", e))?;

        for usage in &order.supplies {
            sqlx::query(
                "INSERT INTO production_order_supplies (order_id, supply_id, quantity) \
                 VALUES ($1, $2, $3)",
            )
            .bind(order.id.as_uuid())
            .bind(usage.supply_id.as_uuid())
            .bind(usage.quantity)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_production_order_supply", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        info!(order_id = %order.id, "production order created");
        Ok(order)
    }

    #[instrument(skip(self), err)]
    async fn get_production_order(&self, id: ProductionOrderId) -> StoreResult<ProductionOrder> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCTION_COLUMNS} FROM production_orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_production_order", e))?
        .ok_or_else(|| StoreError::NotFound(format!("production order {id}")))?;
        let mut usages = load_usages(&*self.pool, &[*id.as_uuid()]).await?;
        production_order_from_row(&row, usages.remove(id.as_uuid()).unwrap_or_default())
    }

    #[instrument(skip(self), err)]
    async fn list_production_orders(&self) -> StoreResult<Vec<ProductionOrder>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCTION_COLUMNS} FROM production_orders ORDER BY created_at DESC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_production_orders", e))?;

        let ids = rows
            .iter()
            .map(|r| col::<Uuid>(r, "id"))
            .collect::<StoreResult<Vec<_>>>()?;
        let mut usages = load_usages(&*self.pool, &ids).await?;

        rows.iter()
            .zip(&ids)
            .map(|(row, id)| production_order_from_row(row, usages.remove(id).unwrap_or_default()))
            .collect()
    }

    #[instrument(skip(self, cmd), fields(order_id = %cmd.order_id, status = %cmd.status), err)]
    async fn change_production_order_status(
        &self,
        cmd: ChangeProductionOrderStatus,
    ) -> StoreResult<StatusChange<ProductionOrder>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut order = lock_production_order(&mut tx, cmd.order_id).await?;
        let events = order.handle(&cmd)?;
        let mut commands = Vec::new();
        for event in &events {
            if event.produces {
                commands.extend(order.completion_commands(cmd.user_id, cmd.occurred_at));
            }
            order.apply(event);
        }

        let movements = record_in_tx(&mut tx, self.policy, &commands).await?;

        sqlx::query(
            "UPDATE production_orders SET status = $2, completed_at = $3, updated_at = $4 \
             WHERE id = $1",
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.completed_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_production_order", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(
            order_id = %order.id,
            status = %order.status,
            movements = movements.len(),
            "production order status changed"
        );
        Ok(StatusChange { order, movements })
    }
}
