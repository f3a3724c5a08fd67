use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use pansoft_core::{EmployeeId, ProductId, SupplierId, SupplyId};
use pansoft_inventory::{Movement, StockSubject};
use pansoft_products::{NewProduct, NewSupply, Product, ProductUpdate, Supply, SupplyUpdate};

use super::ledger::record_in_tx;
use super::{PostgresStore, col, map_sqlx_error};
use crate::store::{
    CatalogFilter, CatalogStore, StoreError, StoreResult, opening_entry,
};

const PRODUCT_COLUMNS: &str = "id, sku, name, description, price, unit, quantity, min_stock, \
     active, created_at, updated_at";

const SUPPLY_COLUMNS: &str = "id, name, unit, quantity, min_stock, cost_per_unit, supplier_id, \
     active, created_at, updated_at";

fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    Ok(Product {
        id: ProductId::from_uuid(col(row, "id")?),
        sku: col(row, "sku")?,
        name: col(row, "name")?,
        description: col(row, "description")?,
        price: col(row, "price")?,
        unit: col(row, "unit")?,
        quantity: col(row, "quantity")?,
        min_stock: col(row, "min_stock")?,
        active: col(row, "active")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn supply_from_row(row: &PgRow) -> StoreResult<Supply> {
    Ok(Supply {
        id: SupplyId::from_uuid(col(row, "id")?),
        name: col(row, "name")?,
        unit: col(row, "unit")?,
        quantity: col(row, "quantity")?,
        min_stock: col(row, "min_stock")?,
        cost_per_unit: col(row, "cost_per_unit")?,
        supplier_id: col::<Option<Uuid>>(row, "supplier_id")?.map(SupplierId::from_uuid),
        active: col(row, "active")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

async fn lock_product(tx: &mut Transaction<'_, Postgres>, id: ProductId) -> StoreResult<Product> {
    let row = sqlx::query(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_product", e))?
    .ok_or_else(|| StoreError::NotFound(format!("product {id}")))?;
    product_from_row(&row)
}

async fn lock_supply(tx: &mut Transaction<'_, Postgres>, id: SupplyId) -> StoreResult<Supply> {
    let row = sqlx::query(&format!(
        "SELECT {SUPPLY_COLUMNS} FROM supplies WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_supply", e))?
    .ok_or_else(|| StoreError::NotFound(format!("supply {id}")))?;
    supply_from_row(&row)
}

async fn write_product(tx: &mut Transaction<'_, Postgres>, p: &Product) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE products
        SET sku = $2, name = $3, description = $4, price = $5, unit = $6,
            min_stock = $7, active = $8, updated_at = $9
        WHERE id = $1
        "#,
    )
    .bind(p.id.as_uuid())
    .bind(&p.sku)
    .bind(&p.name)
    .bind(p.description.as_deref())
    .bind(p.price)
    .bind(&p.unit)
    .bind(p.min_stock)
    .bind(p.active)
    .bind(p.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_product", e))?;
    Ok(())
}

async fn write_supply(tx: &mut Transaction<'_, Postgres>, s: &Supply) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE supplies
        SET name = $2, unit = $3, min_stock = $4, cost_per_unit = $5,
            supplier_id = $6, active = $7, updated_at = $8
        WHERE id = $1
        "#,
    )
    .bind(s.id.as_uuid())
    .bind(&s.name)
    .bind(&s.unit)
    .bind(s.min_stock)
    .bind(s.cost_per_unit)
    .bind(s.supplier_id.map(Uuid::from))
    .bind(s.active)
    .bind(s.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_supply", e))?;
    Ok(())
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, input), fields(sku = %input.sku), err)]
    async fn create_product(
        &self,
        input: NewProduct,
        user_id: Option<EmployeeId>,
    ) -> StoreResult<(Product, Option<Movement>)> {
        let now = Utc::now();
        let initial = input.initial_quantity;
        let mut product = input.into_product(ProductId::new(), now)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, description, price, unit, quantity, min_stock,
                active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.description.as_deref())
        .bind(product.price)
        .bind(&product.unit)
        .bind(product.quantity)
        .bind(product.min_stock)
        .bind(product.active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;

        let opening = opening_entry(StockSubject::Product(product.id), initial, user_id, now);
        let movement = match opening {
            Some(cmd) => record_in_tx(&mut tx, self.policy, &[cmd]).await?.pop(),
            None => None,
        };
        if let Some(m) = &movement {
            product.quantity = m.new_quantity;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        debug!(product_id = %product.id, "product created");
        Ok((product, movement))
    }

    #[instrument(skip(self), err)]
    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?
            .ok_or_else(|| StoreError::NotFound(format!("product {id}")))?;
        product_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self, filter: CatalogFilter) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE ($1 OR active) AND (NOT $2 OR quantity <= min_stock) \
             ORDER BY name"
        ))
        .bind(filter.include_inactive)
        .bind(filter.low_stock_only)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;
        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self, update), err)]
    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> StoreResult<Product> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let mut product = lock_product(&mut tx, id).await?;
        update.apply_to(&mut product, Utc::now())?;
        write_product(&mut tx, &product).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(product)
    }

    #[instrument(skip(self), err)]
    async fn deactivate_product(&self, id: ProductId) -> StoreResult<Product> {
        let update = ProductUpdate {
            active: Some(false),
            ..ProductUpdate::default()
        };
        self.update_product(id, update).await
    }

    #[instrument(skip(self, input), fields(name = %input.name), err)]
    async fn create_supply(
        &self,
        input: NewSupply,
        user_id: Option<EmployeeId>,
    ) -> StoreResult<(Supply, Option<Movement>)> {
        let now = Utc::now();
        let initial = input.initial_quantity;
        let mut supply = input.into_supply(SupplyId::new(), now)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO supplies (
                id, name, unit, quantity, min_stock, cost_per_unit, supplier_id,
                active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(supply.id.as_uuid())
        .bind(&supply.name)
        .bind(&supply.unit)
        .bind(supply.quantity)
        .bind(supply.min_stock)
        .bind(supply.cost_per_unit)
        .bind(supply.supplier_id.map(Uuid::from))
        .bind(supply.active)
        .bind(supply.created_at)
        .bind(supply.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_supply", e))?;

        let opening = opening_entry(StockSubject::Supply(supply.id), initial, user_id, now);
        let movement = match opening {
            Some(cmd) => record_in_tx(&mut tx, self.policy, &[cmd]).await?.pop(),
            None => None,
        };
        if let Some(m) = &movement {
            supply.quantity = m.new_quantity;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        debug!(supply_id = %supply.id, "supply created");
        Ok((supply, movement))
    }

    #[instrument(skip(self), err)]
    async fn get_supply(&self, id: SupplyId) -> StoreResult<Supply> {
        let row = sqlx::query(&format!("SELECT {SUPPLY_COLUMNS} FROM supplies WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_supply", e))?
            .ok_or_else(|| StoreError::NotFound(format!("supply {id}")))?;
        supply_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn list_supplies(&self, filter: CatalogFilter) -> StoreResult<Vec<Supply>> {
        let rows = sqlx::query(&format!(
            "SELECT {SUPPLY_COLUMNS} FROM supplies \
             WHERE ($1 OR active) AND (NOT $2 OR quantity <= min_stock) \
             ORDER BY name"
        ))
        .bind(filter.include_inactive)
        .bind(filter.low_stock_only)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_supplies", e))?;
        rows.iter().map(supply_from_row).collect()
    }

    #[instrument(skip(self, update), err)]
    async fn update_supply(&self, id: SupplyId, update: SupplyUpdate) -> StoreResult<Supply> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let mut supply = lock_supply(&mut tx, id).await?;
        update.apply_to(&mut supply, Utc::now())?;
        write_supply(&mut tx, &supply).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(supply)
    }

    #[instrument(skip(self), err)]
    async fn deactivate_supply(&self, id: SupplyId) -> StoreResult<Supply> {
        let update = SupplyUpdate {
            active: Some(false),
            ..SupplyUpdate::default()
        };
        self.update_supply(id, update).await
    }
}
