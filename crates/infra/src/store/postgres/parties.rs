use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use tracing::{info, instrument};

use pansoft_core::{EmployeeId, SupplierId};
use pansoft_parties::{
    ContactInfo, Employee, EmployeeRole, EmployeeUpdate, NewEmployee, NewSupplier, Supplier,
    SupplierUpdate,
};

use super::{PostgresStore, col, decode_error, map_sqlx_error};
use crate::store::{PartyStore, StoreError, StoreResult};

const SUPPLIER_COLUMNS: &str =
    "id, name, contact_name, email, phone, address, active, created_at, updated_at";

const EMPLOYEE_COLUMNS: &str =
    "id, full_name, role, email, phone, address, hire_date, active, created_at, updated_at";

fn contact_from_row(row: &PgRow) -> StoreResult<ContactInfo> {
    Ok(ContactInfo {
        email: col(row, "email")?,
        phone: col(row, "phone")?,
        address: col(row, "address")?,
    })
}

fn supplier_from_row(row: &PgRow) -> StoreResult<Supplier> {
    Ok(Supplier {
        id: SupplierId::from_uuid(col(row, "id")?),
        name: col(row, "name")?,
        contact_name: col(row, "contact_name")?,
        contact: contact_from_row(row)?,
        active: col(row, "active")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn employee_from_row(row: &PgRow) -> StoreResult<Employee> {
    let role = col::<String>(row, "role")?
        .parse::<EmployeeRole>()
        .map_err(|e| decode_error("role", e))?;
    Ok(Employee {
        id: EmployeeId::from_uuid(col(row, "id")?),
        full_name: col(row, "full_name")?,
        role,
        contact: contact_from_row(row)?,
        hire_date: col(row, "hire_date")?,
        active: col(row, "active")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

impl PostgresStore {
    async fn insert_supplier(&self, s: &Supplier) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO suppliers (
                id, name, contact_name, email, phone, address, active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(s.id.as_uuid())
        .bind(&s.name)
        .bind(s.contact_name.as_deref())
        .bind(s.contact.email.as_deref())
        .bind(s.contact.phone.as_deref())
        .bind(s.contact.address.as_deref())
        .bind(s.active)
        .bind(s.created_at)
        .bind(s.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_supplier", e))?;
        Ok(())
    }

    async fn write_supplier(&self, s: &Supplier) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE suppliers
            SET name = $2, contact_name = $3, email = $4, phone = $5, address = $6,
                active = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(s.id.as_uuid())
        .bind(&s.name)
        .bind(s.contact_name.as_deref())
        .bind(s.contact.email.as_deref())
        .bind(s.contact.phone.as_deref())
        .bind(s.contact.address.as_deref())
        .bind(s.active)
        .bind(s.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_supplier", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("supplier {}", s.id)));
        }
        Ok(())
    }

    async fn insert_employee(&self, e: &Employee) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO employees (
                id, full_name, role, email, phone, address, hire_date, active,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(e.id.as_uuid())
        .bind(&e.full_name)
        .bind(e.role.as_str())
        .bind(e.contact.email.as_deref())
        .bind(e.contact.phone.as_deref())
        .bind(e.contact.address.as_deref())
        .bind(e.hire_date)
        .bind(e.active)
        .bind(e.created_at)
        .bind(e.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|err| map_sqlx_error("insert_employee", err))?;
        Ok(())
    }

    async fn write_employee(&self, e: &Employee) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE employees
            SET full_name = $2, role = $3, email = $4, phone = $5, address = $6,
                hire_date = $7, active = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(e.id.as_uuid())
        .bind(&e.full_name)
        .bind(e.role.as_str())
        .bind(e.contact.email.as_deref())
        .bind(e.contact.phone.as_deref())
        .bind(e.contact.address.as_deref())
        .bind(e.hire_date)
        .bind(e.active)
        .bind(e.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|err| map_sqlx_error("update_employee", err))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("employee {}", e.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl PartyStore for PostgresStore {
    #[instrument(skip(self, input), err)]
    async fn create_supplier(&self, input: NewSupplier) -> StoreResult<Supplier> {
        let supplier = input.into_supplier(SupplierId::new(), Utc::now())?;
        self.insert_supplier(&supplier).await?;
        Ok(supplier)
    }

    #[instrument(skip(self), err)]
    async fn get_supplier(&self, id: SupplierId) -> StoreResult<Supplier> {
        let row = sqlx::query(&format!("SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_supplier", e))?
            .ok_or_else(|| StoreError::NotFound(format!("supplier {id}")))?;
        supplier_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn list_suppliers(&self) -> StoreResult<Vec<Supplier>> {
        let rows = sqlx::query(&format!("SELECT {SUPPLIER_COLUMNS} FROM suppliers ORDER BY name"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_suppliers", e))?;
        rows.iter().map(supplier_from_row).collect()
    }

    #[instrument(skip(self, update), err)]
    async fn update_supplier(
        &self,
        id: SupplierId,
        update: SupplierUpdate,
    ) -> StoreResult<Supplier> {
        let mut supplier = self.get_supplier(id).await?;
        update.apply_to(&mut supplier, Utc::now())?;
        self.write_supplier(&supplier).await?;
        Ok(supplier)
    }

    #[instrument(skip(self), err)]
    async fn delete_supplier(&self, id: SupplierId) -> StoreResult<()> {
        // supplies.supplier_id is ON DELETE SET NULL
        let result = sqlx::query("DELETE FROM suppliers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_supplier", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("supplier {id}")));
        }
        info!(supplier_id = %id, "supplier deleted");
        Ok(())
    }

    #[instrument(skip(self, input), err)]
    async fn create_employee(&self, input: NewEmployee) -> StoreResult<Employee> {
        let employee = input.into_employee(EmployeeId::new(), Utc::now())?;
        self.insert_employee(&employee).await?;
        Ok(employee)
    }

    #[instrument(skip(self), err)]
    async fn get_employee(&self, id: EmployeeId) -> StoreResult<Employee> {
        let row = sqlx::query(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_employee", e))?
            .ok_or_else(|| StoreError::NotFound(format!("employee {id}")))?;
        employee_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn list_employees(&self, include_inactive: bool) -> StoreResult<Vec<Employee>> {
        let rows = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE ($1 OR active) ORDER BY full_name"
        ))
        .bind(include_inactive)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_employees", e))?;
        rows.iter().map(employee_from_row).collect()
    }

    #[instrument(skip(self, update), err)]
    async fn update_employee(
        &self,
        id: EmployeeId,
        update: EmployeeUpdate,
    ) -> StoreResult<Employee> {
        let mut employee = self.get_employee(id).await?;
        update.apply_to(&mut employee, Utc::now())?;
        self.write_employee(&employee).await?;
        Ok(employee)
    }

    #[instrument(skip(self), err)]
    async fn deactivate_employee(&self, id: EmployeeId) -> StoreResult<Employee> {
        let update = EmployeeUpdate {
            active: Some(false),
            ..EmployeeUpdate::default()
        };
        self.update_employee(id, update).await
    }
}
