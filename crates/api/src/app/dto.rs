//! Request DTOs (camelCase, as the frontend sends them) and the JSON views
//! returned by the handlers (snake_case, as the frontend reads them).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

use pansoft_core::{EmployeeId, ProductId, SupplierId, SupplyId};
use pansoft_infra::{MovementPage, MovementView, StatusChange};
use pansoft_inventory::{Movement, MovementType, RecordMovement, StockSubject};
use pansoft_parties::{ContactInfo, Employee, EmployeeRole, Supplier};
use pansoft_production::ProductionOrder;
use pansoft_products::{Product, Supply};
use pansoft_sales::SalesOrder;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMovementRequest {
    pub quantity: Decimal,
    pub movement_type: MovementType,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub user_id: Option<EmployeeId>,
}

impl RecordMovementRequest {
    pub fn into_command(self, subject: StockSubject) -> RecordMovement {
        let mut cmd = RecordMovement::new(subject, self.movement_type, self.quantity)
            .with_notes(self.notes)
            .by_user(self.user_id);
        cmd.reason = self.reason;
        cmd
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub price: Decimal,
    pub unit: Option<String>,
    /// Initial stock, recorded as an opening movement.
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub min_stock: Decimal,
    pub user_id: Option<EmployeeId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub unit: Option<String>,
    pub min_stock: Option<Decimal>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSupplyRequest {
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub cost_per_unit: Decimal,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub min_stock: Decimal,
    pub supplier_id: Option<SupplierId>,
    pub user_id: Option<EmployeeId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSupplyRequest {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub cost_per_unit: Option<Decimal>,
    pub min_stock: Option<Decimal>,
    pub supplier_id: Option<SupplierId>,
    #[serde(default)]
    pub clear_supplier: bool,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierRequest {
    pub name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub active: Option<bool>,
}

impl SupplierRequest {
    pub fn contact(&self) -> ContactInfo {
        ContactInfo {
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRequest {
    pub full_name: Option<String>,
    pub role: Option<EmployeeRole>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub active: Option<bool>,
}

impl EmployeeRequest {
    pub fn contact(&self) -> ContactInfo {
        ContactInfo {
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderLineRequest {
    pub product_id: ProductId,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSalesOrderRequest {
    pub customer_name: String,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub lines: Vec<SalesOrderLineRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyUsageRequest {
    pub supply_id: SupplyId,
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductionOrderRequest {
    pub product_id: ProductId,
    pub quantity: Decimal,
    #[serde(default)]
    pub supplies: Vec<SupplyUsageRequest>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStatusRequest {
    pub status: String,
    pub user_id: Option<EmployeeId>,
}

// -------------------------
// Query parameters
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    #[serde(default)]
    pub low_stock: bool,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub movement_type: Option<MovementType>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LedgerKindQuery {
    pub kind: Option<String>,
}

// -------------------------
// JSON views
// -------------------------

pub fn product_to_json(p: &Product) -> Value {
    json!({
        "id": p.id,
        "sku": p.sku,
        "name": p.name,
        "description": p.description,
        "price": p.price,
        "unit": p.unit,
        "quantity": p.quantity,
        "min_stock": p.min_stock,
        "low_stock": p.low_stock(),
        "active": p.active,
        "created_at": p.created_at,
        "updated_at": p.updated_at,
    })
}

pub fn supply_to_json(s: &Supply) -> Value {
    json!({
        "id": s.id,
        "name": s.name,
        "unit": s.unit,
        "quantity": s.quantity,
        "min_stock": s.min_stock,
        "low_stock": s.low_stock(),
        "cost_per_unit": s.cost_per_unit,
        "supplier_id": s.supplier_id,
        "active": s.active,
        "created_at": s.created_at,
        "updated_at": s.updated_at,
    })
}

pub fn supplier_to_json(s: &Supplier) -> Value {
    json!({
        "id": s.id,
        "name": s.name,
        "contact_name": s.contact_name,
        "email": s.contact.email,
        "phone": s.contact.phone,
        "address": s.contact.address,
        "active": s.active,
        "created_at": s.created_at,
        "updated_at": s.updated_at,
    })
}

pub fn employee_to_json(e: &Employee) -> Value {
    json!({
        "id": e.id,
        "full_name": e.full_name,
        "role": e.role,
        "email": e.contact.email,
        "phone": e.contact.phone,
        "address": e.contact.address,
        "hire_date": e.hire_date,
        "active": e.active,
        "created_at": e.created_at,
        "updated_at": e.updated_at,
    })
}

/// A movement as the history screens read it. Products expose
/// `product_id/product_name/sku`; supplies `supply_id/supply_name/unit`.
pub fn movement_to_json(m: &Movement) -> Value {
    let mut value = json!({
        "id": m.id,
        "movement_type": m.movement_type,
        "quantity_change": m.quantity_change,
        "previous_quantity": m.previous_quantity,
        "new_quantity": m.new_quantity,
        "reason": m.reason,
        "notes": m.notes,
        "user_id": m.user_id,
        "reference_type": m.reference.map(|r| r.kind_str()),
        "reference_id": m.reference.map(|r| r.uuid()),
        "created_at": m.created_at,
    });
    let (key, id) = match m.subject {
        StockSubject::Product(id) => ("product_id", id.to_string()),
        StockSubject::Supply(id) => ("supply_id", id.to_string()),
    };
    if let Some(obj) = value.as_object_mut() {
        obj.insert(key.to_string(), Value::String(id));
    }
    value
}

pub fn movement_view_to_json(v: &MovementView) -> Value {
    let mut value = movement_to_json(&v.movement);
    if let Some(obj) = value.as_object_mut() {
        match v.movement.subject {
            StockSubject::Product(_) => {
                obj.insert("product_name".into(), json!(v.subject_name));
                obj.insert("sku".into(), json!(v.sku));
            }
            StockSubject::Supply(_) => {
                obj.insert("supply_name".into(), json!(v.subject_name));
                obj.insert("unit".into(), json!(v.unit));
            }
        }
        obj.insert("user_name".into(), json!(v.user_name));
    }
    value
}

pub fn movement_page_to_json(page: &MovementPage) -> Value {
    json!({
        "data": page.items.iter().map(movement_view_to_json).collect::<Vec<_>>(),
        "total": page.total,
    })
}

pub fn sales_order_to_json(o: &SalesOrder) -> Value {
    json!({
        "id": o.id,
        "customer_name": o.customer_name,
        "delivery_date": o.delivery_date,
        "notes": o.notes,
        "lines": o.lines.iter().map(|l| json!({
            "line_no": l.line_no,
            "product_id": l.product_id,
            "quantity": l.quantity,
            "unit_price": l.unit_price,
            "subtotal": l.subtotal(),
        })).collect::<Vec<_>>(),
        "total": o.total,
        "status": o.status,
        "inventory_applied": o.inventory_applied,
        "created_at": o.created_at,
        "updated_at": o.updated_at,
    })
}

pub fn production_order_to_json(o: &ProductionOrder) -> Value {
    json!({
        "id": o.id,
        "product_id": o.product_id,
        "quantity": o.quantity,
        "supplies": o.supplies.iter().map(|u| json!({
            "supply_id": u.supply_id,
            "quantity": u.quantity,
        })).collect::<Vec<_>>(),
        "notes": o.notes,
        "status": o.status,
        "completed_at": o.completed_at,
        "created_at": o.created_at,
        "updated_at": o.updated_at,
    })
}

/// Status change response: the order plus `inventoryUpdated`.
pub fn status_change_to_json<T>(change: &StatusChange<T>, order: Value) -> Value {
    json!({
        "order": order,
        "inventoryUpdated": change.inventory_updated(),
        "movements": change.movements.iter().map(movement_to_json).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pansoft_core::{MovementId, SalesOrderId};
    use pansoft_inventory::MovementReference;

    fn movement(subject: StockSubject) -> Movement {
        Movement {
            id: MovementId::new(),
            subject,
            movement_type: MovementType::Devolucion,
            quantity_change: Decimal::new(25, 1),
            previous_quantity: Decimal::ONE,
            new_quantity: Decimal::new(35, 1),
            reason: Some("cancelación".into()),
            notes: None,
            user_id: None,
            reference: Some(MovementReference::SalesOrder(SalesOrderId::new())),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn product_history_items_carry_product_fields() {
        let view = MovementView {
            movement: movement(StockSubject::Product(ProductId::new())),
            subject_name: "Pan francés".into(),
            sku: Some("PAN-001".into()),
            unit: None,
            user_name: None,
        };
        let json = movement_view_to_json(&view);
        assert_eq!(json["product_name"], "Pan francés");
        assert_eq!(json["sku"], "PAN-001");
        assert_eq!(json["movement_type"], "devolucion");
        assert_eq!(json["quantity_change"].as_f64(), Some(2.5));
        assert_eq!(json["reference_type"], "sales_order");
        assert!(json.get("supply_name").is_none());
    }

    #[test]
    fn supply_history_items_carry_supply_fields() {
        let view = MovementView {
            movement: movement(StockSubject::Supply(SupplyId::new())),
            subject_name: "Harina".into(),
            sku: None,
            unit: Some("kg".into()),
            user_name: Some("Lucía".into()),
        };
        let json = movement_view_to_json(&view);
        assert_eq!(json["supply_name"], "Harina");
        assert_eq!(json["unit"], "kg");
        assert_eq!(json["user_name"], "Lucía");
        assert!(json.get("product_id").is_none());
        assert!(json["supply_id"].is_string());
    }
}
