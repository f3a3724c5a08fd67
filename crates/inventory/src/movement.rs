use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pansoft_core::{
    DomainError, EmployeeId, MovementId, ProductId, ProductionOrderId, SalesOrderId, SupplyId,
};

/// Kind of stock change recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Goods received.
    Entrada,
    /// Goods removed (sale, consumption, waste).
    Salida,
    /// Physical count correction; the requested quantity is the counted stock.
    Ajuste,
    /// Goods returned to stock.
    #[serde(alias = "devolución")]
    Devolucion,
}

impl MovementType {
    pub const ALL: [MovementType; 4] = [
        MovementType::Entrada,
        MovementType::Salida,
        MovementType::Ajuste,
        MovementType::Devolucion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Entrada => "entrada",
            MovementType::Salida => "salida",
            MovementType::Ajuste => "ajuste",
            MovementType::Devolucion => "devolucion",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entrada" => Ok(MovementType::Entrada),
            "salida" => Ok(MovementType::Salida),
            "ajuste" => Ok(MovementType::Ajuste),
            "devolucion" | "devolución" => Ok(MovementType::Devolucion),
            other => Err(DomainError::validation(format!(
                "unknown movement type '{other}' (expected entrada, salida, ajuste or devolucion)"
            ))),
        }
    }
}

/// Which catalog a stock subject belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Product,
    Supply,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Product => "product",
            SubjectKind::Supply => "supply",
        }
    }
}

impl FromStr for SubjectKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "product" | "products" => Ok(SubjectKind::Product),
            "supply" | "supplies" => Ok(SubjectKind::Supply),
            other => Err(DomainError::validation(format!(
                "unknown subject kind '{other}' (expected product or supply)"
            ))),
        }
    }
}

/// The product or supply whose stock a movement changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum StockSubject {
    Product(ProductId),
    Supply(SupplyId),
}

impl StockSubject {
    pub fn kind(&self) -> SubjectKind {
        match self {
            StockSubject::Product(_) => SubjectKind::Product,
            StockSubject::Supply(_) => SubjectKind::Supply,
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            StockSubject::Product(id) => *id.as_uuid(),
            StockSubject::Supply(id) => *id.as_uuid(),
        }
    }

    pub fn from_parts(kind: SubjectKind, uuid: Uuid) -> Self {
        match kind {
            SubjectKind::Product => StockSubject::Product(ProductId::from_uuid(uuid)),
            SubjectKind::Supply => StockSubject::Supply(SupplyId::from_uuid(uuid)),
        }
    }
}

impl core::fmt::Display for StockSubject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.uuid())
    }
}

/// Business document that caused a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum MovementReference {
    SalesOrder(SalesOrderId),
    ProductionOrder(ProductionOrderId),
}

impl MovementReference {
    pub fn kind_str(&self) -> &'static str {
        match self {
            MovementReference::SalesOrder(_) => "sales_order",
            MovementReference::ProductionOrder(_) => "production_order",
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            MovementReference::SalesOrder(id) => *id.as_uuid(),
            MovementReference::ProductionOrder(id) => *id.as_uuid(),
        }
    }

    /// Rebuild from the persisted `(reference_type, reference_id)` pair.
    pub fn from_parts(kind: &str, uuid: Uuid) -> Option<Self> {
        match kind {
            "sales_order" => Some(MovementReference::SalesOrder(SalesOrderId::from_uuid(uuid))),
            "production_order" => Some(MovementReference::ProductionOrder(
                ProductionOrderId::from_uuid(uuid),
            )),
            _ => None,
        }
    }
}

/// One append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub subject: StockSubject,
    pub movement_type: MovementType,
    /// Signed delta applied to stock.
    pub quantity_change: Decimal,
    pub previous_quantity: Decimal,
    pub new_quantity: Decimal,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub user_id: Option<EmployeeId>,
    pub reference: Option<MovementReference>,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    /// `new_quantity = previous_quantity + quantity_change`.
    pub fn is_consistent(&self) -> bool {
        self.previous_quantity + self.quantity_change == self.new_quantity
    }
}
