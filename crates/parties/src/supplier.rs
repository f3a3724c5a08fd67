use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pansoft_core::error::{optional_text, require_text};
use pansoft_core::{AggregateRoot, DomainResult, SupplierId};

use crate::contact::ContactInfo;

/// A vendor of raw materials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub contact_name: Option<String>,
    #[serde(flatten)]
    pub contact: ContactInfo,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AggregateRoot for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewSupplier {
    pub name: String,
    pub contact_name: Option<String>,
    pub contact: ContactInfo,
}

impl NewSupplier {
    pub fn into_supplier(self, id: SupplierId, now: DateTime<Utc>) -> DomainResult<Supplier> {
        require_text("name", &self.name)?;
        Ok(Supplier {
            id,
            name: self.name.trim().to_string(),
            contact_name: optional_text(self.contact_name),
            contact: self.contact.normalized()?,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupplierUpdate {
    pub name: Option<String>,
    pub contact_name: Option<String>,
    pub contact: ContactInfo,
    pub active: Option<bool>,
}

impl SupplierUpdate {
    pub fn apply_to(self, supplier: &mut Supplier, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = supplier.clone();

        if let Some(name) = self.name {
            require_text("name", &name)?;
            next.name = name.trim().to_string();
        }
        if self.contact_name.is_some() {
            next.contact_name = optional_text(self.contact_name);
        }
        next.contact = next.contact.merged(self.contact).normalized()?;
        if let Some(active) = self.active {
            next.active = active;
        }

        next.updated_at = now;
        *supplier = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pansoft_core::DomainError;

    fn molino() -> Supplier {
        NewSupplier {
            name: " Molino San José ".into(),
            contact_name: Some("Rosa".into()),
            contact: ContactInfo {
                email: Some("rosa@molino.pe".into()),
                ..ContactInfo::default()
            },
        }
        .into_supplier(SupplierId::new(), Utc::now())
        .unwrap()
    }

    #[test]
    fn supplier_serializes_contact_inline() {
        let json = serde_json::to_value(molino()).unwrap();
        assert_eq!(json["name"], "Molino San José");
        assert_eq!(json["email"], "rosa@molino.pe");
        assert!(json.get("contact").is_none());
    }

    #[test]
    fn update_rejects_bad_email_without_changes() {
        let mut s = molino();
        let before = s.clone();
        let err = SupplierUpdate {
            name: Some("Otro".into()),
            contact: ContactInfo {
                email: Some("nope".into()),
                ..ContactInfo::default()
            },
            ..SupplierUpdate::default()
        }
        .apply_to(&mut s, Utc::now())
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(s, before);
    }

    #[test]
    fn blank_name_is_rejected() {
        let input = NewSupplier {
            name: "  ".into(),
            ..NewSupplier::default()
        };
        assert!(input.into_supplier(SupplierId::new(), Utc::now()).is_err());
    }
}
