use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pansoft_core::error::require_text;
use pansoft_core::{AggregateRoot, DomainError, DomainResult, EmployeeId};

use crate::contact::ContactInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmployeeRole {
    Administrador,
    Panadero,
    Vendedor,
    Ayudante,
}

impl EmployeeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeRole::Administrador => "administrador",
            EmployeeRole::Panadero => "panadero",
            EmployeeRole::Vendedor => "vendedor",
            EmployeeRole::Ayudante => "ayudante",
        }
    }
}

impl core::fmt::Display for EmployeeRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmployeeRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "administrador" => Ok(EmployeeRole::Administrador),
            "panadero" => Ok(EmployeeRole::Panadero),
            "vendedor" => Ok(EmployeeRole::Vendedor),
            "ayudante" => Ok(EmployeeRole::Ayudante),
            other => Err(DomainError::validation(format!("unknown employee role '{other}'"))),
        }
    }
}

/// A member of staff; also the actor recorded on inventory movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub full_name: String,
    pub role: EmployeeRole,
    #[serde(flatten)]
    pub contact: ContactInfo,
    pub hire_date: Option<NaiveDate>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn email(&self) -> Option<&str> {
        self.contact.email.as_deref()
    }
}

impl AggregateRoot for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmployee {
    pub full_name: String,
    pub role: EmployeeRole,
    pub contact: ContactInfo,
    pub hire_date: Option<NaiveDate>,
}

impl NewEmployee {
    pub fn into_employee(self, id: EmployeeId, now: DateTime<Utc>) -> DomainResult<Employee> {
        require_text("full name", &self.full_name)?;
        Ok(Employee {
            id,
            full_name: self.full_name.trim().to_string(),
            role: self.role,
            contact: self.contact.normalized()?,
            hire_date: self.hire_date,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmployeeUpdate {
    pub full_name: Option<String>,
    pub role: Option<EmployeeRole>,
    pub contact: ContactInfo,
    pub hire_date: Option<NaiveDate>,
    pub active: Option<bool>,
}

impl EmployeeUpdate {
    pub fn apply_to(self, employee: &mut Employee, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = employee.clone();

        if let Some(name) = self.full_name {
            require_text("full name", &name)?;
            next.full_name = name.trim().to_string();
        }
        if let Some(role) = self.role {
            next.role = role;
        }
        next.contact = next.contact.merged(self.contact).normalized()?;
        if self.hire_date.is_some() {
            next.hire_date = self.hire_date;
        }
        if let Some(active) = self.active {
            next.active = active;
        }

        next.updated_at = now;
        *employee = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baker() -> Employee {
        NewEmployee {
            full_name: "Luis Quispe".into(),
            role: EmployeeRole::Panadero,
            contact: ContactInfo {
                email: Some("LUIS@pansoft.pe".into()),
                ..ContactInfo::default()
            },
            hire_date: NaiveDate::from_ymd_opt(2023, 3, 1),
        }
        .into_employee(EmployeeId::new(), Utc::now())
        .unwrap()
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Vendedor".parse::<EmployeeRole>().unwrap(), EmployeeRole::Vendedor);
        assert!("gerente".parse::<EmployeeRole>().is_err());
        let json = serde_json::to_string(&EmployeeRole::Administrador).unwrap();
        assert_eq!(json, "\"administrador\"");
    }

    #[test]
    fn email_is_lowercased() {
        assert_eq!(baker().email(), Some("luis@pansoft.pe"));
    }

    #[test]
    fn update_changes_role_and_keeps_email() {
        let mut e = baker();
        EmployeeUpdate {
            role: Some(EmployeeRole::Administrador),
            ..EmployeeUpdate::default()
        }
        .apply_to(&mut e, Utc::now())
        .unwrap();
        assert_eq!(e.role, EmployeeRole::Administrador);
        assert_eq!(e.email(), Some("luis@pansoft.pe"));
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut e = baker();
        let err = EmployeeUpdate {
            full_name: Some(" ".into()),
            ..EmployeeUpdate::default()
        }
        .apply_to(&mut e, Utc::now());
        assert!(matches!(err, Err(DomainError::Validation(_))));
    }
}
