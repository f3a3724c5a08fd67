use serde::{Deserialize, Serialize};

use pansoft_core::error::optional_text;
use pansoft_core::{DomainError, DomainResult};

/// Contact information shared by suppliers and employees.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl ContactInfo {
    /// Trim every field, drop blanks, lowercase the email and check its shape.
    pub fn normalized(self) -> DomainResult<Self> {
        let email = optional_text(self.email).map(|e| e.to_lowercase());
        if let Some(email) = &email {
            validate_email(email)?;
        }
        Ok(Self {
            email,
            phone: optional_text(self.phone),
            address: optional_text(self.address),
        })
    }

    /// Overlay the fields present in `other`.
    pub fn merged(self, other: ContactInfo) -> Self {
        Self {
            email: other.email.or(self.email),
            phone: other.phone.or(self.phone),
            address: other.address.or(self.address),
        }
    }
}

pub(crate) fn validate_email(email: &str) -> DomainResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(DomainError::validation(format!("invalid email '{email}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_normalized_and_checked() {
        let c = ContactInfo {
            email: Some(" Ventas@Molino.PE ".into()),
            phone: Some("".into()),
            address: None,
        }
        .normalized()
        .unwrap();
        assert_eq!(c.email.as_deref(), Some("ventas@molino.pe"));
        assert_eq!(c.phone, None);

        let bad = ContactInfo {
            email: Some("sin-arroba".into()),
            ..ContactInfo::default()
        };
        assert!(matches!(bad.normalized(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn merge_keeps_missing_fields() {
        let base = ContactInfo {
            email: Some("a@b.c".into()),
            phone: Some("123".into()),
            address: None,
        };
        let merged = base.merged(ContactInfo {
            phone: Some("456".into()),
            ..ContactInfo::default()
        });
        assert_eq!(merged.email.as_deref(), Some("a@b.c"));
        assert_eq!(merged.phone.as_deref(), Some("456"));
    }
}
