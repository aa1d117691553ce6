//! Emergency contacts.
//!
//! The registry keeps contacts in insertion order and guarantees that a
//! non-empty registry has exactly one primary contact.

mod registry;

pub use registry::ContactRegistry;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Persistence boundary for the contact list.
/// Implemented by the storage layer, allowing the registry to stay decoupled.
pub trait ContactStore: Send + Sync {
    fn load_contacts(&self) -> std::result::Result<Vec<EmergencyContact>, ContactError>;
    fn save_contacts(&self, contacts: &[EmergencyContact]) -> std::result::Result<(), ContactError>;
}

/// Type alias for shared contact store reference.
pub type ContactStoreRef = Arc<dyn ContactStore>;

/// Store that keeps nothing, for sessions without persistence.
pub struct NullContactStore;

impl ContactStore for NullContactStore {
    fn load_contacts(&self) -> std::result::Result<Vec<EmergencyContact>, ContactError> {
        Ok(Vec::new())
    }

    fn save_contacts(&self, _contacts: &[EmergencyContact]) -> std::result::Result<(), ContactError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("contact name must not be empty")]
    EmptyName,

    #[error("contact phone must not be empty")]
    EmptyPhone,

    #[error("failed to persist contacts: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, ContactError>;

/// A person to alert in an emergency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub id: String,
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

/// Contact data as entered by the user, before an id is assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

impl NewContact {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            relationship: None,
            is_primary: false,
        }
    }

    pub fn relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ContactError::EmptyName);
        }
        if self.phone.trim().is_empty() {
            return Err(ContactError::EmptyPhone);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_json_shape() {
        let contact = EmergencyContact {
            id: "1700000000000".to_string(),
            name: "Ana".to_string(),
            phone: "+34 600 000 000".to_string(),
            relationship: None,
            is_primary: true,
        };
        let json = serde_json::to_string(&contact).unwrap();
        assert!(json.contains("\"isPrimary\":true"));
        assert!(!json.contains("relationship"));
    }

    #[test]
    fn test_contact_deserialize_minimal() {
        let json = r#"{"id": "1", "name": "Ana", "phone": "123"}"#;
        let contact: EmergencyContact = serde_json::from_str(json).unwrap();
        assert!(!contact.is_primary);
        assert_eq!(contact.relationship, None);
    }

    #[test]
    fn test_new_contact_validation() {
        assert!(NewContact::new("Ana", "123").validate().is_ok());
        assert!(matches!(
            NewContact::new("  ", "123").validate(),
            Err(ContactError::EmptyName)
        ));
        assert!(matches!(
            NewContact::new("Ana", "").validate(),
            Err(ContactError::EmptyPhone)
        ));
    }
}
