//! # Addresses
//!
//! Address snapshots and the address-book collaborator used to resolve
//! shipping/billing references at issuance and materialization time.

use crate::error::{PaymentError, PaymentResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// A postal address owned by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Address-book identifier
    pub id: String,

    /// Owning user
    pub user_id: String,

    pub recipient_name: String,

    #[serde(default)]
    pub phone: String,

    pub line1: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,

    pub city: String,

    #[serde(default)]
    pub region: String,

    /// ISO 3166-1 alpha-2 country code
    pub country: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

impl Address {
    /// Check the fields the gateway widget and the shipping table depend on
    pub fn ensure_complete(&self) -> PaymentResult<()> {
        let required = [
            ("recipient_name", &self.recipient_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("country", &self.country),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(PaymentError::IncompleteAddress {
                    address_id: self.id.clone(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Read access to the user's address book.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Resolve an address reference owned by `user_id`
    async fn resolve(&self, user_id: &str, address_id: &str) -> PaymentResult<Option<Address>>;
}

/// Address book held in memory, seeded from `config/addresses.toml`
#[derive(Debug, Default)]
pub struct InMemoryAddressBook {
    entries: RwLock<HashMap<(String, String), Address>>,
}

#[derive(Debug, Default, Deserialize)]
struct AddressFile {
    #[serde(default)]
    addresses: Vec<Address>,
}

impl InMemoryAddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML string containing `[[addresses]]` tables
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let file: AddressFile = toml::from_str(toml_str)?;
        let book = Self::new();
        for address in file.addresses {
            book.insert(address);
        }
        Ok(book)
    }

    pub fn insert(&self, address: Address) {
        let key = (address.user_id.clone(), address.id.clone());
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, address);
    }

    pub fn remove(&self, user_id: &str, address_id: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(user_id.to_string(), address_id.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AddressBook for InMemoryAddressBook {
    async fn resolve(&self, user_id: &str, address_id: &str) -> PaymentResult<Option<Address>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| PaymentError::Storage("address book lock poisoned".to_string()))?;
        Ok(entries
            .get(&(user_id.to_string(), address_id.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(id: &str, user: &str) -> Address {
        Address {
            id: id.to_string(),
            user_id: user.to_string(),
            recipient_name: "Ana Gomez".to_string(),
            phone: "3001234567".to_string(),
            line1: "Calle 10 # 5-20".to_string(),
            line2: None,
            city: "Bogota".to_string(),
            region: "Cundinamarca".to_string(),
            country: "CO".to_string(),
            postal_code: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_is_scoped_to_user() {
        let book = InMemoryAddressBook::new();
        book.insert(address("home", "user-1"));

        assert!(book.resolve("user-1", "home").await.unwrap().is_some());
        assert!(book.resolve("user-2", "home").await.unwrap().is_none());
    }

    #[test]
    fn test_incomplete_address_names_field() {
        let mut addr = address("home", "user-1");
        addr.city = "  ".to_string();

        match addr.ensure_complete() {
            Err(PaymentError::IncompleteAddress { field, .. }) => assert_eq!(field, "city"),
            other => panic!("expected incomplete address, got {:?}", other),
        }
    }

    #[test]
    fn test_from_toml() {
        let book = InMemoryAddressBook::from_toml(
            r#"
            [[addresses]]
            id = "home"
            user_id = "user-1"
            recipient_name = "Ana Gomez"
            line1 = "Calle 10 # 5-20"
            city = "Bogota"
            country = "CO"
            "#,
        )
        .unwrap();
        assert_eq!(book.len(), 1);
    }
}
