//! # Store Configuration
//!
//! Storefronts that sell through this engine. Each store has its own
//! redirect URL for the gateway widget; the store id is frozen into every
//! pending intent and order.

use serde::{Deserialize, Serialize};

/// Configuration for a single storefront
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    /// Unique store identifier (e.g., "bogota-centro")
    pub id: String,

    /// Display name
    pub name: String,

    /// Primary domain (e.g., "tienda.example.co")
    pub domain: String,

    /// Where the gateway sends the shopper after paying
    pub redirect_url: String,

    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Store {
    /// Create a new store with required fields
    pub fn new(id: impl Into<String>, name: impl Into<String>, domain: impl Into<String>) -> Self {
        let domain: String = domain.into();
        Self {
            id: id.into(),
            name: name.into(),
            redirect_url: format!("https://{}/checkout/result", domain),
            domain,
            active: true,
        }
    }

    /// Builder: set redirect URL
    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = url.into();
        self
    }

    /// Redirect URL carrying the payment reference so the result page can poll status
    pub fn redirect_url_for(&self, reference: &str) -> String {
        if self.redirect_url.contains('?') {
            format!("{}&reference={}", self.redirect_url, reference)
        } else {
            format!("{}?reference={}", self.redirect_url, reference)
        }
    }
}

/// Registry of all storefronts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreRegistry {
    #[serde(default)]
    pub stores: Vec<Store>,

    /// Store used when a request names none
    #[serde(default)]
    pub default_store: Option<String>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with a default store
    pub fn with_default(default_store_id: impl Into<String>) -> Self {
        Self {
            stores: Vec::new(),
            default_store: Some(default_store_id.into()),
        }
    }

    pub fn add(&mut self, store: Store) {
        self.stores.push(store);
    }

    /// Add a store with builder pattern
    pub fn with_store(mut self, store: Store) -> Self {
        self.add(store);
        self
    }

    /// Get an active store by ID
    pub fn get(&self, store_id: &str) -> Option<&Store> {
        self.stores.iter().find(|s| s.id == store_id && s.active)
    }

    pub fn default_store(&self) -> Option<&Store> {
        self.default_store
            .as_ref()
            .and_then(|id| self.get(id))
            .or_else(|| self.stores.iter().find(|s| s.active))
    }

    /// Resolve an explicit store id, or the default when none is given.
    ///
    /// An explicit but unknown id does not fall back: orders must not be
    /// attributed to the wrong storefront.
    pub fn resolve(&self, store_id: Option<&str>) -> Option<&Store> {
        match store_id {
            Some(id) => self.get(id),
            None => self.default_store(),
        }
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Load registry from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}
