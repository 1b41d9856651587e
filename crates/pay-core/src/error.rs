//! # Payment Error Types
//!
//! Typed error handling for the storefront-pay engine.
//! All payment operations return `Result<T, PaymentError>`.

use thiserror::Error;

/// Core error type for all payment operations
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A required request field was missing or empty
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Product not found in catalog
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: String },

    /// Requested quantity exceeds the catalog stock
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: u32,
        available: u32,
    },

    /// Store not registered or inactive
    #[error("Store not found: {store_id}")]
    StoreNotFound { store_id: String },

    /// Address reference could not be resolved for the user
    #[error("Address not found: {address_id}")]
    AddressNotFound { address_id: String },

    /// Address exists but lacks fields required for shipping or billing
    #[error("Incomplete address {address_id}: missing {field}")]
    IncompleteAddress { address_id: String, field: String },

    /// Invalid amount (negative or not representable in minor units)
    #[error("Invalid price: {message}")]
    InvalidPrice { message: String },

    /// Currency not supported
    #[error("Unsupported currency: {currency}")]
    UnsupportedCurrency { currency: String },

    /// Webhook signature verification failed
    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    /// Webhook payload parsing error
    #[error("Webhook parse error: {0}")]
    WebhookParseError(String),

    /// Pending intent or order not found (or already expired)
    #[error("Payment reference not found or expired: {reference}")]
    ReferenceNotFound { reference: String },

    /// A pending intent with this reference already exists
    #[error("Duplicate payment reference: {reference}")]
    DuplicateReference { reference: String },

    /// An order already carries this payment reference
    #[error("Order already exists for payment reference {reference}")]
    DuplicateOrder { reference: String },

    /// Could not generate an unused reference within the retry budget
    #[error("Could not allocate a unique payment reference after {attempts} attempts")]
    ReferenceExhausted { attempts: u32 },

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PaymentError {
    /// Shorthand for [`PaymentError::MissingField`]
    pub fn missing(field: impl Into<String>) -> Self {
        PaymentError::MissingField {
            field: field.into(),
        }
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::Configuration(_) => 500,
            PaymentError::InvalidRequest(_) => 400,
            PaymentError::MissingField { .. } => 400,
            PaymentError::ProductNotFound { .. } => 404,
            PaymentError::InsufficientStock { .. } => 409,
            PaymentError::StoreNotFound { .. } => 404,
            PaymentError::AddressNotFound { .. } => 404,
            PaymentError::IncompleteAddress { .. } => 400,
            PaymentError::InvalidPrice { .. } => 400,
            PaymentError::UnsupportedCurrency { .. } => 400,
            PaymentError::WebhookVerificationFailed(_) => 401,
            PaymentError::WebhookParseError(_) => 400,
            PaymentError::ReferenceNotFound { .. } => 404,
            PaymentError::DuplicateReference { .. } => 409,
            PaymentError::DuplicateOrder { .. } => 409,
            PaymentError::ReferenceExhausted { .. } => 503,
            PaymentError::Storage(_) => 500,
            PaymentError::Serialization(_) => 500,
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::Serialization(err.to_string())
    }
}

/// Result type alias for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;
