//! # Wompi Webhook Events
//!
//! Model of the JSON body Wompi POSTs to the events URL:
//!
//! ```json
//! {
//!   "event": "transaction.updated",
//!   "data": { "transaction": { "id": "1234-1610641025-49201", "status": "APPROVED",
//!                              "reference": "MZQ3X2DE2SMX", "amount_in_cents": 4490000 } },
//!   "signature": { "properties": ["transaction.id", "transaction.status"],
//!                  "checksum": "3476DDA50F64CD7CBD160689640506FEBEA93239BC524FC0469B2C68A3CC8BD0" },
//!   "timestamp": 1530291411,
//!   "sent_at": "2018-07-20T16:45:05.000Z"
//! }
//! ```

use pay_core::{PaymentError, PaymentResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name for transaction status changes
pub const TRANSACTION_UPDATED: &str = "transaction.updated";

/// Status of a gateway transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    Approved,
    Declined,
    Voided,
    Pending,
    Error,
    Unknown(String),
}

impl TransactionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "APPROVED" => TransactionStatus::Approved,
            "DECLINED" => TransactionStatus::Declined,
            "VOIDED" => TransactionStatus::Voided,
            "PENDING" => TransactionStatus::Pending,
            "ERROR" => TransactionStatus::Error,
            other => TransactionStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransactionStatus::Approved => "APPROVED",
            TransactionStatus::Declined => "DECLINED",
            TransactionStatus::Voided => "VOIDED",
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Error => "ERROR",
            TransactionStatus::Unknown(s) => s,
        }
    }

    /// Final states in which no money moved
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Declined | TransactionStatus::Voided | TransactionStatus::Error
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `signature` block of an event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventSignature {
    #[serde(default)]
    pub properties: Option<Vec<String>>,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// A raw webhook event as received
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WompiEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub signature: Option<EventSignature>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub sent_at: Option<String>,
}

/// The transaction fields the reconciler acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionData {
    pub id: String,
    pub reference: String,
    pub status: TransactionStatus,
    pub amount_in_cents: Option<i64>,
    pub currency: Option<String>,
    pub payment_method_type: Option<String>,
}

impl WompiEvent {
    /// Parse the exact bytes received; never re-serialize before verifying
    pub fn parse(raw: &[u8]) -> PaymentResult<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| PaymentError::WebhookParseError(format!("Failed to parse webhook: {}", e)))
    }

    pub fn is_transaction_update(&self) -> bool {
        self.event == TRANSACTION_UPDATED
    }

    /// Textual value of a dotted property path under `data`.
    ///
    /// Strings are returned verbatim, numbers and booleans in their JSON form.
    /// Objects, arrays, nulls and missing paths yield `None`.
    pub fn property_value(&self, path: &str) -> Option<String> {
        let mut node = &self.data;
        for segment in path.split('.') {
            node = node.get(segment)?;
        }
        match node {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Extract `data.transaction`
    pub fn transaction(&self) -> PaymentResult<TransactionData> {
        let txn = self.data.get("transaction").ok_or_else(|| {
            PaymentError::WebhookParseError("Missing data.transaction".to_string())
        })?;

        let field = |name: &str| -> PaymentResult<String> {
            txn.get(name)
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    PaymentError::WebhookParseError(format!("Missing transaction.{}", name))
                })
        };

        Ok(TransactionData {
            id: field("id")?,
            reference: field("reference")?,
            status: TransactionStatus::parse(&field("status")?),
            amount_in_cents: txn.get("amount_in_cents").and_then(Value::as_i64),
            currency: txn.get("currency").and_then(Value::as_str).map(String::from),
            payment_method_type: txn
                .get("payment_method_type")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }
}
