//! # pay-wompi
//!
//! Wompi widget checkout for storefront-pay.
//!
//! The flow has two halves:
//!
//! 1. **IntentIssuer** - prices a cart, stores it as a pending intent under a
//!    fresh reference and signs the widget parameters
//!    - Integrity signature over reference, amount, currency (and optional expiration)
//!    - Bounded retry on reference collisions
//!
//! 2. **WebhookReconciler** - verifies `transaction.updated` events and turns
//!    approved intents into paid orders, exactly once per reference
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pay_wompi::{IntentIssuer, IssueIntentRequest, WompiConfig};
//!
//! let config = WompiConfig::from_env()?;
//! let issuer = IntentIssuer::new(config, calculator, stores, addresses, intents, orders, clock);
//!
//! let issued = issuer.issue(request).await?;
//! // Hand issued.public_key, issued.reference, issued.signature_integrity ... to the widget
//! ```
//!
//! ## Webhook Handling
//!
//! ```rust,ignore
//! use pay_wompi::{ReconcileOutcome, WebhookReconciler};
//!
//! // Pass the exact bytes received
//! match reconciler.handle(&body).await? {
//!     ReconcileOutcome::Materialized { order_id } => println!("Order {} paid!", order_id),
//!     other => println!("{:?}", other),
//! }
//! ```

pub mod config;
pub mod event;
pub mod issuer;
pub mod reconcile;
pub mod signature;

// Re-exports
pub use config::WompiConfig;
pub use event::{EventSignature, TransactionData, TransactionStatus, WompiEvent, TRANSACTION_UPDATED};
pub use issuer::{
    CustomerData, IntentIssuer, IssueIntentRequest, IssuedIntent, ReferenceSource, WidgetAddress,
    MAX_REFERENCE_ATTEMPTS,
};
pub use reconcile::{ReconcileOutcome, WebhookReconciler};
pub use signature::{SignatureService, REFERENCE_LEN};
