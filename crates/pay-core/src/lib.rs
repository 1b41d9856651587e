//! # pay-core
//!
//! Core types and traits for the storefront-pay payment engine.
//!
//! This crate provides:
//! - `Product`, `Price`, `Currency` and the `CatalogSource` collaborator
//! - `CheckoutCalculator` for turning carts into price breakdowns
//! - `PendingIntent` and the TTL-bound `IntentStore`
//! - `Order` and the idempotent `OrderStore`
//! - `StatusResolver` for read-only payment polling
//! - `Store`/`StoreRegistry` for multi-storefront support
//! - `PaymentError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use pay_core::{CheckoutCalculator, CheckoutLine, CheckoutRequest, Currency};
//!
//! let calculator = CheckoutCalculator::new(catalog, Currency::COP);
//! let breakdown = calculator
//!     .calculate(&CheckoutRequest {
//!         items: vec![CheckoutLine::new("jacket", 2)],
//!         payment_method: Some("CARD".into()),
//!         delivery_description: Some("standard".into()),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! println!("total: {}", breakdown.total_amount);
//! ```

pub mod address;
pub mod checkout;
pub mod clock;
pub mod error;
pub mod intent;
pub mod order;
pub mod product;
pub mod status;
pub mod store;

// Re-exports for convenience
pub use address::{Address, AddressBook, InMemoryAddressBook};
pub use checkout::{
    CappedPercentagePolicy, CheckoutBreakdown, CheckoutCalculator, CheckoutLine, CheckoutRequest,
    DeliveryOption, DeliveryTable, DiscountBreakdown, DiscountPolicy, LoyaltyOptions,
    MAX_LINE_QUANTITY,
    PricedLine, PricingConfig, TaxTable,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{PaymentError, PaymentResult};
pub use intent::{InMemoryIntentStore, IntentParties, IntentStore, PendingIntent};
pub use order::{
    InMemoryOrderStore, Order, OrderStatus, OrderStore, PaymentStatus, PaymentUpdate,
};
pub use product::{percent_of, CatalogSource, Currency, Price, Product, ProductCatalog};
pub use status::{PaymentStatusView, StatusResolver};
pub use store::{Store, StoreRegistry};
