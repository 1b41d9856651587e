//! # pay-api
//!
//! HTTP API layer for storefront-pay.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for intent issuance, quoting and status polling
//! - Webhook handler for Wompi events
//! - Background reaper for expired intents
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/payments/intent` | Issue signed payment intent |
//! | GET | `/api/v1/payments/{reference}/status` | Poll payment status |
//! | POST | `/api/v1/checkout/quote` | Price a cart |
//! | POST | `/webhook/wompi` | Wompi webhook |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
