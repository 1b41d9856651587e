//! # Routes
//!
//! Axum router configuration for the payment API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - API:
///   - POST /api/v1/payments/intent - Issue a signed payment intent
///   - GET  /api/v1/payments/{reference}/status - Poll payment state
///   - POST /api/v1/checkout/quote - Price a cart
///
/// - Webhooks:
///   - POST /webhook/wompi - Wompi event handler
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/payments/intent", post(handlers::issue_intent))
        .route("/payments/{reference}/status", get(handlers::payment_status))
        .route("/checkout/quote", post(handlers::quote))
        .layer(cors);

    // Webhook routes (no CORS, must accept raw body)
    let webhook_routes = Router::new().route("/wompi", post(handlers::wompi_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api/v1", api_routes)
        .nest("/webhook", webhook_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create a minimal router for testing
#[cfg(test)]
pub fn create_test_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/payments/intent", post(handlers::issue_intent))
        .route("/api/v1/payments/{reference}/status", get(handlers::payment_status))
        .route("/api/v1/checkout/quote", post(handlers::quote))
        .route("/webhook/wompi", post(handlers::wompi_webhook))
        .with_state(state)
}
