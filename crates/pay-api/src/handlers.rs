//! # Request Handlers
//!
//! Axum request handlers for the payment API.
//! Intent issuance, quoting, the Wompi webhook and status polling.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use pay_core::{CheckoutBreakdown, CheckoutRequest, PaymentError, PaymentStatusView};
use pay_wompi::{IssueIntentRequest, IssuedIntent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

/// Header set by the upstream auth layer
pub const USER_ID_HEADER: &str = "x-user-id";

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query string of the status endpoint
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Status the gateway appended to the redirect URL
    #[serde(default)]
    pub status: Option<String>,
}

/// Acknowledgement returned to the gateway
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn payment_error_to_response(err: PaymentError) -> ApiError {
    let code = err.status_code();
    let mut response = ErrorResponse::new(err.to_string(), code);
    if let PaymentError::MissingField { field } = &err {
        response = response.with_details(field.clone());
    }
    (StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(response))
}

fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Missing authenticated user", 401)),
            )
        })
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "storefront-pay",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "strictSignatures": state.wompi.strict_signatures,
    }))
}

/// Issue a signed payment intent for the widget
#[instrument(skip(state, headers, request), fields(items = request.checkout.items.len()))]
pub async fn issue_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IssueIntentRequest>,
) -> Result<Json<IssuedIntent>, ApiError> {
    let request = IssueIntentRequest {
        user_id: user_id(&headers)?,
        ..request
    };

    let issued = state.issuer.issue(request).await.map_err(|e| {
        if e.status_code() >= 500 {
            error!("Failed to issue payment intent: {}", e);
        } else {
            warn!("Payment intent rejected: {}", e);
        }
        payment_error_to_response(e)
    })?;

    info!(
        "Issued intent: reference={}, amount_in_cents={}",
        issued.reference, issued.amount_in_cents
    );
    Ok(Json(issued))
}

/// Price a cart without creating anything
#[instrument(skip(state, request), fields(items = request.items.len()))]
pub async fn quote(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutBreakdown>, ApiError> {
    state
        .issuer
        .quote(&request)
        .await
        .map(Json)
        .map_err(payment_error_to_response)
}

/// Handle Wompi webhook.
///
/// Acknowledged with 200 unless the event cannot be authenticated in strict mode.
#[instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn wompi_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let outcome = state.reconciler.handle(&body).await.map_err(|e| {
        error!("Webhook rejected: {}", e);
        payment_error_to_response(e)
    })?;

    Ok(Json(WebhookAck {
        received: true,
        outcome: outcome.label().to_string(),
    }))
}

/// Poll the state of a payment reference
#[instrument(skip(state, query))]
pub async fn payment_status(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<PaymentStatusView>, ApiError> {
    state
        .status
        .resolve(&reference, query.status.as_deref())
        .await
        .map(Json)
        .map_err(payment_error_to_response)
}
