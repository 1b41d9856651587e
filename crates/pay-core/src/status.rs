//! # Payment Status Resolution
//!
//! Read-only lookup a client can poll after being redirected back from the
//! gateway. It never mutates anything, so it is safe to call at any rate
//! and in any interleaving with webhook processing.

use crate::error::{PaymentError, PaymentResult};
use crate::intent::IntentStore;
use crate::order::{OrderStore, PaymentStatus};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// What a poll for a reference currently shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub payment_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<String>,
    /// Status as last reported by the gateway, or the redirect hint
    #[serde(rename = "wompiStatus", skip_serializing_if = "Option::is_none")]
    pub gateway_status: Option<String>,
    /// Total in minor units
    pub amount: i64,
    pub is_pending: bool,
    pub message: String,
}

/// Resolves a payment reference to an order, a pending intent, or nothing
#[derive(Clone)]
pub struct StatusResolver {
    intents: Arc<dyn IntentStore>,
    orders: Arc<dyn OrderStore>,
}

impl StatusResolver {
    pub fn new(intents: Arc<dyn IntentStore>, orders: Arc<dyn OrderStore>) -> Self {
        Self { intents, orders }
    }

    /// Resolve the current state of `reference`.
    ///
    /// `hint` is the status the gateway put on the redirect URL; it is only
    /// echoed back while the webhook has not landed, never trusted.
    pub async fn resolve(
        &self,
        reference: &str,
        hint: Option<&str>,
    ) -> PaymentResult<PaymentStatusView> {
        if let Some(order) = self.orders.find_by_payment_reference(reference).await? {
            debug!(reference, order_id = %order.id, "Reference resolved to order");
            let is_pending = order.payment_status == PaymentStatus::Pending;
            return Ok(PaymentStatusView {
                reference: reference.to_string(),
                order_id: Some(order.id.clone()),
                payment_status: order.payment_status.as_str().to_string(),
                order_status: Some(order.status.as_str().to_string()),
                gateway_status: order.gateway_status.clone(),
                amount: order.total_amount,
                is_pending,
                message: if is_pending {
                    "Order recorded, waiting for payment confirmation".to_string()
                } else {
                    "Payment confirmed".to_string()
                },
            });
        }

        if let Some(intent) = self.intents.find_by_reference(reference).await? {
            debug!(reference, "Reference resolved to pending intent");
            return Ok(PaymentStatusView {
                reference: reference.to_string(),
                order_id: None,
                payment_status: PaymentStatus::Pending.as_str().to_string(),
                order_status: None,
                gateway_status: hint.map(str::to_string),
                amount: intent.total_amount,
                is_pending: true,
                message: "Payment notification has not been processed yet".to_string(),
            });
        }

        Err(PaymentError::ReferenceNotFound {
            reference: reference.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::intent::tests::sample_intent;
    use crate::intent::InMemoryIntentStore;
    use crate::order::tests::sample_order;
    use crate::order::InMemoryOrderStore;
    use chrono::Duration;

    fn resolver() -> (StatusResolver, Arc<InMemoryIntentStore>, Arc<InMemoryOrderStore>, ManualClock) {
        let clock = ManualClock::default();
        let intents = Arc::new(InMemoryIntentStore::new(Arc::new(clock.clone())));
        let orders = Arc::new(InMemoryOrderStore::new());
        (
            StatusResolver::new(intents.clone(), orders.clone()),
            intents,
            orders,
            clock,
        )
    }

    #[tokio::test]
    async fn test_pending_intent_reports_pending_with_hint() {
        let (resolver, intents, _, clock) = resolver();
        intents.create(sample_intent("REF1", clock.now())).await.unwrap();

        let view = resolver.resolve("REF1", Some("APPROVED")).await.unwrap();
        assert!(view.is_pending);
        assert_eq!(view.payment_status, "pending");
        assert_eq!(view.gateway_status.as_deref(), Some("APPROVED"));
        assert_eq!(view.amount, 17_879);
        assert!(view.order_id.is_none());
    }

    #[tokio::test]
    async fn test_order_is_terminal_and_ignores_hint() {
        let (resolver, _, orders, _) = resolver();
        let order = orders.insert(sample_order("REF1")).await.unwrap();

        let view = resolver.resolve("REF1", Some("DECLINED")).await.unwrap();
        assert!(!view.is_pending);
        assert_eq!(view.order_id.as_deref(), Some(order.id.as_str()));
        assert_eq!(view.payment_status, "paid");
        assert_eq!(view.order_status.as_deref(), Some("confirmed"));
        assert_eq!(view.gateway_status.as_deref(), Some("APPROVED"));
    }

    #[tokio::test]
    async fn test_unknown_or_expired_reference_is_not_found() {
        let (resolver, intents, _, clock) = resolver();
        intents.create(sample_intent("REF1", clock.now())).await.unwrap();
        clock.advance(Duration::hours(2));

        let err = resolver.resolve("REF1", None).await.unwrap_err();
        assert!(matches!(err, PaymentError::ReferenceNotFound { .. }));

        let err = resolver.resolve("NEVER", None).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_view_serializes_wire_names() {
        let view = PaymentStatusView {
            reference: "REF1".to_string(),
            order_id: None,
            payment_status: "pending".to_string(),
            order_status: None,
            gateway_status: Some("PENDING".to_string()),
            amount: 100,
            is_pending: true,
            message: String::new(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["paymentStatus"], "pending");
        assert_eq!(json["wompiStatus"], "PENDING");
        assert_eq!(json["isPending"], true);
    }
}
