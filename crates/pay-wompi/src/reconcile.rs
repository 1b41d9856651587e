//! # Webhook Reconciliation
//!
//! Turns verified `transaction.updated` events into orders. Every branch is
//! safe under repeated delivery: the order store's unique payment reference
//! is the final arbiter, and whichever delivery loses the insert race is
//! reported as already processed.

use crate::event::{TransactionData, TransactionStatus, WompiEvent};
use crate::signature::SignatureService;
use pay_core::{
    Address, AddressBook, IntentStore, Order, OrderStore, PaymentError, PaymentResult,
    PaymentUpdate, PendingIntent, SharedClock,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// What happened to a delivered event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new paid order was created from the pending intent
    Materialized { order_id: String },
    /// An existing pending order was marked paid
    Confirmed { order_id: String },
    /// The reference already has a paid order
    AlreadyProcessed { order_id: Option<String> },
    /// Payment failed; the intent was dropped
    Discarded,
    /// Gateway has not settled the transaction yet
    StillPending,
    /// Nothing is known about the reference
    UnknownReference,
    /// Processing could not finish; state is left for a later redelivery
    Deferred { reason: String },
    /// Not an event this service acts on
    Ignored { event: String },
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Materialized { .. } => "materialized",
            ReconcileOutcome::Confirmed { .. } => "confirmed",
            ReconcileOutcome::AlreadyProcessed { .. } => "already_processed",
            ReconcileOutcome::Discarded => "discarded",
            ReconcileOutcome::StillPending => "still_pending",
            ReconcileOutcome::UnknownReference => "unknown_reference",
            ReconcileOutcome::Deferred { .. } => "deferred",
            ReconcileOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Applies gateway events to intents and orders
pub struct WebhookReconciler {
    signer: SignatureService,
    intents: Arc<dyn IntentStore>,
    orders: Arc<dyn OrderStore>,
    addresses: Arc<dyn AddressBook>,
    clock: SharedClock,
    strict: bool,
}

impl WebhookReconciler {
    pub fn new(
        signer: SignatureService,
        intents: Arc<dyn IntentStore>,
        orders: Arc<dyn OrderStore>,
        addresses: Arc<dyn AddressBook>,
        clock: SharedClock,
    ) -> Self {
        Self {
            signer,
            intents,
            orders,
            addresses,
            clock,
            strict: true,
        }
    }

    /// Builder: strict rejects unverifiable events, permissive logs and continues
    pub fn with_strict_signatures(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Handle a raw webhook body.
    ///
    /// Only verification failures in strict mode surface as errors; anything
    /// else is reported through the outcome so the gateway gets an ack.
    pub async fn handle(&self, raw: &[u8]) -> PaymentResult<ReconcileOutcome> {
        let event = match WompiEvent::parse(raw) {
            Ok(event) => event,
            Err(e) if self.strict => {
                warn!(error = %e, "Rejecting unparseable webhook");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "Unparseable webhook acknowledged in permissive mode");
                return Ok(ReconcileOutcome::Deferred {
                    reason: e.to_string(),
                });
            }
        };

        if !self.signer.verify_webhook(&event) {
            if self.strict {
                warn!(event = %event.event, "Rejecting webhook with invalid signature");
                return Err(PaymentError::WebhookVerificationFailed(
                    "Invalid webhook checksum".to_string(),
                ));
            }
            warn!(
                event = %event.event,
                "Webhook signature invalid, processing anyway because strict signatures are disabled"
            );
        }

        if !event.is_transaction_update() {
            debug!(event = %event.event, "Ignoring unhandled event type");
            return Ok(ReconcileOutcome::Ignored { event: event.event });
        }

        let txn = match event.transaction() {
            Ok(txn) => txn,
            Err(e) => {
                warn!(error = %e, "Transaction payload incomplete");
                return Ok(ReconcileOutcome::Deferred {
                    reason: e.to_string(),
                });
            }
        };

        match self.reconcile(&txn).await {
            Ok(outcome) => {
                info!(
                    reference = %txn.reference,
                    transaction_id = %txn.id,
                    status = %txn.status,
                    outcome = outcome.label(),
                    "Webhook reconciled"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    reference = %txn.reference,
                    transaction_id = %txn.id,
                    error = %e,
                    "Webhook reconciliation failed, waiting for redelivery"
                );
                Ok(ReconcileOutcome::Deferred {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Apply a verified transaction update
    #[instrument(skip(self, txn), fields(reference = %txn.reference, status = %txn.status))]
    pub async fn reconcile(&self, txn: &TransactionData) -> PaymentResult<ReconcileOutcome> {
        match self.intents.find_by_reference(&txn.reference).await? {
            Some(intent) => self.reconcile_intent(intent, txn).await,
            None => self.reconcile_without_intent(txn).await,
        }
    }

    async fn reconcile_without_intent(
        &self,
        txn: &TransactionData,
    ) -> PaymentResult<ReconcileOutcome> {
        let Some(order) = self.orders.find_by_payment_reference(&txn.reference).await? else {
            warn!(reference = %txn.reference, "Webhook for unknown or expired reference");
            return Ok(ReconcileOutcome::UnknownReference);
        };

        if order.is_paid() {
            return Ok(ReconcileOutcome::AlreadyProcessed {
                order_id: Some(order.id),
            });
        }

        if txn.status != TransactionStatus::Approved {
            debug!(order_id = %order.id, "Pending order left untouched");
            return Ok(ReconcileOutcome::StillPending);
        }

        let note = format!(
            "Payment APPROVED via gateway: transaction={} reference={}",
            txn.id, txn.reference
        );
        let update = PaymentUpdate::approved(&txn.id, note);
        match self
            .orders
            .settle_pending(&txn.reference, update, self.clock.now())
            .await?
        {
            Some(order) => Ok(ReconcileOutcome::Confirmed { order_id: order.id }),
            // Another delivery settled it between our read and write
            None => Ok(ReconcileOutcome::AlreadyProcessed {
                order_id: Some(order.id),
            }),
        }
    }

    async fn reconcile_intent(
        &self,
        intent: PendingIntent,
        txn: &TransactionData,
    ) -> PaymentResult<ReconcileOutcome> {
        match &txn.status {
            TransactionStatus::Approved => self.materialize(intent, txn).await,
            status if status.is_failure() => {
                self.intents.delete(&intent.reference).await?;
                info!(reference = %intent.reference, status = %status, "Payment failed, intent discarded");
                Ok(ReconcileOutcome::Discarded)
            }
            _ => Ok(ReconcileOutcome::StillPending),
        }
    }

    async fn resolve_address(&self, user_id: &str, address_id: &str) -> PaymentResult<Address> {
        self.addresses
            .resolve(user_id, address_id)
            .await?
            .ok_or_else(|| PaymentError::AddressNotFound {
                address_id: address_id.to_string(),
            })
    }

    async fn materialize(
        &self,
        intent: PendingIntent,
        txn: &TransactionData,
    ) -> PaymentResult<ReconcileOutcome> {
        // Address failures propagate and leave the intent for a redelivery
        let shipping = self
            .resolve_address(&intent.user_id, &intent.shipping_address_ref)
            .await?;
        let billing = self
            .resolve_address(&intent.user_id, &intent.billing_address_ref)
            .await?;

        let reference = intent.reference.clone();
        let expected = intent.total_amount;
        let now = self.clock.now();
        let mut order = Order::from_intent(intent, shipping, billing, &txn.id, txn.status.as_str(), now);

        if let Some(paid) = txn.amount_in_cents.filter(|paid| *paid != expected) {
            warn!(reference = %reference, expected, paid, "Approved amount differs from intent total");
            order.append_note(
                now,
                &format!("Amount mismatch: expected={} paid={}", expected, paid),
            );
        }

        let outcome = match self.orders.insert(order).await {
            Ok(order) => {
                info!(
                    reference = %reference,
                    order_id = %order.id,
                    items = order.item_count(),
                    "Order created from approved payment"
                );
                ReconcileOutcome::Materialized { order_id: order.id }
            }
            Err(PaymentError::DuplicateOrder { .. }) => {
                let existing = self.orders.find_by_payment_reference(&reference).await?;
                ReconcileOutcome::AlreadyProcessed {
                    order_id: existing.map(|o| o.id),
                }
            }
            Err(e) => return Err(e),
        };

        self.intents.delete(&reference).await?;
        Ok(outcome)
    }
}
