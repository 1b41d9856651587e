//! # Pending Payment Intents
//!
//! A pending intent is the frozen snapshot of a purchase between issuing
//! signed payment parameters and hearing back from the gateway. It is never
//! modified after creation: the webhook reconciler either turns it into an
//! [`Order`](crate::order::Order) and deletes it, or deletes it outright.
//! Intents that never hear back expire.

use crate::checkout::{CheckoutBreakdown, PricedLine};
use crate::clock::SharedClock;
use crate::error::{PaymentError, PaymentResult};
use crate::product::Currency;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Who and where a pending intent is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentParties {
    pub user_id: String,
    pub store_id: String,
    pub shipping_address_ref: String,
    pub billing_address_ref: String,
}

/// Immutable pre-payment snapshot, keyed by its payment reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIntent {
    pub reference: String,
    pub user_id: String,
    pub store_id: String,
    pub items: Vec<PricedLine>,
    pub currency: Currency,
    pub subtotal: i64,
    pub shipping_cost: i64,
    pub tax_amount: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub shipping_address_ref: String,
    pub billing_address_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<String>,
    pub payment_method: String,
    pub delivery_description: String,
    pub estimated_delivery: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingIntent {
    /// Freeze a checkout breakdown into an intent that lives for `ttl`
    pub fn from_breakdown(
        reference: impl Into<String>,
        parties: IntentParties,
        breakdown: CheckoutBreakdown,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            reference: reference.into(),
            user_id: parties.user_id,
            store_id: parties.store_id,
            items: breakdown.lines,
            currency: breakdown.currency,
            subtotal: breakdown.subtotal,
            shipping_cost: breakdown.shipping_cost,
            tax_amount: breakdown.tax_amount,
            discount_amount: breakdown.discount_amount,
            total_amount: breakdown.total_amount,
            shipping_address_ref: parties.shipping_address_ref,
            billing_address_ref: parties.billing_address_ref,
            coupon: breakdown.coupon,
            payment_method: breakdown.payment_method,
            delivery_description: breakdown.delivery_description,
            estimated_delivery: breakdown.estimated_delivery,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Ephemeral storage for pending intents.
///
/// Implementations must never hand out an intent whose `expires_at` has passed.
#[async_trait]
pub trait IntentStore: Send + Sync {
    /// Persist a new intent; fails with `DuplicateReference` if the reference is taken
    async fn create(&self, intent: PendingIntent) -> PaymentResult<()>;

    /// Fetch a live intent
    async fn find_by_reference(&self, reference: &str) -> PaymentResult<Option<PendingIntent>>;

    /// Remove an intent; removing an absent reference is not an error
    async fn delete(&self, reference: &str) -> PaymentResult<()>;

    /// Drop every expired intent, returning how many were removed
    async fn purge_expired(&self) -> PaymentResult<usize>;
}

/// In-process intent store with query-time expiry and explicit reaping
pub struct InMemoryIntentStore {
    entries: RwLock<HashMap<String, PendingIntent>>,
    clock: SharedClock,
}

impl InMemoryIntentStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of entries held, including expired ones not yet reaped
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> PaymentError {
    PaymentError::Storage("intent store lock poisoned".to_string())
}

#[async_trait]
impl IntentStore for InMemoryIntentStore {
    async fn create(&self, intent: PendingIntent) -> PaymentResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        // An expired entry still holds its reference until it is reaped
        if entries.contains_key(&intent.reference) {
            return Err(PaymentError::DuplicateReference {
                reference: intent.reference,
            });
        }
        debug!(reference = %intent.reference, expires_at = %intent.expires_at, "Stored pending intent");
        entries.insert(intent.reference.clone(), intent);
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> PaymentResult<Option<PendingIntent>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().map_err(poisoned)?;
            match entries.get(reference) {
                None => return Ok(None),
                Some(intent) if intent.is_live_at(now) => return Ok(Some(intent.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().map_err(poisoned)?;
        if entries.get(reference).map_or(false, |i| !i.is_live_at(now)) {
            entries.remove(reference);
            debug!(reference, "Dropped expired pending intent on read");
        }
        Ok(None)
    }

    async fn delete(&self, reference: &str) -> PaymentResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        if entries.remove(reference).is_some() {
            debug!(reference, "Deleted pending intent");
        }
        Ok(())
    }

    async fn purge_expired(&self) -> PaymentResult<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|_, intent| intent.is_live_at(now));
        Ok(before - entries.len())
    }
}
