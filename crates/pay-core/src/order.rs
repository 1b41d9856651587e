//! # Order Types
//!
//! Durable orders materialized from pending intents once the gateway
//! approves a payment. The commercial content of an order (lines, amounts,
//! addresses) is fixed at creation; afterwards only the payment/fulfilment
//! status, gateway bookkeeping and the audit trail move.

use crate::address::Address;
use crate::checkout::PricedLine;
use crate::error::{PaymentError, PaymentResult};
use crate::intent::PendingIntent;
use crate::product::Currency;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Whether money has been captured for the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

/// Fulfilment status of the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

/// A durable order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID (generated)
    pub id: String,

    pub user_id: String,
    pub store_id: String,

    /// Line snapshot carried over from the intent
    pub items: Vec<PricedLine>,

    pub currency: Currency,
    pub subtotal: i64,
    pub shipping_cost: i64,
    pub tax_amount: i64,
    pub discount_amount: i64,
    pub total_amount: i64,

    pub shipping_address_ref: String,
    pub billing_address_ref: String,
    pub shipping_address: Address,
    pub billing_address: Address,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<String>,
    pub payment_method: String,
    pub delivery_description: String,
    pub estimated_delivery: String,

    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub status: OrderStatus,

    /// Reference of the intent this order came from; at most one order per value
    pub payment_reference: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_transaction_id: Option<String>,

    /// Last status reported by the gateway (e.g. "APPROVED")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_status: Option<String>,

    /// Append-only free-text history, one line per event
    #[serde(default)]
    pub notes: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Materialize a paid, confirmed order from an approved intent
    pub fn from_intent(
        intent: PendingIntent,
        shipping_address: Address,
        billing_address: Address,
        transaction_id: impl Into<String>,
        gateway_status: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let transaction_id = transaction_id.into();
        let gateway_status = gateway_status.into();
        let mut order = Self {
            id: Uuid::new_v4().to_string(),
            user_id: intent.user_id,
            store_id: intent.store_id,
            items: intent.items,
            currency: intent.currency,
            subtotal: intent.subtotal,
            shipping_cost: intent.shipping_cost,
            tax_amount: intent.tax_amount,
            discount_amount: intent.discount_amount,
            total_amount: intent.total_amount,
            shipping_address_ref: intent.shipping_address_ref,
            billing_address_ref: intent.billing_address_ref,
            shipping_address,
            billing_address,
            coupon: intent.coupon,
            payment_method: intent.payment_method,
            delivery_description: intent.delivery_description,
            estimated_delivery: intent.estimated_delivery,
            payment_status: PaymentStatus::Paid,
            status: OrderStatus::Confirmed,
            payment_reference: intent.reference,
            gateway_transaction_id: Some(transaction_id.clone()),
            gateway_status: Some(gateway_status.clone()),
            notes: String::new(),
            created_at: now,
            updated_at: now,
        };
        let note = format!(
            "Payment {} via gateway: transaction={} reference={}",
            gateway_status, transaction_id, order.payment_reference
        );
        order.append_note(now, &note);
        order
    }

    /// Append a timestamped line to the audit trail
    pub fn append_note(&mut self, at: DateTime<Utc>, note: &str) {
        self.notes.push_str(&format!("[{}] {}\n", at.to_rfc3339(), note));
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Get item count
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Apply a payment update; commercial fields are untouched
    pub fn apply(&mut self, update: &PaymentUpdate, at: DateTime<Utc>) {
        if let Some(status) = update.payment_status {
            self.payment_status = status;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(id) = &update.transaction_id {
            self.gateway_transaction_id = Some(id.clone());
        }
        if let Some(status) = &update.gateway_status {
            self.gateway_status = Some(status.clone());
        }
        self.append_note(at, &update.note);
        self.updated_at = at;
    }
}

/// The only kind of change an existing order accepts
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub payment_status: Option<PaymentStatus>,
    pub status: Option<OrderStatus>,
    pub transaction_id: Option<String>,
    pub gateway_status: Option<String>,
    pub note: String,
}

impl PaymentUpdate {
    /// Mark a pending order as paid and confirmed
    pub fn approved(transaction_id: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            payment_status: Some(PaymentStatus::Paid),
            status: Some(OrderStatus::Confirmed),
            transaction_id: Some(transaction_id.into()),
            gateway_status: Some("APPROVED".to_string()),
            note: note.into(),
        }
    }
}

/// Durable order storage.
///
/// `insert` is the idempotency backstop: it must atomically refuse a second
/// order with the same `payment_reference`.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order; fails with `DuplicateOrder` if its payment reference is taken
    async fn insert(&self, order: Order) -> PaymentResult<Order>;

    async fn find_by_payment_reference(&self, reference: &str) -> PaymentResult<Option<Order>>;

    async fn find_by_id(&self, order_id: &str) -> PaymentResult<Option<Order>>;

    /// Apply `update` only while the order's payment is still pending.
    ///
    /// Returns the updated order, or `None` when the order is absent or already paid.
    async fn settle_pending(
        &self,
        reference: &str,
        update: PaymentUpdate,
        at: DateTime<Utc>,
    ) -> PaymentResult<Option<Order>>;
}

/// Order store held in memory, keyed by payment reference
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    by_reference: Mutex<HashMap<String, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_reference
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> PaymentError {
    PaymentError::Storage("order store lock poisoned".to_string())
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> PaymentResult<Order> {
        let mut orders = self.by_reference.lock().map_err(poisoned)?;
        if orders.contains_key(&order.payment_reference) {
            return Err(PaymentError::DuplicateOrder {
                reference: order.payment_reference,
            });
        }
        debug!(order_id = %order.id, reference = %order.payment_reference, "Inserted order");
        orders.insert(order.payment_reference.clone(), order.clone());
        Ok(order)
    }

    async fn find_by_payment_reference(&self, reference: &str) -> PaymentResult<Option<Order>> {
        let orders = self.by_reference.lock().map_err(poisoned)?;
        Ok(orders.get(reference).cloned())
    }

    async fn find_by_id(&self, order_id: &str) -> PaymentResult<Option<Order>> {
        let orders = self.by_reference.lock().map_err(poisoned)?;
        Ok(orders.values().find(|o| o.id == order_id).cloned())
    }

    async fn settle_pending(
        &self,
        reference: &str,
        update: PaymentUpdate,
        at: DateTime<Utc>,
    ) -> PaymentResult<Option<Order>> {
        let mut orders = self.by_reference.lock().map_err(poisoned)?;
        match orders.get_mut(reference) {
            Some(order) if order.payment_status == PaymentStatus::Pending => {
                order.apply(&update, at);
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }
}
