//! # Signatures
//!
//! Outgoing integrity signatures and inbound webhook verification.
//!
//! * **Integrity** (widget parameters):
//!   `hex(SHA256(reference ∥ amount_in_cents ∥ currency ∥ [expiration_time] ∥ integrity_secret))`
//!
//! * **Webhook checksum**:
//!   `hex(HMAC-SHA256(value(p1) ∥ value(p2) ∥ …, events_secret))` for the
//!   properties listed in `signature.properties`, in that order.

use crate::config::WompiConfig;
use crate::event::WompiEvent;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use pay_core::{Currency, PaymentResult};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Length of generated payment references
pub const REFERENCE_LEN: usize = 32;

/// Signs payment parameters and verifies webhook events
#[derive(Clone)]
pub struct SignatureService {
    integrity_secret: String,
    events_secret: Option<String>,
}

impl std::fmt::Debug for SignatureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureService")
            .field("events_secret_configured", &self.events_secret.is_some())
            .finish()
    }
}

impl SignatureService {
    pub fn new(integrity_secret: impl Into<String>, events_secret: Option<String>) -> Self {
        Self {
            integrity_secret: integrity_secret.into(),
            events_secret,
        }
    }

    pub fn from_config(config: &WompiConfig) -> Self {
        Self::new(config.integrity_secret.clone(), config.events_secret.clone())
    }

    /// Random uppercase alphanumeric reference of [`REFERENCE_LEN`] characters.
    ///
    /// Uniqueness is not guaranteed here; the intent store decides.
    pub fn new_reference() -> String {
        Uuid::new_v4().simple().to_string().to_uppercase()
    }

    /// Decimal amount to integer minor units, rounding half-up
    pub fn to_minor_units(amount: f64, currency: Currency) -> PaymentResult<i64> {
        currency.try_to_smallest_unit(amount)
    }

    pub fn from_minor_units(amount: i64, currency: Currency) -> f64 {
        currency.from_smallest_unit(amount)
    }

    /// ISO-8601 form of an expiration time, exactly as it goes into the signature
    pub fn format_expiration(at: DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Integrity signature for the widget.
    ///
    /// Passing `Some(expiration)` changes the digest; the widget must be given
    /// the same expiration string or the gateway rejects the payment.
    pub fn sign_intent(
        &self,
        reference: &str,
        amount_in_cents: i64,
        currency: &str,
        expiration_time: Option<&str>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(reference.as_bytes());
        hasher.update(amount_in_cents.to_string().as_bytes());
        hasher.update(currency.as_bytes());
        if let Some(expiration) = expiration_time {
            hasher.update(expiration.as_bytes());
        }
        hasher.update(self.integrity_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verify an event's checksum. Fails closed on any missing piece.
    pub fn verify_webhook(&self, event: &WompiEvent) -> bool {
        let Some(secret) = self.events_secret.as_deref() else {
            debug!("Events secret not configured, webhook cannot be verified");
            return false;
        };
        let Some(signature) = event.signature.as_ref() else {
            return false;
        };
        let (Some(properties), Some(checksum)) =
            (signature.properties.as_ref(), signature.checksum.as_ref())
        else {
            return false;
        };
        if properties.is_empty() {
            return false;
        }

        let mut concatenated = String::new();
        for property in properties {
            match event.property_value(property) {
                Some(value) => concatenated.push_str(&value),
                None => {
                    debug!(property = %property, "Signed property missing from event");
                    return false;
                }
            }
        }

        let expected = compute_hmac_sha256(secret, &concatenated);
        constant_time_compare(&checksum.to_lowercase(), &expected)
    }

    /// Checksum the gateway would send for `event` (used by tests and tooling)
    pub fn checksum_for(&self, event: &WompiEvent, properties: &[&str]) -> Option<String> {
        let secret = self.events_secret.as_deref()?;
        let mut concatenated = String::new();
        for property in properties {
            concatenated.push_str(&event.property_value(property)?);
        }
        Some(compute_hmac_sha256(secret, &concatenated))
    }
}

fn compute_hmac_sha256(secret: &str, message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
