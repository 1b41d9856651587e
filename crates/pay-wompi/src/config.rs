//! # Wompi Configuration
//!
//! Configuration management for the Wompi integration.
//! Secrets are loaded from environment variables once at startup and then
//! passed by value into the signer, issuer and reconciler.

use chrono::Duration;
use pay_core::{Currency, PaymentError};
use std::env;

const DEFAULT_INTENT_TTL_SECS: i64 = 3600;

/// Wompi gateway configuration
#[derive(Debug, Clone)]
pub struct WompiConfig {
    /// Public key handed to the widget (pub_test_... or pub_prod_...)
    pub public_key: String,

    /// Integrity secret used to sign outgoing payment parameters
    pub integrity_secret: String,

    /// Events secret used to verify webhooks; `None` makes every webhook fail verification
    pub events_secret: Option<String>,

    /// Single currency used by this deployment
    pub currency: Currency,

    /// Redirect used when a store has none of its own
    pub redirect_url: Option<String>,

    /// How long a pending intent stays payable
    pub intent_ttl: Duration,

    /// Include the intent's expiration time in the integrity signature
    pub sign_expiration: bool,

    /// Reject webhooks that fail verification instead of logging and continuing
    pub strict_signatures: bool,
}

impl WompiConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `WOMPI_PUBLIC_KEY`
    /// - `WOMPI_INTEGRITY_SECRET`
    ///
    /// Optional: `WOMPI_EVENTS_SECRET`, `WOMPI_CURRENCY`, `WOMPI_REDIRECT_URL`,
    /// `WOMPI_INTENT_TTL_SECS`, `WOMPI_SIGN_EXPIRATION`, `WOMPI_STRICT_SIGNATURES`.
    pub fn from_env() -> Result<Self, PaymentError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let public_key = env::var("WOMPI_PUBLIC_KEY")
            .map_err(|_| PaymentError::Configuration("WOMPI_PUBLIC_KEY not set".to_string()))?;

        let integrity_secret = env::var("WOMPI_INTEGRITY_SECRET").map_err(|_| {
            PaymentError::Configuration("WOMPI_INTEGRITY_SECRET not set".to_string())
        })?;

        let events_secret = env::var("WOMPI_EVENTS_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let currency = match env::var("WOMPI_CURRENCY") {
            Ok(code) => Currency::from_code(&code)?,
            Err(_) => Currency::COP,
        };

        let intent_ttl = match env::var("WOMPI_INTENT_TTL_SECS") {
            Ok(raw) => {
                let secs: i64 = raw.parse().map_err(|_| {
                    PaymentError::Configuration(format!(
                        "WOMPI_INTENT_TTL_SECS must be a number of seconds, got {}",
                        raw
                    ))
                })?;
                if secs <= 0 {
                    return Err(PaymentError::Configuration(
                        "WOMPI_INTENT_TTL_SECS must be positive".to_string(),
                    ));
                }
                Duration::seconds(secs)
            }
            Err(_) => Duration::seconds(DEFAULT_INTENT_TTL_SECS),
        };

        let config = Self {
            public_key,
            integrity_secret,
            events_secret,
            currency,
            redirect_url: env::var("WOMPI_REDIRECT_URL").ok(),
            intent_ttl,
            sign_expiration: env_flag("WOMPI_SIGN_EXPIRATION", false)?,
            strict_signatures: env_flag("WOMPI_STRICT_SIGNATURES", true)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create config with explicit values (for testing)
    pub fn new(
        public_key: impl Into<String>,
        integrity_secret: impl Into<String>,
        events_secret: impl Into<String>,
    ) -> Self {
        Self {
            public_key: public_key.into(),
            integrity_secret: integrity_secret.into(),
            events_secret: Some(events_secret.into()),
            currency: Currency::COP,
            redirect_url: None,
            intent_ttl: Duration::seconds(DEFAULT_INTENT_TTL_SECS),
            sign_expiration: false,
            strict_signatures: true,
        }
    }

    /// Validate key formats
    pub fn validate(&self) -> Result<(), PaymentError> {
        if !self.public_key.starts_with("pub_test_") && !self.public_key.starts_with("pub_prod_") {
            return Err(PaymentError::Configuration(
                "WOMPI_PUBLIC_KEY must start with pub_test_ or pub_prod_".to_string(),
            ));
        }
        if self.integrity_secret.trim().is_empty() {
            return Err(PaymentError::Configuration(
                "WOMPI_INTEGRITY_SECRET must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Check if using sandbox keys
    pub fn is_test_mode(&self) -> bool {
        self.public_key.starts_with("pub_test_")
    }

    /// Check if using production keys
    pub fn is_live_mode(&self) -> bool {
        self.public_key.starts_with("pub_prod_")
    }

    /// Builder: set intent TTL
    pub fn with_intent_ttl(mut self, ttl: Duration) -> Self {
        self.intent_ttl = ttl;
        self
    }

    /// Builder: sign the expiration time
    pub fn with_signed_expiration(mut self, enabled: bool) -> Self {
        self.sign_expiration = enabled;
        self
    }

    /// Builder: strict or permissive webhook verification
    pub fn with_strict_signatures(mut self, strict: bool) -> Self {
        self.strict_signatures = strict;
        self
    }
}

/// Read a boolean switch; anything but a recognized spelling is a configuration error
fn env_flag(name: &str, default: bool) -> Result<bool, PaymentError> {
    match env::var(name) {
        Ok(v) => parse_flag(&v).ok_or_else(|| {
            PaymentError::Configuration(format!(
                "{} must be one of true/false, 1/0, yes/no, on/off, got {:?}",
                name, v
            ))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
