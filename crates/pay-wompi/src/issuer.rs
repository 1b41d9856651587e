//! # Intent Issuance
//!
//! Builds everything the Wompi widget needs to start a payment:
//! validate the request, price the cart, freeze it as a pending intent
//! under a fresh reference, and sign the parameters.

use crate::config::WompiConfig;
use crate::signature::SignatureService;
use pay_core::{
    Address, AddressBook, CheckoutBreakdown, CheckoutCalculator, CheckoutRequest, IntentParties,
    IntentStore, OrderStore, PaymentError, PaymentResult, PendingIntent, SharedClock,
    StoreRegistry,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// How many fresh references to try before giving up
pub const MAX_REFERENCE_ATTEMPTS: u32 = 5;

/// Produces candidate payment references
pub type ReferenceSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Request to issue a signed payment intent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueIntentRequest {
    /// Authenticated user; set by the HTTP layer, not the client body
    #[serde(skip)]
    pub user_id: String,
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default)]
    pub shipping_address_id: Option<String>,
    #[serde(default)]
    pub billing_address_id: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(flatten)]
    pub checkout: CheckoutRequest,
}

/// Shopper data in the shape the widget expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub full_name: String,
    pub phone_number: String,
}

/// Shipping address in the shape the widget expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetAddress {
    pub address_line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    pub region: String,
    pub country: String,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

impl From<&Address> for WidgetAddress {
    fn from(address: &Address) -> Self {
        Self {
            address_line1: address.line1.clone(),
            address_line2: address.line2.clone(),
            city: address.city.clone(),
            region: address.region.clone(),
            country: address.country.clone(),
            phone_number: address.phone.clone(),
            postal_code: address.postal_code.clone(),
        }
    }
}

/// Signed parameters handed to the client
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedIntent {
    pub public_key: String,
    pub currency: String,
    pub amount_in_cents: i64,
    pub reference: String,
    pub signature_integrity: String,
    /// Present only when it was part of the signature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
    pub redirect_url: String,
    pub customer_data: CustomerData,
    pub shipping_address: WidgetAddress,
    pub breakdown: CheckoutBreakdown,
}

/// Orchestrates the issuance flow
pub struct IntentIssuer {
    config: WompiConfig,
    signer: SignatureService,
    calculator: CheckoutCalculator,
    stores: StoreRegistry,
    addresses: Arc<dyn AddressBook>,
    intents: Arc<dyn IntentStore>,
    orders: Arc<dyn OrderStore>,
    clock: SharedClock,
    references: ReferenceSource,
}

impl IntentIssuer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WompiConfig,
        calculator: CheckoutCalculator,
        stores: StoreRegistry,
        addresses: Arc<dyn AddressBook>,
        intents: Arc<dyn IntentStore>,
        orders: Arc<dyn OrderStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            signer: SignatureService::from_config(&config),
            config,
            calculator,
            stores,
            addresses,
            intents,
            orders,
            clock,
            references: Arc::new(SignatureService::new_reference),
        }
    }

    /// Builder: replace the reference generator
    pub fn with_reference_source(mut self, source: ReferenceSource) -> Self {
        self.references = source;
        self
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.stores
    }

    /// Price a cart without reserving anything
    pub async fn quote(&self, checkout: &CheckoutRequest) -> PaymentResult<CheckoutBreakdown> {
        self.calculator.calculate(checkout).await
    }

    async fn resolve_address(
        &self,
        user_id: &str,
        address_id: &str,
    ) -> PaymentResult<Address> {
        let address = self
            .addresses
            .resolve(user_id, address_id)
            .await?
            .ok_or_else(|| PaymentError::AddressNotFound {
                address_id: address_id.to_string(),
            })?;
        address.ensure_complete()?;
        Ok(address)
    }

    /// Persist the intent under the first reference nobody holds yet
    async fn reserve(
        &self,
        parties: &IntentParties,
        breakdown: &CheckoutBreakdown,
    ) -> PaymentResult<PendingIntent> {
        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let reference = (self.references)();

            if self.orders.find_by_payment_reference(&reference).await?.is_some() {
                warn!(attempt, reference = %reference, "Generated reference already used by an order");
                continue;
            }

            let intent = PendingIntent::from_breakdown(
                reference,
                parties.clone(),
                breakdown.clone(),
                self.clock.now(),
                self.config.intent_ttl,
            );
            match self.intents.create(intent.clone()).await {
                Ok(()) => return Ok(intent),
                Err(PaymentError::DuplicateReference { reference }) => {
                    warn!(attempt, reference = %reference, "Generated reference collided with a pending intent");
                }
                Err(e) => return Err(e),
            }
        }
        Err(PaymentError::ReferenceExhausted {
            attempts: MAX_REFERENCE_ATTEMPTS,
        })
    }

    /// Validate, price, persist and sign a new payment intent
    #[instrument(skip(self, request), fields(user_id = %request.user_id, items = request.checkout.items.len()))]
    pub async fn issue(&self, request: IssueIntentRequest) -> PaymentResult<IssuedIntent> {
        if request.user_id.trim().is_empty() {
            return Err(PaymentError::missing("user_id"));
        }
        request.checkout.validate()?;
        let shipping_id = non_blank(&request.shipping_address_id)
            .ok_or_else(|| PaymentError::missing("shipping_address_id"))?;
        let billing_id = non_blank(&request.billing_address_id)
            .ok_or_else(|| PaymentError::missing("billing_address_id"))?;

        let store = match non_blank(&request.store_id) {
            Some(store_id) => {
                self.stores
                    .get(store_id)
                    .ok_or_else(|| PaymentError::StoreNotFound {
                        store_id: store_id.to_string(),
                    })?
            }
            None => self
                .stores
                .default_store()
                .ok_or_else(|| PaymentError::missing("store_id"))?,
        };

        let shipping = self.resolve_address(&request.user_id, shipping_id).await?;
        let _billing = self.resolve_address(&request.user_id, billing_id).await?;

        let mut checkout = request.checkout.clone();
        checkout.country = Some(shipping.country.clone());
        let breakdown = self.calculator.calculate(&checkout).await?;

        if breakdown.total_amount <= 0 {
            return Err(PaymentError::InvalidPrice {
                message: "order total must be greater than zero".to_string(),
            });
        }

        let parties = IntentParties {
            user_id: request.user_id.clone(),
            store_id: store.id.clone(),
            shipping_address_ref: shipping_id.to_string(),
            billing_address_ref: billing_id.to_string(),
        };
        let intent = self.reserve(&parties, &breakdown).await?;

        let currency = self.config.currency.as_str();
        let expiration_time = self
            .config
            .sign_expiration
            .then(|| SignatureService::format_expiration(intent.expires_at));
        let signature_integrity = self.signer.sign_intent(
            &intent.reference,
            intent.total_amount,
            currency,
            expiration_time.as_deref(),
        );

        info!(
            reference = %intent.reference,
            store_id = %store.id,
            amount_in_cents = intent.total_amount,
            expires_at = %intent.expires_at,
            "Issued payment intent"
        );

        let redirect_url = if store.redirect_url.is_empty() {
            self.config.redirect_url.clone().unwrap_or_default()
        } else {
            store.redirect_url_for(&intent.reference)
        };

        Ok(IssuedIntent {
            public_key: self.config.public_key.clone(),
            currency: currency.to_string(),
            amount_in_cents: intent.total_amount,
            reference: intent.reference,
            signature_integrity,
            expiration_time,
            redirect_url,
            customer_data: CustomerData {
                email: request.customer_email.clone(),
                full_name: shipping.recipient_name.clone(),
                phone_number: shipping.phone.clone(),
            },
            shipping_address: WidgetAddress::from(&shipping),
            breakdown,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pay_core::{
        CappedPercentagePolicy, CheckoutLine, Clock, Currency, DeliveryOption, DeliveryTable,
        InMemoryAddressBook, InMemoryIntentStore, InMemoryOrderStore, ManualClock, Price,
        Product, ProductCatalog, Store, TaxTable,
    };
    use std::sync::Mutex;

    struct Fixture {
        issuer: IntentIssuer,
        intents: Arc<InMemoryIntentStore>,
        addresses: Arc<InMemoryAddressBook>,
        clock: ManualClock,
    }

    fn address(id: &str) -> Address {
        Address {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            recipient_name: "Ana Gomez".to_string(),
            phone: "3001234567".to_string(),
            line1: "Calle 10 # 5-20".to_string(),
            line2: None,
            city: "Bogota".to_string(),
            region: "Cundinamarca".to_string(),
            country: "CO".to_string(),
            postal_code: None,
        }
    }

    fn fixture(config: WompiConfig) -> Fixture {
        let clock = ManualClock::default();
        let catalog = Arc::new(ProductCatalog::new().with_product(
            Product::new("jacket", "Jacket", Price::new(100.0, Currency::COP)).with_discount_bps(2_000),
        ));
        let calculator = CheckoutCalculator::new(catalog, Currency::COP)
            .with_tax_table(TaxTable::flat(800))
            .with_delivery_table(DeliveryTable::new(DeliveryOption::new(599, "3-5 business days")))
            .with_discount_policy(Arc::new(CappedPercentagePolicy::none()));
        let stores = StoreRegistry::with_default("centro")
            .with_store(Store::new("centro", "Centro", "centro.example.co"));
        let addresses = Arc::new(InMemoryAddressBook::new());
        addresses.insert(address("home"));
        let intents = Arc::new(InMemoryIntentStore::new(Arc::new(clock.clone())));
        let orders = Arc::new(InMemoryOrderStore::new());

        let issuer = IntentIssuer::new(
            config,
            calculator,
            stores,
            addresses.clone(),
            intents.clone(),
            orders,
            Arc::new(clock.clone()),
        );
        Fixture {
            issuer,
            intents,
            addresses,
            clock,
        }
    }

    fn config() -> WompiConfig {
        WompiConfig::new("pub_test_key", "test_integrity", "test_events")
    }

    fn request() -> IssueIntentRequest {
        IssueIntentRequest {
            user_id: "user-1".to_string(),
            store_id: None,
            shipping_address_id: Some("home".to_string()),
            billing_address_id: Some("home".to_string()),
            customer_email: Some("ana@example.co".to_string()),
            checkout: CheckoutRequest {
                items: vec![CheckoutLine::new("jacket", 2)],
                payment_method: Some("CARD".to_string()),
                delivery_description: Some("standard".to_string()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_issue_persists_and_signs() {
        let f = fixture(config());
        let issued = f.issuer.issue(request()).await.unwrap();

        assert_eq!(issued.amount_in_cents, 17_879);
        assert_eq!(issued.currency, "COP");
        assert_eq!(issued.public_key, "pub_test_key");
        assert!(issued.expiration_time.is_none());
        assert!(issued.redirect_url.ends_with(&format!("reference={}", issued.reference)));
        assert_eq!(issued.customer_data.full_name, "Ana Gomez");
        assert_eq!(issued.shipping_address.country, "CO");

        let signer = SignatureService::from_config(&config());
        assert_eq!(
            issued.signature_integrity,
            signer.sign_intent(&issued.reference, 17_879, "COP", None)
        );

        let intent = f
            .intents
            .find_by_reference(&issued.reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.total_amount, 17_879);
        assert_eq!(intent.store_id, "centro");
        assert_eq!(intent.expires_at, f.clock.now() + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_signed_expiration_matches_intent_expiry() {
        let f = fixture(config().with_signed_expiration(true));
        let issued = f.issuer.issue(request()).await.unwrap();

        let intent = f
            .intents
            .find_by_reference(&issued.reference)
            .await
            .unwrap()
            .unwrap();
        let expected_expiration = SignatureService::format_expiration(intent.expires_at);
        assert_eq!(issued.expiration_time.as_deref(), Some(expected_expiration.as_str()));

        let signer = SignatureService::from_config(&config());
        assert_eq!(
            issued.signature_integrity,
            signer.sign_intent(&issued.reference, 17_879, "COP", Some(&expected_expiration))
        );
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected_by_name() {
        let f = fixture(config());

        let mut req = request();
        req.shipping_address_id = None;
        let err = f.issuer.issue(req).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingField { ref field } if field == "shipping_address_id"));

        let mut req = request();
        req.billing_address_id = Some(" ".to_string());
        let err = f.issuer.issue(req).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingField { ref field } if field == "billing_address_id"));

        let mut req = request();
        req.checkout.items.clear();
        let err = f.issuer.issue(req).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingField { ref field } if field == "items"));

        assert!(f.intents.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_and_incomplete_addresses() {
        let f = fixture(config());

        let mut req = request();
        req.shipping_address_id = Some("office".to_string());
        let err = f.issuer.issue(req).await.unwrap_err();
        assert!(matches!(err, PaymentError::AddressNotFound { .. }));

        let mut broken = address("broken");
        broken.line1 = String::new();
        f.addresses.insert(broken);
        let mut req = request();
        req.billing_address_id = Some("broken".to_string());
        let err = f.issuer.issue(req).await.unwrap_err();
        assert!(matches!(err, PaymentError::IncompleteAddress { ref field, .. } if field == "line1"));
    }

    #[tokio::test]
    async fn test_unknown_store_is_rejected() {
        let f = fixture(config());
        let mut req = request();
        req.store_id = Some("sur".to_string());
        let err = f.issuer.issue(req).await.unwrap_err();
        assert!(matches!(err, PaymentError::StoreNotFound { ref store_id } if store_id == "sur"));
    }

    #[tokio::test]
    async fn test_store_id_required_without_default() {
        let mut f = fixture(config());
        f.issuer.stores = StoreRegistry::new();
        let err = f.issuer.issue(request()).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingField { ref field } if field == "store_id"));
    }

    #[tokio::test]
    async fn test_reference_collision_retries() {
        let sequence = Arc::new(Mutex::new(vec!["FRESH", "TAKEN"]));
        let source: ReferenceSource = {
            let sequence = sequence.clone();
            Arc::new(move || sequence.lock().unwrap().pop().unwrap_or("LAST").to_string())
        };
        let f = fixture(config());
        let issuer = f.issuer.with_reference_source(source);

        // Occupy "TAKEN" first
        let taken = pay_core::PendingIntent::from_breakdown(
            "TAKEN",
            IntentParties {
                user_id: "user-2".to_string(),
                store_id: "centro".to_string(),
                shipping_address_ref: "x".to_string(),
                billing_address_ref: "x".to_string(),
            },
            issuer.quote(&request().checkout).await.unwrap(),
            f.clock.now(),
            Duration::hours(1),
        );
        f.intents.create(taken).await.unwrap();

        let issued = issuer.issue(request()).await.unwrap();
        assert_eq!(issued.reference, "FRESH");
    }

    #[tokio::test]
    async fn test_reference_exhaustion() {
        let f = fixture(config());
        let issuer = f
            .issuer
            .with_reference_source(Arc::new(|| "SAME".to_string()));

        issuer.issue(request()).await.unwrap();
        let err = issuer.issue(request()).await.unwrap_err();
        assert!(matches!(
            err,
            PaymentError::ReferenceExhausted { attempts: MAX_REFERENCE_ATTEMPTS }
        ));
    }
}
