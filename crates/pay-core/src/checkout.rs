//! # Checkout Calculator
//!
//! Turns cart lines plus delivery, coupon and loyalty choices into a full
//! price breakdown. Everything is computed in integer minor units; rates are
//! basis points.
//!
//! ```text
//! subtotal  = Σ sale_price × quantity
//! tax       = subtotal × rate(country)
//! shipping  = delivery_table[delivery_description]  (or fallback)
//! discount  = coupon + points + wallet              (each capped by policy)
//! total     = max(0, subtotal + tax + shipping − discount)
//! ```

use crate::error::{PaymentError, PaymentResult};
use crate::product::{percent_of, CatalogSource, Currency};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A requested cart line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

/// Largest quantity accepted on a single cart line
pub const MAX_LINE_QUANTITY: u32 = 10_000;

fn default_quantity() -> u32 {
    1
}

impl CheckoutLine {
    pub fn new(product_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Loyalty balances the shopper chose to apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyOptions {
    #[serde(default)]
    pub use_points: bool,
    #[serde(default)]
    pub use_wallet: bool,
}

/// Input to the calculator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Vec<CheckoutLine>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub delivery_description: Option<String>,
    #[serde(default)]
    pub coupon: Option<String>,
    #[serde(default)]
    pub loyalty: LoyaltyOptions,
    /// Destination country (ISO alpha-2), drives the tax rate
    #[serde(default)]
    pub country: Option<String>,
}

impl CheckoutRequest {
    /// Reject requests missing anything the breakdown depends on
    pub fn validate(&self) -> PaymentResult<()> {
        if self.items.is_empty() {
            return Err(PaymentError::missing("items"));
        }
        if let Some(line) = self.items.iter().find(|l| l.quantity == 0) {
            return Err(PaymentError::InvalidRequest(format!(
                "quantity for product {} must be at least 1",
                line.product_id
            )));
        }
        if let Some(line) = self.items.iter().find(|l| l.quantity > MAX_LINE_QUANTITY) {
            return Err(PaymentError::InvalidRequest(format!(
                "quantity for product {} must be at most {}",
                line.product_id, MAX_LINE_QUANTITY
            )));
        }
        if let Some(line) = self.items.iter().find(|l| l.product_id.trim().is_empty()) {
            return Err(PaymentError::InvalidRequest(format!(
                "line with quantity {} has an empty product_id",
                line.quantity
            )));
        }
        if blank(&self.payment_method) {
            return Err(PaymentError::missing("payment_method"));
        }
        if blank(&self.delivery_description) {
            return Err(PaymentError::missing("delivery_description"));
        }
        Ok(())
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).map_or(true, str::is_empty)
}

fn out_of_range(what: &str) -> PaymentError {
    PaymentError::InvalidPrice {
        message: format!("{} exceeds the representable amount", what),
    }
}

/// A priced, frozen cart line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    /// List price per unit
    pub unit_price: i64,
    pub discount_bps: u32,
    /// Unit price after the product discount
    pub sale_price: i64,
    pub line_total: i64,
}

/// Country → tax rate lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxTable {
    pub default_bps: u32,
    #[serde(default)]
    pub overrides: HashMap<String, u32>,
}

impl TaxTable {
    pub fn flat(default_bps: u32) -> Self {
        Self {
            default_bps,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, country: impl Into<String>, bps: u32) -> Self {
        self.overrides.insert(country.into().to_uppercase(), bps);
        self
    }

    pub fn rate_for(&self, country: Option<&str>) -> u32 {
        country
            .map(|c| c.trim().to_uppercase())
            .and_then(|c| self.overrides.get(&c).copied())
            .unwrap_or(self.default_bps)
    }
}

impl Default for TaxTable {
    fn default() -> Self {
        Self::flat(800).with_override("CO", 1_900)
    }
}

/// Cost and delivery estimate for one delivery method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOption {
    pub cost: i64,
    pub estimated: String,
}

impl DeliveryOption {
    pub fn new(cost: i64, estimated: impl Into<String>) -> Self {
        Self {
            cost,
            estimated: estimated.into(),
        }
    }
}

/// Delivery method → cost table with a fallback for unknown methods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTable {
    #[serde(default)]
    pub options: HashMap<String, DeliveryOption>,
    pub fallback: DeliveryOption,
}

impl DeliveryTable {
    pub fn new(fallback: DeliveryOption) -> Self {
        Self {
            options: HashMap::new(),
            fallback,
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, option: DeliveryOption) -> Self {
        self.options.insert(key.into().to_lowercase(), option);
        self
    }

    pub fn lookup(&self, description: &str) -> &DeliveryOption {
        self.options
            .get(&description.trim().to_lowercase())
            .unwrap_or(&self.fallback)
    }
}

impl Default for DeliveryTable {
    fn default() -> Self {
        Self::new(DeliveryOption::new(599, "5-7 business days"))
            .with_option("standard", DeliveryOption::new(599, "3-5 business days"))
            .with_option("express", DeliveryOption::new(1_599, "1-2 business days"))
            .with_option("pickup", DeliveryOption::new(0, "Same day"))
    }
}

/// Discounts granted on top of product prices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountBreakdown {
    pub coupon: i64,
    pub points: i64,
    pub wallet: i64,
}

impl DiscountBreakdown {
    pub fn total(&self) -> i64 {
        self.coupon
            .saturating_add(self.points)
            .saturating_add(self.wallet)
    }
}

/// Decides coupon and loyalty discounts for a subtotal.
///
/// Implementations must keep each component within a fixed share of the subtotal.
pub trait DiscountPolicy: Send + Sync {
    fn discounts(
        &self,
        subtotal: i64,
        coupon: Option<&str>,
        loyalty: LoyaltyOptions,
    ) -> DiscountBreakdown;
}

/// Flat percentages of the subtotal for each discount source.
///
/// The shipped numbers are placeholders, not business rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CappedPercentagePolicy {
    pub coupon_bps: u32,
    pub points_bps: u32,
    pub wallet_bps: u32,
}

impl CappedPercentagePolicy {
    /// Policy that never discounts
    pub fn none() -> Self {
        Self {
            coupon_bps: 0,
            points_bps: 0,
            wallet_bps: 0,
        }
    }
}

impl Default for CappedPercentagePolicy {
    fn default() -> Self {
        Self {
            coupon_bps: 1_000,
            points_bps: 500,
            wallet_bps: 500,
        }
    }
}

impl DiscountPolicy for CappedPercentagePolicy {
    fn discounts(
        &self,
        subtotal: i64,
        coupon: Option<&str>,
        loyalty: LoyaltyOptions,
    ) -> DiscountBreakdown {
        let has_coupon = coupon.map(str::trim).map_or(false, |c| !c.is_empty());
        DiscountBreakdown {
            coupon: if has_coupon { percent_of(subtotal, self.coupon_bps) } else { 0 },
            points: if loyalty.use_points { percent_of(subtotal, self.points_bps) } else { 0 },
            wallet: if loyalty.use_wallet { percent_of(subtotal, self.wallet_bps) } else { 0 },
        }
    }
}

/// Pricing tables as loaded from `config/pricing.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub tax: TaxTable,
    #[serde(default)]
    pub delivery: DeliveryTable,
    #[serde(default)]
    pub discounts: CappedPercentagePolicy,
}

impl PricingConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

/// Full price breakdown for a cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutBreakdown {
    pub lines: Vec<PricedLine>,
    pub currency: Currency,
    pub subtotal: i64,
    pub tax_rate_bps: u32,
    pub tax_amount: i64,
    pub shipping_cost: i64,
    pub coupon_discount: i64,
    pub points_discount: i64,
    pub wallet_discount: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub payment_method: String,
    pub delivery_description: String,
    pub estimated_delivery: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<String>,
}

/// Computes [`CheckoutBreakdown`]s against the live catalog
#[derive(Clone)]
pub struct CheckoutCalculator {
    catalog: Arc<dyn CatalogSource>,
    tax: TaxTable,
    delivery: DeliveryTable,
    discounts: Arc<dyn DiscountPolicy>,
    currency: Currency,
}

impl CheckoutCalculator {
    pub fn new(catalog: Arc<dyn CatalogSource>, currency: Currency) -> Self {
        Self {
            catalog,
            tax: TaxTable::default(),
            delivery: DeliveryTable::default(),
            discounts: Arc::new(CappedPercentagePolicy::default()),
            currency,
        }
    }

    /// Build from loaded pricing tables
    pub fn from_pricing(
        catalog: Arc<dyn CatalogSource>,
        currency: Currency,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            catalog,
            tax: pricing.tax,
            delivery: pricing.delivery,
            discounts: Arc::new(pricing.discounts),
            currency,
        }
    }

    pub fn with_tax_table(mut self, tax: TaxTable) -> Self {
        self.tax = tax;
        self
    }

    pub fn with_delivery_table(mut self, delivery: DeliveryTable) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_discount_policy(mut self, policy: Arc<dyn DiscountPolicy>) -> Self {
        self.discounts = policy;
        self
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Price a single line, enforcing availability and stock
    async fn price_line(&self, line: &CheckoutLine) -> PaymentResult<PricedLine> {
        let product = self
            .catalog
            .product(&line.product_id)
            .await?
            .ok_or_else(|| PaymentError::ProductNotFound {
                product_id: line.product_id.clone(),
            })?;

        if !product.active {
            return Err(PaymentError::InvalidRequest(format!(
                "Product is not available: {}",
                product.id
            )));
        }
        if product.price.currency != self.currency {
            return Err(PaymentError::UnsupportedCurrency {
                currency: product.price.currency.to_string(),
            });
        }
        if let Some(available) = product.stock_shortfall(line.quantity) {
            return Err(PaymentError::InsufficientStock {
                product_id: product.id.clone(),
                requested: line.quantity,
                available,
            });
        }

        let sale_price = product.sale_price();
        let line_total = sale_price
            .checked_mul(i64::from(line.quantity))
            .ok_or_else(|| out_of_range(&format!("line total for product {}", product.id)))?;
        Ok(PricedLine {
            product_id: product.id.clone(),
            name: product.name.clone(),
            quantity: line.quantity,
            unit_price: product.price.amount,
            discount_bps: product.discount_bps,
            sale_price,
            line_total,
        })
    }

    /// Compute the breakdown for a cart
    pub async fn calculate(&self, request: &CheckoutRequest) -> PaymentResult<CheckoutBreakdown> {
        request.validate()?;

        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            lines.push(self.price_line(item).await?);
        }

        let subtotal = lines
            .iter()
            .try_fold(0_i64, |acc, l| acc.checked_add(l.line_total))
            .ok_or_else(|| out_of_range("subtotal"))?;
        let tax_rate_bps = self.tax.rate_for(request.country.as_deref());
        let tax_amount = percent_of(subtotal, tax_rate_bps);

        let delivery_description = request.delivery_description.clone().unwrap_or_default();
        let delivery = self.delivery.lookup(&delivery_description);

        let discounts =
            self.discounts
                .discounts(subtotal, request.coupon.as_deref(), request.loyalty);
        let discount_amount = discounts.total().min(subtotal).max(0);

        let total_amount = subtotal
            .checked_add(tax_amount)
            .and_then(|t| t.checked_add(delivery.cost))
            .and_then(|t| t.checked_sub(discount_amount))
            .ok_or_else(|| out_of_range("order total"))?
            .max(0);

        debug!(
            subtotal,
            tax_amount,
            shipping = delivery.cost,
            discount_amount,
            total_amount,
            "Calculated checkout breakdown"
        );

        Ok(CheckoutBreakdown {
            lines,
            currency: self.currency,
            subtotal,
            tax_rate_bps,
            tax_amount,
            shipping_cost: delivery.cost,
            coupon_discount: discounts.coupon,
            points_discount: discounts.points,
            wallet_discount: discounts.wallet,
            discount_amount,
            total_amount,
            payment_method: request.payment_method.clone().unwrap_or_default(),
            delivery_description,
            estimated_delivery: delivery.estimated.clone(),
            coupon: request
                .coupon
                .clone()
                .filter(|c| !c.trim().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{Price, Product, ProductCatalog};

    fn catalog() -> Arc<dyn CatalogSource> {
        Arc::new(
            ProductCatalog::new()
                .with_product(
                    Product::new("jacket", "Jacket", Price::new(100.0, Currency::COP))
                        .with_discount_bps(2_000),
                )
                .with_product(Product::new("cap", "Cap", Price::new(25.0, Currency::COP)).with_stock(1))
                .with_product(Product::new("usd-only", "Import", Price::new(5.0, Currency::USD))),
        )
    }

    fn calculator() -> CheckoutCalculator {
        CheckoutCalculator::new(catalog(), Currency::COP)
            .with_tax_table(TaxTable::flat(800))
            .with_delivery_table(DeliveryTable::new(DeliveryOption::new(599, "3-5 business days")))
            .with_discount_policy(Arc::new(CappedPercentagePolicy::none()))
    }

    fn request(items: Vec<CheckoutLine>) -> CheckoutRequest {
        CheckoutRequest {
            items,
            payment_method: Some("CARD".to_string()),
            delivery_description: Some("standard".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_worked_example() {
        let breakdown = calculator()
            .calculate(&request(vec![CheckoutLine::new("jacket", 2)]))
            .await
            .unwrap();

        assert_eq!(breakdown.lines[0].sale_price, 8_000);
        assert_eq!(breakdown.lines[0].line_total, 16_000);
        assert_eq!(breakdown.subtotal, 16_000);
        assert_eq!(breakdown.tax_amount, 1_280);
        assert_eq!(breakdown.shipping_cost, 599);
        assert_eq!(breakdown.discount_amount, 0);
        assert_eq!(breakdown.total_amount, 17_879);
        assert_eq!(breakdown.estimated_delivery, "3-5 business days");
    }

    #[tokio::test]
    async fn test_missing_fields_are_named() {
        let calc = calculator();

        let err = calc.calculate(&request(vec![])).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingField { ref field } if field == "items"));

        let mut req = request(vec![CheckoutLine::new("jacket", 1)]);
        req.payment_method = None;
        let err = calc.calculate(&req).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingField { ref field } if field == "payment_method"));

        let mut req = request(vec![CheckoutLine::new("jacket", 1)]);
        req.delivery_description = Some("  ".to_string());
        let err = calc.calculate(&req).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingField { ref field } if field == "delivery_description"));
    }

    #[tokio::test]
    async fn test_insufficient_stock_names_product() {
        let err = calculator()
            .calculate(&request(vec![CheckoutLine::new("cap", 2)]))
            .await
            .unwrap_err();

        match err {
            PaymentError::InsufficientStock { product_id, available, .. } => {
                assert_eq!(product_id, "cap");
                assert_eq!(available, 1);
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_product_and_currency_mismatch() {
        let calc = calculator();
        let err = calc
            .calculate(&request(vec![CheckoutLine::new("ghost", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::ProductNotFound { .. }));

        let err = calc
            .calculate(&request(vec![CheckoutLine::new("usd-only", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::UnsupportedCurrency { .. }));
    }

    #[tokio::test]
    async fn test_country_rate_and_delivery_fallback() {
        let calc = calculator()
            .with_tax_table(TaxTable::flat(800).with_override("co", 1_900))
            .with_delivery_table(
                DeliveryTable::new(DeliveryOption::new(700, "5-7 business days"))
                    .with_option("Express", DeliveryOption::new(1_500, "next day")),
            );

        let mut req = request(vec![CheckoutLine::new("cap", 1)]);
        req.country = Some("CO".to_string());
        req.delivery_description = Some("EXPRESS".to_string());
        let breakdown = calc.calculate(&req).await.unwrap();
        assert_eq!(breakdown.tax_rate_bps, 1_900);
        assert_eq!(breakdown.tax_amount, 475);
        assert_eq!(breakdown.shipping_cost, 1_500);

        req.delivery_description = Some("carrier pigeon".to_string());
        let breakdown = calc.calculate(&req).await.unwrap();
        assert_eq!(breakdown.shipping_cost, 700);
        assert_eq!(breakdown.estimated_delivery, "5-7 business days");
    }

    #[tokio::test]
    async fn test_discounts_are_capped_and_total_never_negative() {
        struct Greedy;
        impl DiscountPolicy for Greedy {
            fn discounts(&self, subtotal: i64, _: Option<&str>, _: LoyaltyOptions) -> DiscountBreakdown {
                DiscountBreakdown {
                    coupon: subtotal * 3,
                    points: 0,
                    wallet: 0,
                }
            }
        }

        let calc = calculator()
            .with_tax_table(TaxTable::flat(0))
            .with_delivery_table(DeliveryTable::new(DeliveryOption::new(0, "pickup")))
            .with_discount_policy(Arc::new(Greedy));
        let breakdown = calc
            .calculate(&request(vec![CheckoutLine::new("cap", 1)]))
            .await
            .unwrap();
        assert_eq!(breakdown.discount_amount, breakdown.subtotal);
        assert_eq!(breakdown.total_amount, 0);
    }

    #[tokio::test]
    async fn test_default_policy_applies_loyalty() {
        let calc = calculator().with_discount_policy(Arc::new(CappedPercentagePolicy::default()));
        let mut req = request(vec![CheckoutLine::new("jacket", 2)]);
        req.coupon = Some("WELCOME".to_string());
        req.loyalty = LoyaltyOptions {
            use_points: true,
            use_wallet: false,
        };

        let breakdown = calc.calculate(&req).await.unwrap();
        assert_eq!(breakdown.coupon_discount, 1_600);
        assert_eq!(breakdown.points_discount, 800);
        assert_eq!(breakdown.wallet_discount, 0);
        assert_eq!(breakdown.discount_amount, 2_400);
        assert_eq!(breakdown.total_amount, 16_000 + 1_280 + 599 - 2_400);
    }

    #[tokio::test]
    async fn test_quantity_above_cap_is_rejected() {
        let err = calculator()
            .calculate(&request(vec![CheckoutLine::new("jacket", 2_147_483_649)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidRequest(_)));

        let ok = calculator()
            .calculate(&request(vec![CheckoutLine::new("jacket", MAX_LINE_QUANTITY)]))
            .await
            .unwrap();
        assert_eq!(ok.subtotal, 8_000 * MAX_LINE_QUANTITY as i64);
    }

    #[tokio::test]
    async fn test_overflowing_totals_are_rejected() {
        let catalog: Arc<dyn CatalogSource> = Arc::new(
            ProductCatalog::new()
                .with_product(Product::new(
                    "moto",
                    "Motorcycle",
                    Price::from_cents(i64::MAX / 2, Currency::COP),
                ))
                .with_product(Product::new(
                    "yacht",
                    "Yacht",
                    Price::from_cents(i64::MAX / 3, Currency::COP),
                )),
        );
        let calc = CheckoutCalculator::new(catalog, Currency::COP)
            .with_tax_table(TaxTable::flat(0))
            .with_discount_policy(Arc::new(CappedPercentagePolicy::none()));

        // one line overflows on its own
        let err = calc
            .calculate(&request(vec![CheckoutLine::new("moto", 3)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidPrice { .. }));

        // each line fits, the subtotal does not
        let err = calc
            .calculate(&request(vec![
                CheckoutLine::new("moto", 1),
                CheckoutLine::new("yacht", 2),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidPrice { .. }));

        // the subtotal fits, shipping pushes it over
        let err = calc
            .calculate(&request(vec![CheckoutLine::new("moto", 2)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidPrice { .. }));
    }

    #[test]
    fn test_pricing_from_toml() {
        let pricing = PricingConfig::from_toml(
            r#"
            [tax]
            default_bps = 800
            overrides = { CO = 1900 }

            [delivery]
            fallback = { cost = 599, estimated = "5-7 business days" }
            options = { express = { cost = 1599, estimated = "1-2 business days" } }

            [discounts]
            coupon_bps = 1000
            points_bps = 0
            wallet_bps = 0
            "#,
        )
        .unwrap();

        assert_eq!(pricing.tax.rate_for(Some("co")), 1_900);
        assert_eq!(pricing.delivery.lookup("express").cost, 1_599);
        assert_eq!(pricing.discounts.points_bps, 0);
    }
}
