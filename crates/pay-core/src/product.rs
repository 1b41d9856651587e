//! # Product Types
//!
//! Money, currency and catalog types for storefront-pay.
//! Products are loaded from `config/products.toml`.

use crate::error::{PaymentError, PaymentResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Basis points in one whole (100 bps = 1%)
pub const BPS_SCALE: i64 = 10_000;

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    COP,
    USD,
    EUR,
    MXN,
}

impl Currency {
    /// Returns the ISO 4217 currency code as sent to the gateway
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::COP => "COP",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::MXN => "MXN",
        }
    }

    /// Parse an ISO 4217 code (case-insensitive)
    pub fn from_code(code: &str) -> PaymentResult<Self> {
        match code.trim().to_uppercase().as_str() {
            "COP" => Ok(Currency::COP),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "MXN" => Ok(Currency::MXN),
            other => Err(PaymentError::UnsupportedCurrency {
                currency: other.to_string(),
            }),
        }
    }

    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u8 {
        2
    }

    /// Convert a decimal amount to the smallest currency unit, rounding half-up
    pub fn to_smallest_unit(&self, amount: f64) -> i64 {
        let multiplier = 10_f64.powi(self.decimal_places() as i32);
        // Snap to 6 decimals first so 10.005 * 100 = 1000.4999.. still rounds up
        let scaled = ((amount * multiplier) * 1e6).round() / 1e6;
        scaled.round() as i64
    }

    /// Like [`Currency::to_smallest_unit`], but rejects negative and non-finite amounts
    pub fn try_to_smallest_unit(&self, amount: f64) -> PaymentResult<i64> {
        if !amount.is_finite() {
            return Err(PaymentError::InvalidPrice {
                message: format!("amount {} is not a finite number", amount),
            });
        }
        if amount < 0.0 {
            return Err(PaymentError::InvalidPrice {
                message: format!("amount {} is negative", amount),
            });
        }
        Ok(self.to_smallest_unit(amount))
    }

    /// Convert from smallest unit back to decimal
    pub fn from_smallest_unit(&self, amount: i64) -> f64 {
        let divisor = 10_f64.powi(self.decimal_places() as i32);
        amount as f64 / divisor
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::COP
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `amount × bps / 10_000`, rounded half-up to the nearest minor unit.
///
/// Only meaningful for non-negative amounts, which is all the checkout ever feeds it.
/// Saturates at `i64::MAX` for rates above 100%.
pub fn percent_of(amount: i64, bps: u32) -> i64 {
    let raw = amount as i128 * bps as i128;
    i64::try_from((raw + (BPS_SCALE as i128 / 2)) / BPS_SCALE as i128).unwrap_or(i64::MAX)
}

/// Price with amount in smallest currency unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in smallest currency unit (cents)
    pub amount: i64,
    /// Currency
    pub currency: Currency,
}

impl Price {
    /// Create a new price from decimal amount
    pub fn new(amount: f64, currency: Currency) -> Self {
        Self {
            amount: currency.to_smallest_unit(amount),
            currency,
        }
    }

    /// Create a price from smallest unit (cents)
    pub fn from_cents(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }
}

/// A product in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier (e.g., "tee-black-m")
    pub id: String,

    /// Display name
    pub name: String,

    /// List price
    pub price: Price,

    /// Discount in basis points (2000 = 20% off)
    #[serde(default)]
    pub discount_bps: u32,

    /// Units on hand, when the catalog tracks stock for this product
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,

    /// Whether this product is active and available for purchase
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Product {
    /// Create a new product with no discount and untracked stock
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Price) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            discount_bps: 0,
            stock: None,
            active: true,
        }
    }

    /// Builder: set discount in basis points
    pub fn with_discount_bps(mut self, bps: u32) -> Self {
        self.discount_bps = bps;
        self
    }

    /// Builder: set tracked stock
    pub fn with_stock(mut self, stock: u32) -> Self {
        self.stock = Some(stock);
        self
    }

    /// Unit price after the product discount
    pub fn sale_price(&self) -> i64 {
        if self.discount_bps > 0 {
            let bps = BPS_SCALE.saturating_sub(self.discount_bps as i64).max(0) as u32;
            percent_of(self.price.amount, bps)
        } else {
            self.price.amount
        }
    }

    /// Returns the available stock when it constrains this purchase
    ///
    /// Only a positive tracked count is enforced; zero or untracked stock is not checked.
    pub fn stock_shortfall(&self, requested: u32) -> Option<u32> {
        match self.stock {
            Some(available) if available > 0 && available < requested => Some(available),
            _ => None,
        }
    }
}

/// Read access to current product prices and stock.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Look up a product by id
    async fn product(&self, product_id: &str) -> PaymentResult<Option<Product>>;
}

/// Product catalog (loaded from config)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductCatalog {
    pub products: Vec<Product>,
}

impl ProductCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            products: Vec::new(),
        }
    }

    /// Add a product to the catalog
    pub fn add(&mut self, product: Product) {
        self.products.push(product);
    }

    /// Builder: add a product
    pub fn with_product(mut self, product: Product) -> Self {
        self.add(product);
        self
    }

    /// Find a product by ID
    pub fn get(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Get all active products
    pub fn active_products(&self) -> impl Iterator<Item = &Product> {
        self.products.iter().filter(|p| p.active)
    }

    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

#[async_trait]
impl CatalogSource for ProductCatalog {
    async fn product(&self, product_id: &str) -> PaymentResult<Option<Product>> {
        Ok(self.get(product_id).cloned())
    }
}
