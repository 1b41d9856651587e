//! # Application State
//!
//! Shared state for the Axum application.
//! Wires the Wompi issuer, reconciler and status resolver over one set of
//! intent/order stores, loaded from `config/*.toml` and the environment.

use pay_core::{
    AddressBook, CheckoutCalculator, InMemoryAddressBook, InMemoryIntentStore, InMemoryOrderStore,
    IntentStore, OrderStore, PricingConfig, ProductCatalog, SharedClock, StatusResolver,
    StoreRegistry, SystemClock,
};
use pay_wompi::{IntentIssuer, SignatureService, WebhookReconciler, WompiConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of this service
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    pub log_format: LogFormat,
    /// How often expired intents are swept
    pub reap_interval: Duration,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let log_format = match std::env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_format,
            reap_interval: Duration::from_secs(
                std::env::var("INTENT_REAP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(60),
            ),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address {}:{}: {}", self.host, self.port, e))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Refuse permissive webhook verification in production
    pub fn check_webhook_mode(&self, wompi: &WompiConfig) -> anyhow::Result<()> {
        if self.is_production() && !wompi.strict_signatures {
            anyhow::bail!("WOMPI_STRICT_SIGNATURES=false is not allowed when ENVIRONMENT=production");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Loaded configuration files
#[derive(Debug, Default)]
pub struct Seeds {
    pub catalog: ProductCatalog,
    pub stores: StoreRegistry,
    pub pricing: PricingConfig,
    pub addresses: InMemoryAddressBook,
}

impl Seeds {
    /// Read every `config/*.toml`, falling back to empty/default tables
    pub fn load() -> anyhow::Result<Self> {
        let catalog = match read_config_file("products.toml") {
            Some((path, content)) => {
                let catalog = ProductCatalog::from_toml(&content)
                    .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
                info!(
                    "Loaded {} products ({} active) from {}",
                    catalog.products.len(),
                    catalog.active_products().count(),
                    path
                );
                catalog
            }
            None => {
                warn!("No product catalog found, using empty catalog");
                ProductCatalog::new()
            }
        };

        let stores = match read_config_file("stores.toml") {
            Some((path, content)) => {
                let stores = StoreRegistry::from_toml(&content)
                    .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
                info!("Loaded {} stores from {}", stores.len(), path);
                stores
            }
            None => {
                warn!("No store registry found, every intent request must fail");
                StoreRegistry::new()
            }
        };

        let pricing = match read_config_file("pricing.toml") {
            Some((path, content)) => PricingConfig::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?,
            None => {
                info!("No pricing.toml found, using default tax and delivery tables");
                PricingConfig::default()
            }
        };

        let addresses = match read_config_file("addresses.toml") {
            Some((path, content)) => {
                let book = InMemoryAddressBook::from_toml(&content)
                    .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
                info!("Seeded {} addresses from {}", book.len(), path);
                book
            }
            None => InMemoryAddressBook::new(),
        };

        Ok(Self {
            catalog,
            stores,
            pricing,
            addresses,
        })
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Gateway config
    pub wompi: WompiConfig,
    pub issuer: Arc<IntentIssuer>,
    pub reconciler: Arc<WebhookReconciler>,
    pub status: Arc<StatusResolver>,
    /// Shared with the reaper
    pub intents: Arc<dyn IntentStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl AppState {
    /// Build state from the environment and `config/` files
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();
        let wompi = WompiConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Wompi: {}", e))?;
        config.check_webhook_mode(&wompi)?;
        let seeds = Seeds::load()?;
        Ok(Self::from_parts(config, wompi, seeds, Arc::new(SystemClock)))
    }

    /// Wire everything over in-memory stores
    pub fn from_parts(
        config: AppConfig,
        wompi: WompiConfig,
        seeds: Seeds,
        clock: SharedClock,
    ) -> Self {
        let catalog = Arc::new(seeds.catalog);
        let addresses: Arc<dyn AddressBook> = Arc::new(seeds.addresses);
        let intents: Arc<dyn IntentStore> = Arc::new(InMemoryIntentStore::new(clock.clone()));
        let orders: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());

        let calculator = CheckoutCalculator::from_pricing(catalog, wompi.currency, seeds.pricing);
        let issuer = IntentIssuer::new(
            wompi.clone(),
            calculator,
            seeds.stores,
            addresses.clone(),
            intents.clone(),
            orders.clone(),
            clock.clone(),
        );
        let reconciler = WebhookReconciler::new(
            SignatureService::from_config(&wompi),
            intents.clone(),
            orders.clone(),
            addresses,
            clock,
        )
        .with_strict_signatures(wompi.strict_signatures);
        let status = StatusResolver::new(intents.clone(), orders.clone());

        Self {
            config,
            wompi,
            issuer: Arc::new(issuer),
            reconciler: Arc::new(reconciler),
            status: Arc::new(status),
            intents,
            orders,
        }
    }
}

/// Periodically drop expired intents. Readers already ignore them; this
/// only bounds memory.
pub async fn run_intent_reaper(intents: Arc<dyn IntentStore>, every: Duration) {
    info!(interval_secs = every.as_secs(), "Starting intent reaper");
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;
        match intents.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged expired intents"),
            Err(e) => error!(error = %e, "Intent reaper failed"),
        }
    }
}

/// Read `config/<name>` from the working directory or up to two parents
fn read_config_file(name: &str) -> Option<(String, String)> {
    ["config", "../config", "../../config"]
        .iter()
        .map(|dir| format!("{}/{}", dir, name))
        .find_map(|path| std::fs::read_to_string(&path).ok().map(|c| (path, c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use pay_core::{Clock, ManualClock, PendingIntent};

    #[test]
    fn test_app_config_defaults() {
        // Clear env vars for test
        std::env::remove_var("HOST");
        std::env::remove_var("PORT");
        std::env::remove_var("BASE_URL");
        std::env::remove_var("INTENT_REAP_INTERVAL_SECS");

        let config = AppConfig::from_env();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.reap_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_socket_addr() {
        let config = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            environment: "test".to_string(),
            log_format: LogFormat::Pretty,
            reap_interval: Duration::from_secs(60),
        };

        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:3000");

        let bad = AppConfig {
            host: "not a host".to_string(),
            ..config
        };
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn test_permissive_webhooks_refused_in_production() {
        let production = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_url: "https://pay.example.co".to_string(),
            environment: "production".to_string(),
            log_format: LogFormat::Json,
            reap_interval: Duration::from_secs(60),
        };
        let strict = WompiConfig::new("pub_prod_key", "prod_integrity", "prod_events");
        assert!(production.check_webhook_mode(&strict).is_ok());

        let permissive = strict.clone().with_strict_signatures(false);
        assert!(production.check_webhook_mode(&permissive).is_err());

        let staging = AppConfig {
            environment: "staging".to_string(),
            ..production
        };
        assert!(staging.check_webhook_mode(&permissive).is_ok());
    }

    #[test]
    fn test_shipped_config_files_parse() {
        let catalog = ProductCatalog::from_toml(include_str!("../../../config/products.toml")).unwrap();
        assert_eq!(catalog.products.len(), 4);
        assert_eq!(catalog.active_products().count(), 3);

        let stores = StoreRegistry::from_toml(include_str!("../../../config/stores.toml")).unwrap();
        assert_eq!(stores.default_store().map(|s| s.id.as_str()), Some("bogota-centro"));

        let pricing = PricingConfig::from_toml(include_str!("../../../config/pricing.toml")).unwrap();
        assert_eq!(pricing.tax.rate_for(Some("CO")), 1_900);
        assert_eq!(pricing.delivery.lookup("Express").cost, 1_599);

        let addresses =
            InMemoryAddressBook::from_toml(include_str!("../../../config/addresses.toml")).unwrap();
        assert_eq!(addresses.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_purges_expired_intents() {
        let clock = ManualClock::default();
        let intents: Arc<dyn IntentStore> =
            Arc::new(InMemoryIntentStore::new(Arc::new(clock.clone())));

        let breakdown = pay_core::CheckoutBreakdown {
            lines: vec![],
            currency: pay_core::Currency::COP,
            subtotal: 100,
            tax_rate_bps: 0,
            tax_amount: 0,
            shipping_cost: 0,
            coupon_discount: 0,
            points_discount: 0,
            wallet_discount: 0,
            discount_amount: 0,
            total_amount: 100,
            payment_method: "CARD".to_string(),
            delivery_description: "pickup".to_string(),
            estimated_delivery: "today".to_string(),
            coupon: None,
        };
        let intent = PendingIntent::from_breakdown(
            "REF1",
            pay_core::IntentParties {
                user_id: "user-1".to_string(),
                store_id: "centro".to_string(),
                shipping_address_ref: "home".to_string(),
                billing_address_ref: "home".to_string(),
            },
            breakdown,
            clock.now(),
            ChronoDuration::minutes(5),
        );
        intents.create(intent).await.unwrap();
        clock.advance(ChronoDuration::minutes(10));

        let reaper = tokio::spawn(run_intent_reaper(intents.clone(), Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_secs(2)).await;
        reaper.abort();

        assert_eq!(intents.purge_expired().await.unwrap(), 0);
    }
}
