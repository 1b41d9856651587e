//! # storefront-pay
//!
//! Wompi checkout and payment reconciliation service.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export WOMPI_PUBLIC_KEY=pub_test_...
//! export WOMPI_INTEGRITY_SECRET=test_integrity_...
//! export WOMPI_EVENTS_SECRET=test_events_...
//!
//! # Run the server
//! storefront-pay
//! ```

use pay_api::{
    routes,
    state::{run_intent_reaper, AppConfig, AppState, LogFormat},
};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(AppConfig::from_env().log_format);

    print_banner();

    let state = AppState::new()?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!(
        "Wompi mode: {}, currency: {}",
        if state.wompi.is_live_mode() { "production" } else { "sandbox" },
        state.wompi.currency
    );
    if !state.wompi.strict_signatures {
        warn!("WOMPI_STRICT_SIGNATURES is disabled: unverified webhooks will be processed");
    }
    if is_prod && state.wompi.is_test_mode() {
        warn!("Running in production with sandbox Wompi keys");
    }
    if state.wompi.events_secret.is_none() {
        warn!("WOMPI_EVENTS_SECRET is not set: no webhook can be verified");
    }

    tokio::spawn(run_intent_reaper(
        state.intents.clone(),
        state.config.reap_interval,
    ));

    let app = routes::create_router(state);

    info!("storefront-pay starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Intent: POST http://{}/api/v1/payments/intent", addr);
        info!("Webhook: POST http://{}/webhook/wompi", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let (json, pretty) = match format {
        LogFormat::Json => (Some(fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();
}

fn print_banner() {
    println!(
        r#"
  storefront-pay
  ━━━━━━━━━━━━━━━━━━━━━━━
  Wompi checkout service
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
