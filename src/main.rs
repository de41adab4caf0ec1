//! OpenSASE Storefront - cart and order lifecycle service

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_storefront::api::{self, Adapters, AppState, Settings};
use opensase_storefront::config::AppConfig;
use opensase_storefront::infrastructure::jwt::JwtVerifier;
use opensase_storefront::infrastructure::nats::{LogNotifier, NatsNotifier};
use opensase_storefront::infrastructure::postgres::{PgCartRepository, PgOrderRepository, PgProductCatalog};
use opensase_storefront::infrastructure::stripe::{StripeProcessor, WebhookVerifier};
use opensase_storefront::ports::Notifier;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::debug!(?config, "configuration loaded");

    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let notifier: Arc<dyn Notifier> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsNotifier::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order emails will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let payment = &config.payment;
    let adapters = Adapters {
        carts: Arc::new(PgCartRepository::new(db.clone())),
        orders: Arc::new(PgOrderRepository::new(db.clone())),
        catalog: Arc::new(PgProductCatalog::new(db)),
        notifier,
        processor: Arc::new(StripeProcessor::new(&payment.api_base, &payment.api_key, payment.timeout)?),
        credentials: Arc::new(JwtVerifier::new(&config.jwt_secret)),
    };
    let settings = Settings {
        tax_rate: config.tax_rate,
        currency: payment.currency.clone(),
        payment_timeout: payment.timeout,
        webhooks: WebhookVerifier::new(&payment.webhook_secret, payment.webhook_tolerance),
    };
    let app = api::router(AppState::assemble(adapters, settings));

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("OpenSASE Storefront listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
