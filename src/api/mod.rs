//! HTTP surface.

pub mod admin;
pub mod cart;
pub mod error;
pub mod extract;
pub mod orders;
pub mod payments;

use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::infrastructure::stripe::WebhookVerifier;
use crate::ports::{CartRepository, CredentialVerifier, Notifier, OrderRepository, PaymentProcessor, ProductCatalog};
use crate::services::{CartService, IdentityResolver, OrderFactory, OrderLifecycle, PaymentBridge};

/// The outside world, as the services see it.
pub struct Adapters {
    pub carts: Arc<dyn CartRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub notifier: Arc<dyn Notifier>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub credentials: Arc<dyn CredentialVerifier>,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub tax_rate: Decimal,
    pub currency: String,
    pub payment_timeout: Duration,
    pub webhooks: WebhookVerifier,
}

#[derive(Clone)]
pub struct AppState {
    pub identity: IdentityResolver,
    pub carts: CartService,
    pub checkout: OrderFactory,
    pub orders: OrderLifecycle,
    pub payments: PaymentBridge,
}

impl AppState {
    pub fn assemble(adapters: Adapters, settings: Settings) -> Self {
        let orders = OrderLifecycle::new(adapters.orders.clone(), adapters.notifier);
        Self {
            identity: IdentityResolver::new(adapters.credentials),
            carts: CartService::new(adapters.carts.clone(), adapters.catalog.clone()),
            checkout: OrderFactory::new(
                adapters.carts,
                adapters.catalog,
                adapters.orders.clone(),
                orders.clone(),
                settings.tax_rate,
            ),
            payments: PaymentBridge::new(
                adapters.processor,
                adapters.orders,
                orders.clone(),
                settings.webhooks,
                settings.currency,
                settings.payment_timeout,
            ),
            orders,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-storefront"})) }))
        .route("/api/v1/cart", get(cart::get_cart).delete(cart::clear_cart))
        .route("/api/v1/cart/items", post(cart::add_item))
        .route("/api/v1/cart/items/:product_id", patch(cart::update_item).delete(cart::remove_item))
        .route("/api/v1/cart/shipping", put(cart::set_shipping))
        .route("/api/v1/cart/transfer", post(cart::transfer))
        .route("/api/v1/orders", get(orders::list_orders).post(orders::create_order))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/orders/:id/cancel", post(orders::cancel_order))
        .route("/api/v1/payments/intent", post(payments::create_intent))
        .route("/api/v1/payments/confirm", post(payments::confirm))
        .route("/api/v1/payments/webhook", post(payments::webhook))
        .route("/api/v1/admin/orders", get(admin::list_orders))
        .route("/api/v1/admin/orders/:id/status", patch(admin::set_status))
        .route("/api/v1/admin/orders/:id/payment-status", patch(admin::set_payment_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
