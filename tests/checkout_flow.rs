//! End-to-end flows through the HTTP router over in-memory adapters.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use opensase_storefront::api::{self, Adapters, AppState, Settings};
use opensase_storefront::infrastructure::jwt::{Claims, JwtVerifier};
use opensase_storefront::infrastructure::memory::{
    InMemoryCartRepository, InMemoryCatalog, InMemoryOrderRepository, RecordingNotifier,
};
use opensase_storefront::infrastructure::stripe::WebhookVerifier;
use opensase_storefront::ports::{IntentStatus, PaymentIntent, PaymentProcessor, ProductSnapshot};
use opensase_storefront::Result;

const JWT_SECRET: &str = "integration-jwt-secret";
const WEBHOOK_SECRET: &str = "whsec_integration";

#[derive(Default)]
struct FakeProcessor {
    created: Mutex<Vec<(i64, BTreeMap<String, String>)>>,
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_payment_intent(&self, amount_minor: i64, _currency: &str, metadata: &BTreeMap<String, String>) -> Result<PaymentIntent> {
        let mut created = self.created.lock().await;
        created.push((amount_minor, metadata.clone()));
        let intent_id = format!("pi_test_{}", created.len());
        Ok(PaymentIntent { client_secret: format!("{intent_id}_secret"), intent_id })
    }

    async fn retrieve_intent(&self, _intent_id: &str) -> Result<IntentStatus> {
        Ok(IntentStatus::Processing)
    }
}

struct TestApp {
    router: Router,
    catalog: Arc<InMemoryCatalog>,
    notifier: Arc<RecordingNotifier>,
    processor: Arc<FakeProcessor>,
}

fn product(name: &str, price: Decimal) -> ProductSnapshot {
    ProductSnapshot {
        name: name.into(),
        price,
        image: None,
        available_colors: vec!["red".into(), "blue".into()],
        available_sizes: vec!["M".into(), "L".into()],
    }
}

async fn app() -> TestApp {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.insert("A", product("Linen Shirt", dec!(10.00))).await;
    catalog.insert("B", product("Canvas Tote", dec!(4.50))).await;
    let notifier = Arc::new(RecordingNotifier::new());
    let processor = Arc::new(FakeProcessor::default());

    let adapters = Adapters {
        carts: Arc::new(InMemoryCartRepository::new()),
        orders: Arc::new(InMemoryOrderRepository::new()),
        catalog: catalog.clone(),
        notifier: notifier.clone(),
        processor: processor.clone(),
        credentials: Arc::new(JwtVerifier::new(JWT_SECRET)),
    };
    let settings = Settings {
        tax_rate: dec!(0.05),
        currency: "usd".into(),
        payment_timeout: Duration::from_secs(5),
        webhooks: WebhookVerifier::new(WEBHOOK_SECRET, Duration::from_secs(300)),
    };
    TestApp { router: api::router(AppState::assemble(adapters, settings)), catalog, notifier, processor }
}

fn token(user_id: &str, roles: &[&str]) -> String {
    let claims = Claims {
        sub: user_id.into(),
        email: Some(format!("{user_id}@example.com")),
        name: None,
        roles: roles.iter().map(|r| r.to_string()).collect(),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

enum Who<'a> {
    Nobody,
    Session(&'a str),
    Bearer(&'a str),
    Both(&'a str, &'a str),
}

async fn call(router: &Router, method: &str, uri: &str, who: Who<'_>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    match who {
        Who::Nobody => {}
        Who::Session(s) => builder = builder.header("x-session-id", s),
        Who::Bearer(t) => builder = builder.header("authorization", format!("Bearer {t}")),
        Who::Both(t, s) => builder = builder.header("authorization", format!("Bearer {t}")).header("x-session-id", s),
    }
    let request = match body {
        Some(body) => builder.header("content-type", "application/json").body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, value)
}

async fn webhook(router: &Router, body: &Value, secret: &str) -> StatusCode {
    let payload = body.to_string();
    let header = WebhookVerifier::new(secret, Duration::from_secs(300))
        .sign(payload.as_bytes(), chrono::Utc::now().timestamp());
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("stripe-signature", header)
        .body(Body::from(payload))
        .unwrap();
    router.clone().oneshot(request).await.unwrap().status()
}

fn money(v: &Value) -> Decimal {
    match v {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

fn lines(cart: &Value) -> Vec<(String, u64)> {
    let mut lines: Vec<(String, u64)> = cart["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| (l["productId"].as_str().unwrap().to_string(), l["quantity"].as_u64().unwrap()))
        .collect();
    lines.sort();
    lines
}

fn address() -> Value {
    json!({
        "fullName": "Ada Obi",
        "email": "ada@example.com",
        "street": "12 Marina Road",
        "city": "Lagos",
        "postalCode": "100001",
        "country": "NG"
    })
}

fn add(product_id: &str, quantity: i64) -> Value {
    json!({ "productId": product_id, "color": "red", "size": "M", "quantity": quantity })
}

#[tokio::test]
async fn cash_order_is_confirmed_with_one_email() {
    let app = app().await;
    let u1 = token("u1", &[]);
    let (status, _) = call(&app.router, "POST", "/api/v1/cart/items", Who::Bearer(&u1), Some(add("A", 2))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, order) = call(
        &app.router,
        "POST",
        "/api/v1/orders",
        Who::Bearer(&u1),
        Some(json!({ "shippingAddress": address(), "paymentMethod": { "type": "cod" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(money(&order["subtotal"]), dec!(20));
    assert_eq!(money(&order["shipping"]), dec!(5));
    assert_eq!(money(&order["tax"]), dec!(1));
    assert_eq!(money(&order["total"]), dec!(26));
    assert_eq!(order["status"], "confirmed");
    assert_eq!(order["paymentStatus"], "pending");
    assert!(order["orderNumber"].as_str().unwrap().starts_with("ORD-"));

    let order_id = Uuid::parse_str(order["id"].as_str().unwrap()).unwrap();
    assert_eq!(app.notifier.confirmations_for(order_id).await, 1);

    app.catalog.insert("A", product("Linen Shirt", dec!(99.00))).await;
    let (status, reread) = call(&app.router, "GET", &format!("/api/v1/orders/{order_id}"), Who::Bearer(&u1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&reread["total"]), dec!(26));
}

#[tokio::test]
async fn card_order_waits_for_signed_webhook() {
    let app = app().await;
    let (_, cart) = call(&app.router, "POST", "/api/v1/cart/items", Who::Session("guest-card"), Some(add("A", 1))).await;
    assert_eq!(lines(&cart), vec![("A".to_string(), 1)]);

    let (status, order) = call(
        &app.router,
        "POST",
        "/api/v1/orders",
        Who::Session("guest-card"),
        Some(json!({ "shippingAddress": address(), "paymentMethod": { "type": "card", "displayName": "Visa 4242" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["paymentStatus"], "unpaid");
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, intent) = call(
        &app.router,
        "POST",
        "/api/v1/payments/intent",
        Who::Session("guest-card"),
        Some(json!({ "orderId": order_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let intent_id = intent["intentId"].as_str().unwrap().to_string();
    assert_eq!(app.processor.created.lock().await[0].0, 1550);

    let (status, confirm) = call(
        &app.router,
        "POST",
        "/api/v1/payments/confirm",
        Who::Session("guest-card"),
        Some(json!({ "paymentIntentId": intent_id, "orderId": order_id })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(confirm["status"], "processing");

    let (_, still) = call(&app.router, "GET", &format!("/api/v1/orders/{order_id}"), Who::Session("guest-card"), None).await;
    assert_eq!(still["status"], "pending");
    assert_eq!(still["paymentStatus"], "unpaid");

    let event = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "metadata": { "orderId": order_id } } }
    });
    assert_eq!(webhook(&app.router, &event, "whsec_forged").await, StatusCode::BAD_REQUEST);
    assert_eq!(webhook(&app.router, &event, WEBHOOK_SECRET).await, StatusCode::OK);
    assert_eq!(webhook(&app.router, &event, WEBHOOK_SECRET).await, StatusCode::OK);

    let (_, paid) = call(&app.router, "GET", &format!("/api/v1/orders/{order_id}"), Who::Session("guest-card"), None).await;
    assert_eq!(paid["status"], "confirmed");
    assert_eq!(paid["paymentStatus"], "paid");
    assert_eq!(app.notifier.confirmations_for(Uuid::parse_str(&order_id).unwrap()).await, 1);
}

#[tokio::test]
async fn intent_amount_rounds_half_away_from_zero() {
    let app = app().await;
    let (status, intent) = call(
        &app.router,
        "POST",
        "/api/v1/payments/intent",
        Who::Session("guest-amount"),
        Some(json!({ "amount": "19.995" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(intent["clientSecret"].as_str().is_some());
    assert_eq!(app.processor.created.lock().await[0].0, 2000);
}

#[tokio::test]
async fn foreign_and_missing_orders_look_the_same() {
    let app = app().await;
    let u1 = token("u1", &[]);
    let u2 = token("u2", &[]);
    call(&app.router, "POST", "/api/v1/cart/items", Who::Bearer(&u1), Some(add("B", 1))).await;
    let (_, order) = call(
        &app.router,
        "POST",
        "/api/v1/orders",
        Who::Bearer(&u1),
        Some(json!({ "shippingAddress": address(), "paymentMethod": { "type": "card" } })),
    )
    .await;

    let foreign = call(&app.router, "GET", &format!("/api/v1/orders/{}", order["id"].as_str().unwrap()), Who::Bearer(&u2), None).await;
    let missing = call(&app.router, "GET", &format!("/api/v1/orders/{}", Uuid::now_v7()), Who::Bearer(&u2), None).await;
    assert_eq!(foreign.0, StatusCode::NOT_FOUND);
    assert_eq!(foreign, missing);
}

#[tokio::test]
async fn sign_in_merges_guest_cart_once() {
    let app = app().await;
    let u2 = token("u2", &[]);
    call(&app.router, "POST", "/api/v1/cart/items", Who::Session("sess-1"), Some(add("A", 2))).await;
    call(&app.router, "POST", "/api/v1/cart/items", Who::Bearer(&u2), Some(add("A", 1))).await;
    call(&app.router, "POST", "/api/v1/cart/items", Who::Bearer(&u2), Some(add("B", 3))).await;

    let (status, merged) = call(&app.router, "POST", "/api/v1/cart/transfer", Who::Both(&u2, "sess-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines(&merged), vec![("A".to_string(), 3), ("B".to_string(), 3)]);

    let (status, again) = call(&app.router, "POST", "/api/v1/cart/transfer", Who::Both(&u2, "sess-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines(&again), lines(&merged));

    let (_, guest) = call(&app.router, "GET", "/api/v1/cart", Who::Session("sess-1"), None).await;
    assert!(guest["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cart_validation_errors_carry_the_cart() {
    let app = app().await;
    call(&app.router, "POST", "/api/v1/cart/items", Who::Session("sess-2"), Some(add("A", 1))).await;
    let (status, body) = call(&app.router, "POST", "/api/v1/cart/items", Who::Session("sess-2"), Some(add("A", 0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_quantity");
    assert_eq!(lines(&body["cart"]), vec![("A".to_string(), 1)]);

    let (status, body) = call(
        &app.router,
        "PUT",
        "/api/v1/cart/shipping",
        Who::Session("sess-2"),
        Some(json!({ "shippingMethod": "teleport" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_shipping_method");
    assert!(body["cart"]["shippingMethod"].is_null());
}

#[tokio::test]
async fn reads_mint_a_session_but_writes_need_one() {
    let app = app().await;
    let request = Request::builder().uri("/api/v1/cart").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-session-id"));

    let (status, body) = call(&app.router, "POST", "/api/v1/cart/items", Who::Nobody, Some(add("A", 1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_session");
}

#[tokio::test]
async fn admin_ships_with_tracking_number() {
    let app = app().await;
    let u1 = token("u1", &[]);
    let admin = token("ops", &["admin"]);
    call(&app.router, "POST", "/api/v1/cart/items", Who::Bearer(&u1), Some(add("A", 1))).await;
    let (_, order) = call(
        &app.router,
        "POST",
        "/api/v1/orders",
        Who::Bearer(&u1),
        Some(json!({ "shippingAddress": address(), "paymentMethod": { "type": "cod" } })),
    )
    .await;
    let uri = format!("/api/v1/admin/orders/{}/status", order["id"].as_str().unwrap());

    let (status, _) = call(&app.router, "PATCH", &uri, Who::Bearer(&u1), Some(json!({ "status": "shipped" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, shipped) = call(
        &app.router,
        "PATCH",
        &uri,
        Who::Bearer(&admin),
        Some(json!({ "status": "shipped", "trackingNumber": "1Z999AA1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipped["status"], "shipped");
    assert_eq!(shipped["trackingNumber"], "1Z999AA1");

    let (status, _) = call(&app.router, "PATCH", &uri, Who::Bearer(&admin), Some(json!({ "status": "pending" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, list) = call(&app.router, "GET", "/api/v1/admin/orders", Who::Bearer(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
}
