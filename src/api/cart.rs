//! Cart endpoints.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::api::extract::{with_session, Caller, Owner};
use crate::api::AppState;
use crate::domain::aggregates::{Cart, LineSelector};
use crate::domain::value_objects::LineKey;
use crate::domain::Identity;
use crate::services::Credentials;
use crate::Result;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub item_count: u32,
    pub subtotal: Decimal,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        Self { item_count: cart.item_count(), subtotal: cart.subtotal(), cart }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    #[validate(length(min = 1, max = 100))]
    pub product_id: String,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub color: String,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub size: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub quantity: i64,
    pub color: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VariantQuery {
    pub color: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRequest {
    pub shipping_method: String,
}

fn selector(product_id: String, color: Option<String>, size: Option<String>) -> LineSelector {
    match (color, size) {
        (Some(color), Some(size)) => LineSelector::exact(&LineKey::new(product_id, color, size)),
        _ => LineSelector::product(product_id),
    }
}

/// Validation failures come back with the cart as it stands so the client can re-render.
async fn respond(state: &AppState, owner: &Identity, result: Result<Cart>) -> Response {
    match result {
        Ok(cart) => Json(CartView::from(cart)).into_response(),
        Err(err) if err.is_validation() => {
            let cart = state.carts.find_or_create(owner).await.ok().map(CartView::from);
            let body = json!({ "error": err.code(), "message": err.public_message(), "cart": cart });
            (err.status_code(), Json(body)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub async fn get_cart(State(state): State<AppState>, Caller(caller): Caller) -> Result<Response> {
    let cart = state.carts.find_or_create(&caller.identity).await?;
    Ok(with_session(&caller, Json(CartView::from(cart))))
}

pub async fn add_item(State(state): State<AppState>, Owner(owner): Owner, Json(req): Json<AddItemRequest>) -> Response {
    let owner = owner.identity;
    let result = match req.validate() {
        Ok(()) => state.carts.add_item(&owner, LineKey::new(req.product_id, req.color, req.size), req.quantity).await,
        Err(e) => Err(e.into()),
    };
    respond(&state, &owner, result).await
}

pub async fn update_item(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(product_id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Response {
    let owner = owner.identity;
    let selector = selector(product_id, req.color, req.size);
    let result = state.carts.update_item_quantity(&owner, &selector, req.quantity).await;
    respond(&state, &owner, result).await
}

pub async fn remove_item(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(product_id): Path<String>,
    Query(variant): Query<VariantQuery>,
) -> Response {
    let owner = owner.identity;
    let selector = selector(product_id, variant.color, variant.size);
    let result = state.carts.remove_item(&owner, &selector).await;
    respond(&state, &owner, result).await
}

pub async fn set_shipping(State(state): State<AppState>, Owner(owner): Owner, Json(req): Json<ShippingRequest>) -> Response {
    let owner = owner.identity;
    let result = state.carts.set_shipping_method(&owner, &req.shipping_method).await;
    respond(&state, &owner, result).await
}

pub async fn clear_cart(State(state): State<AppState>, Owner(owner): Owner) -> Result<Json<CartView>> {
    Ok(Json(state.carts.clear(&owner.identity).await?.into()))
}

/// Called right after sign-in with the new token and the old guest session header.
pub async fn transfer(State(state): State<AppState>, creds: Credentials) -> Result<Response> {
    let (guest, user) = state.identity.resolve_transfer(&creds).await?;
    let cart = match state.carts.transfer(&guest, &user).await? {
        Some(cart) => cart,
        None => state.carts.find_or_create(&user).await?,
    };
    Ok(Json(CartView::from(cart)).into_response())
}
