//! Customer order endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::extract::{Caller, Owner};
use crate::api::AppState;
use crate::domain::aggregates::Order;
use crate::ports::Page;
use crate::services::PlaceOrder;
use crate::Result;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl From<PageQuery> for Page {
    fn from(q: PageQuery) -> Self { Page::new(q.page, q.per_page) }
}

#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub data: Vec<Order>,
    pub page: u32,
    pub per_page: u32,
}

impl OrderPage {
    pub fn new(data: Vec<Order>, page: Page) -> Self { Self { data, page: page.page, per_page: page.per_page } }
}

pub async fn create_order(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(req): Json<PlaceOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state.checkout.create_order(&owner.identity, owner.email(), req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(State(state): State<AppState>, Caller(caller): Caller, Query(q): Query<PageQuery>) -> Result<Json<OrderPage>> {
    let page = Page::from(q);
    let orders = state.orders.list_for(&caller.identity, page).await?;
    Ok(Json(OrderPage::new(orders, page)))
}

pub async fn get_order(State(state): State<AppState>, Caller(caller): Caller, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(state.orders.get_for(&caller.identity, id).await?))
}

pub async fn cancel_order(State(state): State<AppState>, Owner(owner): Owner, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(state.orders.customer_cancel(&owner.identity, id).await?))
}
