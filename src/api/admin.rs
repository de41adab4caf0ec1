//! Back-office endpoints. Every handler requires the `admin` role.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::extract::Admin;
use crate::api::orders::{OrderPage, PageQuery};
use crate::api::AppState;
use crate::domain::aggregates::{Order, OrderStatus, PaymentStatus};
use crate::domain::events::ChangeMode;
use crate::ports::Page;
use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: String,
    pub tracking_number: Option<String>,
    #[serde(default, rename = "override")]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusRequest {
    pub payment_status: String,
}

pub async fn list_orders(State(state): State<AppState>, _admin: Admin, Query(q): Query<PageQuery>) -> Result<Json<OrderPage>> {
    let page = Page::from(q);
    Ok(Json(OrderPage::new(state.orders.list_all(page).await?, page)))
}

pub async fn set_status(
    State(state): State<AppState>,
    Admin(admin): Admin,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Order>> {
    let target: OrderStatus = req.status.parse()?;
    let mode = if req.force { ChangeMode::Override } else { ChangeMode::Forward };
    tracing::info!(admin = %admin.user_id, order_id = %id, %target, ?mode, "admin status change");
    Ok(Json(state.orders.admin_set_status(id, target, req.tracking_number, mode).await?))
}

pub async fn set_payment_status(
    State(state): State<AppState>,
    Admin(admin): Admin,
    Path(id): Path<Uuid>,
    Json(req): Json<PaymentStatusRequest>,
) -> Result<Json<Order>> {
    let target: PaymentStatus = req.payment_status.parse()?;
    tracing::info!(admin = %admin.user_id, order_id = %id, %target, "admin payment status change");
    Ok(Json(state.orders.admin_set_payment_status(id, target).await?))
}
