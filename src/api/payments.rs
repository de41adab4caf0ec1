//! Payment endpoints, including the processor webhook.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::api::extract::Owner;
use crate::api::AppState;
use crate::infrastructure::stripe::SIGNATURE_HEADER;
use crate::ports::PaymentIntent;
use crate::services::ConfirmOutcome;
use crate::{EcommerceError, Result};

/// Either an order to pay for, or a bare amount.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    pub order_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub payment_intent_id: String,
    pub order_id: Uuid,
}

pub async fn create_intent(State(state): State<AppState>, Owner(owner): Owner, Json(req): Json<IntentRequest>) -> Result<Json<PaymentIntent>> {
    let intent = match (req.order_id, req.amount) {
        (Some(order_id), _) => state.payments.start_order_payment(&owner.identity, order_id).await?,
        (None, Some(amount)) => state.payments.create_intent(amount, &owner.identity, req.metadata).await?,
        (None, None) => return Err(EcommerceError::validation("orderId or amount is required")),
    };
    Ok(Json(intent))
}

pub async fn confirm(State(state): State<AppState>, Owner(owner): Owner, Json(req): Json<ConfirmRequest>) -> Result<Response> {
    let outcome = state.payments.confirm_intent(&owner.identity, &req.payment_intent_id, req.order_id).await?;
    Ok(match outcome {
        ConfirmOutcome::Confirmed(order) => Json(json!({ "status": "succeeded", "order": order })).into_response(),
        ConfirmOutcome::NotCompleted(status) => (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({
                "error": "payment_incomplete",
                "message": format!("Payment has not completed (status: {status})"),
                "status": status.to_string(),
            })),
        )
            .into_response(),
    })
}

/// Raw body is required for signature verification, so no `Json` extractor here.
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<serde_json::Value>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = state.payments.handle_webhook(&body, signature).await?;
    tracing::debug!(?outcome, "webhook handled");
    Ok(Json(json!({ "received": true })))
}
