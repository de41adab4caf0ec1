//! Seams between the engine and the outside world.
//!
//! Services only talk to storage, the catalog, the payment processor, the mailer and the
//! credential verifier through these traits. `infrastructure::memory` implements the storage
//! side for tests and local runs; `infrastructure::postgres` is the production store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartLine, LineSelector, Order, OrderState, OrderStatus};
use crate::domain::value_objects::{QuantityUpdate, ShippingMethod};
use crate::domain::Identity;
use crate::Result;

/// Active carts, one per identity. Every mutation returns the cart as stored afterwards.
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find(&self, owner: &Identity) -> Result<Option<Cart>>;
    /// Atomic upsert keyed on the owner; concurrent first access yields one cart.
    async fn find_or_create(&self, owner: &Identity) -> Result<Cart>;
    /// Adds a line, incrementing the quantity of an existing line with the same key.
    async fn add_line(&self, owner: &Identity, line: CartLine) -> Result<Cart>;
    async fn update_quantity(&self, owner: &Identity, selector: &LineSelector, update: QuantityUpdate) -> Result<Cart>;
    async fn remove(&self, owner: &Identity, selector: &LineSelector) -> Result<Cart>;
    async fn set_shipping_method(&self, owner: &Identity, method: ShippingMethod) -> Result<Cart>;
    async fn clear(&self, owner: &Identity) -> Result<Cart>;
    /// Re-owns or merges the guest cart into the user's cart and drops the guest record.
    /// `None` when the guest has no cart.
    async fn transfer(&self, guest: &Identity, user: &Identity) -> Result<Option<Cart>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self { page: page.unwrap_or(1).max(1), per_page: per_page.unwrap_or(20).clamp(1, 100) }
    }
    pub fn limit(&self) -> i64 { i64::from(self.per_page) }
    pub fn offset(&self) -> i64 { i64::from(self.page - 1) * i64::from(self.per_page) }
}

impl Default for Page {
    fn default() -> Self { Self::new(None, None) }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Order>>;
    /// Newest first.
    async fn list_for_owner(&self, owner: &Identity, page: Page) -> Result<Vec<Order>>;
    async fn list_all(&self, page: Page) -> Result<Vec<Order>>;
    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Order>>;
    /// Writes `next` only if the stored state still equals `expected`.
    /// Returns `false` when another writer got there first.
    async fn compare_and_set(
        &self,
        id: Uuid,
        expected: OrderState,
        next: OrderState,
        tracking_number: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool>;
    async fn attach_intent(&self, id: Uuid, intent_id: &str) -> Result<()>;
}

/// Display data the catalog hands out for a product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub available_colors: Vec<String>,
    pub available_sizes: Vec<String>,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, product_id: &str) -> Result<Option<ProductSnapshot>>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub email: String,
    pub name: String,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
}

/// Outbound customer email. Failures are logged by callers, never propagated.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()>;
    async fn send_order_status_update(&self, update: &StatusUpdate) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub intent_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntentStatus {
    Succeeded,
    Processing,
    RequiresAction,
    RequiresPaymentMethod,
    Canceled,
    Other(String),
}

impl IntentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "succeeded" => Self::Succeeded,
            "processing" => Self::Processing,
            "requires_action" => Self::RequiresAction,
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "canceled" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Processing => "processing",
            Self::RequiresAction => "requires_action",
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::Canceled => "canceled",
            Self::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// External card processor. Implementations bound every call with a timeout.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<PaymentIntent>;
    async fn retrieve_intent(&self, intent_id: &str) -> Result<IntentStatus>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedUser {
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub roles: Vec<String>,
}

impl VerifiedUser {
    pub fn is_admin(&self) -> bool { self.roles.iter().any(|r| r == "admin") }
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `None` for a missing, expired or otherwise invalid token.
    async fn verify(&self, token: &str) -> Option<VerifiedUser>;
}
