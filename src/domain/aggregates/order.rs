//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::cart::CartLine;
use crate::domain::identity::Identity;
use crate::domain::value_objects::{round_money, PaymentMethodKind, Quantity, ShippingMethod};
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    order_number: String,
    owner: Identity,
    email: String,
    items: Vec<OrderLine>,
    shipping_address: ShippingAddress,
    shipping_method: ShippingMethod,
    payment_method: PaymentMethod,
    #[serde(flatten)]
    totals: OrderTotals,
    status: OrderStatus,
    payment_status: PaymentStatus,
    tracking_number: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Price-frozen copy of a cart line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: String,
    pub color: String,
    pub size: String,
    pub quantity: Quantity,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal { self.price * Decimal::from(self.quantity.value()) }
}

impl From<CartLine> for OrderLine {
    fn from(l: CartLine) -> Self {
        Self { product_id: l.product_id, color: l.color, size: l.size, quantity: l.quantity, name: l.name, price: l.price, image: l.image }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 300))]
    pub street: String,
    #[validate(length(min = 1, max = 120))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 56))]
    pub country: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    #[serde(rename = "type")]
    pub kind: PaymentMethodKind,
    pub display_name: String,
    pub intent_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    pub fn compute(items: &[OrderLine], shipping_method: ShippingMethod, tax_rate: Decimal) -> Self {
        let subtotal: Decimal = items.iter().map(OrderLine::line_total).sum();
        let shipping = shipping_method.fee();
        let tax = round_money(subtotal * tax_rate);
        Self { subtotal, shipping, tax, total: subtotal + shipping + tax }
    }
}

/// Fulfillment axis. `Delivered` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] =
        [Self::Pending, Self::Confirmed, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    /// Position along the normal fulfillment flow; `None` for cancelled.
    pub fn step(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Processing => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }
}

impl FromStr for OrderStatus {
    type Err = EcommerceError;
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s).ok_or_else(|| EcommerceError::validation(format!("unknown order status: {s}")))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Payment axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Unpaid,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [Self::Pending, Self::Unpaid, Self::Paid, Self::Failed, Self::Refunded];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Money has not moved yet.
    pub fn is_outstanding(&self) -> bool { matches!(self, Self::Pending | Self::Unpaid) }

    /// Initial payment state for a new order.
    pub fn initial_for(kind: PaymentMethodKind) -> Self {
        match kind { PaymentMethodKind::Cod => Self::Pending, PaymentMethodKind::Card => Self::Unpaid }
    }
}

impl FromStr for PaymentStatus {
    type Err = EcommerceError;
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s).ok_or_else(|| EcommerceError::validation(format!("unknown payment status: {s}")))
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// The two controlled fields of an order, as the state machine sees them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderState {
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

impl OrderState {
    pub fn new(status: OrderStatus, payment_status: PaymentStatus) -> Self { Self { status, payment_status } }
}

/// Everything needed to place an order, already validated.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub owner: Identity,
    pub email: String,
    pub items: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub shipping_method: ShippingMethod,
    pub payment_method: PaymentMethod,
    pub tax_rate: Decimal,
}

fn fresh_order_number() -> String { format!("ORD-{:08}", rand::random::<u32>() % 100_000_000) }

impl Order {
    /// Builds a pending order with totals computed once from the frozen lines.
    pub fn place(new: NewOrder) -> Result<Self> {
        if new.items.is_empty() { return Err(EcommerceError::validation("an order needs at least one item")); }
        let totals = OrderTotals::compute(&new.items, new.shipping_method, new.tax_rate);
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            order_number: fresh_order_number(),
            owner: new.owner,
            email: new.email,
            items: new.items,
            shipping_address: new.shipping_address,
            shipping_method: new.shipping_method,
            payment_status: PaymentStatus::initial_for(new.payment_method.kind),
            payment_method: new.payment_method,
            totals,
            status: OrderStatus::Pending,
            tracking_number: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds an order loaded from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        order_number: String,
        owner: Identity,
        email: String,
        items: Vec<OrderLine>,
        shipping_address: ShippingAddress,
        shipping_method: ShippingMethod,
        payment_method: PaymentMethod,
        totals: OrderTotals,
        state: OrderState,
        tracking_number: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id, order_number, owner, email, items, shipping_address, shipping_method, payment_method, totals,
            status: state.status, payment_status: state.payment_status, tracking_number, created_at, updated_at,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn owner(&self) -> &Identity { &self.owner }
    pub fn email(&self) -> &str { &self.email }
    pub fn customer_name(&self) -> &str { &self.shipping_address.full_name }
    pub fn items(&self) -> &[OrderLine] { &self.items }
    pub fn shipping_address(&self) -> &ShippingAddress { &self.shipping_address }
    pub fn shipping_method(&self) -> ShippingMethod { self.shipping_method }
    pub fn payment_method(&self) -> &PaymentMethod { &self.payment_method }
    pub fn totals(&self) -> &OrderTotals { &self.totals }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn state(&self) -> OrderState { OrderState::new(self.status, self.payment_status) }
    pub fn tracking_number(&self) -> Option<&str> { self.tracking_number.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn is_owned_by(&self, identity: &Identity) -> bool { &self.owner == identity }

    /// Writes a state chosen by the state machine and stamps `updated_at`.
    pub fn apply_state(&mut self, next: OrderState, tracking_number: Option<String>, at: DateTime<Utc>) {
        self.status = next.status;
        self.payment_status = next.payment_status;
        if tracking_number.is_some() { self.tracking_number = tracking_number; }
        self.updated_at = at;
    }

    /// Draws a fresh order number, for when the stored one collided.
    pub fn renumber(&mut self) { self.order_number = fresh_order_number(); }

    pub fn attach_intent(&mut self, intent_id: impl Into<String>) {
        self.payment_method.intent_id = Some(intent_id.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
pub(crate) fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Ada Obi".into(), email: Some("ada@example.com".into()), phone: None,
        street: "1 Marina Rd".into(), city: "Lagos".into(), state: None, postal_code: "101001".into(), country: "NG".into(),
    }
}
