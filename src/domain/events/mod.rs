//! Order lifecycle events and the side effects they request.

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::order::{OrderState, OrderStatus, PaymentStatus};

/// Something that happened to an order, from a customer, an admin or the payment processor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderEvent {
    /// A cash-on-delivery order was just written.
    CashOrderPlaced,
    /// The processor reports the intent succeeded (webhook or synchronous confirm).
    PaymentSucceeded,
    /// The processor reports the intent failed.
    PaymentFailed,
    CustomerCancelled,
    StatusChanged { target: OrderStatus, tracking_number: Option<String>, mode: ChangeMode },
    PaymentStatusChanged { target: PaymentStatus },
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CashOrderPlaced => "cash_order_placed",
            Self::PaymentSucceeded => "payment_succeeded",
            Self::PaymentFailed => "payment_failed",
            Self::CustomerCancelled => "customer_cancelled",
            Self::StatusChanged { .. } => "status_changed",
            Self::PaymentStatusChanged { .. } => "payment_status_changed",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeMode {
    /// Normal flow: forward steps or cancellation only.
    #[default]
    Forward,
    /// Admin override: any status, as long as the order is not terminal.
    Override,
}

/// Customer message a transition asks to send once it is persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notification {
    Confirmation,
    StatusUpdate(OrderStatus),
}

/// Outcome of applying an event to the current state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Changed { next: OrderState, tracking_number: Option<String>, notification: Option<Notification> },
}

impl Transition {
    pub fn to(next: OrderState) -> Self { Self::Changed { next, tracking_number: None, notification: None } }

    pub fn notify(self, notification: Notification) -> Self {
        match self {
            Self::Changed { next, tracking_number, .. } => Self::Changed { next, tracking_number, notification: Some(notification) },
            unchanged => unchanged,
        }
    }

    pub fn is_unchanged(&self) -> bool { matches!(self, Self::Unchanged) }
}
