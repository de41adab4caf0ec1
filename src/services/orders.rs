//! Drives the order state machine against storage and sends the notifications it asks for.

use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus, PaymentStatus};
use crate::domain::events::{ChangeMode, Notification, OrderEvent, Transition};
use crate::domain::lifecycle::apply_event;
use crate::domain::Identity;
use crate::ports::{Notifier, OrderRepository, Page, StatusUpdate};
use crate::{EcommerceError, Result};

const MAX_ATTEMPTS: usize = 5;

/// Result of feeding one event to an order.
#[derive(Clone, Debug)]
pub struct Applied {
    pub order: Order,
    pub changed: bool,
}

#[derive(Clone)]
pub struct OrderLifecycle {
    orders: Arc<dyn OrderRepository>,
    notifier: Arc<dyn Notifier>,
}

impl OrderLifecycle {
    pub fn new(orders: Arc<dyn OrderRepository>, notifier: Arc<dyn Notifier>) -> Self { Self { orders, notifier } }

    async fn load(&self, id: Uuid) -> Result<Order> {
        self.orders.get(id).await?.ok_or(EcommerceError::NotFound)
    }

    /// Not found and not yours look the same from outside.
    pub async fn get_for(&self, owner: &Identity, id: Uuid) -> Result<Order> {
        let order = self.load(id).await?;
        if !order.is_owned_by(owner) {
            return Err(EcommerceError::NotFound);
        }
        Ok(order)
    }

    pub async fn list_for(&self, owner: &Identity, page: Page) -> Result<Vec<Order>> {
        self.orders.list_for_owner(owner, page).await
    }

    pub async fn list_all(&self, page: Page) -> Result<Vec<Order>> {
        self.orders.list_all(page).await
    }

    /// Loads the order, asks the state machine, and writes the answer with a
    /// compare-and-set. A concurrent writer forces a reload, so two deliveries of
    /// the same event can only change the order (and notify) once.
    #[instrument(skip(self, event), fields(event = event.name()))]
    pub async fn apply(&self, id: Uuid, event: OrderEvent) -> Result<Applied> {
        for _ in 0..MAX_ATTEMPTS {
            let mut order = self.load(id).await?;
            let current = order.state();
            let (next, tracking_number, notification) =
                match apply_event(current, order.payment_method().kind, &event)? {
                    Transition::Unchanged => return Ok(Applied { order, changed: false }),
                    Transition::Changed { next, tracking_number, notification } => (next, tracking_number, notification),
                };

            let at = Utc::now();
            if !self.orders.compare_and_set(id, current, next, tracking_number.as_deref(), at).await? {
                tracing::debug!(order_id = %id, "order changed underneath, retrying");
                continue;
            }
            order.apply_state(next, tracking_number, at);
            tracing::info!(
                order_id = %id,
                status = %next.status,
                payment_status = %next.payment_status,
                "order state changed"
            );
            if let Some(notification) = notification {
                self.notify(&order, notification).await;
            }
            return Ok(Applied { order, changed: true });
        }
        Err(EcommerceError::Persistence(format!("order {id} kept changing while applying an update")))
    }

    async fn notify(&self, order: &Order, notification: Notification) {
        let sent = match notification {
            Notification::Confirmation => self.notifier.send_order_confirmation(order).await,
            Notification::StatusUpdate(status) => {
                let update = StatusUpdate {
                    email: order.email().to_string(),
                    name: order.customer_name().to_string(),
                    order_id: order.id(),
                    status,
                    tracking_number: match status {
                        OrderStatus::Shipped => order.tracking_number().map(str::to_string),
                        _ => None,
                    },
                };
                self.notifier.send_order_status_update(&update).await
            }
        };
        if let Err(e) = sent {
            tracing::warn!(order_id = %order.id(), error = %e, "order notification failed");
        }
    }

    pub async fn customer_cancel(&self, owner: &Identity, id: Uuid) -> Result<Order> {
        self.get_for(owner, id).await?;
        Ok(self.apply(id, OrderEvent::CustomerCancelled).await?.order)
    }

    pub async fn admin_set_status(
        &self,
        id: Uuid,
        target: OrderStatus,
        tracking_number: Option<String>,
        mode: ChangeMode,
    ) -> Result<Order> {
        let tracking_number = tracking_number.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        Ok(self.apply(id, OrderEvent::StatusChanged { target, tracking_number, mode }).await?.order)
    }

    pub async fn admin_set_payment_status(&self, id: Uuid, target: PaymentStatus) -> Result<Order> {
        Ok(self.apply(id, OrderEvent::PaymentStatusChanged { target }).await?.order)
    }
}
