//! Notification senders. Emails are rendered and delivered by the mail worker, which
//! consumes the jobs published here.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::aggregates::Order;
use crate::ports::{Notifier, StatusUpdate};
use crate::{EcommerceError, Result};

pub const CONFIRMATION_SUBJECT: &str = "storefront.email.order_confirmation";
pub const STATUS_UPDATE_SUBJECT: &str = "storefront.email.order_status";

#[derive(Serialize)]
#[serde(tag = "template", rename_all = "snake_case")]
enum EmailJob<'a> {
    OrderConfirmation { order: &'a Order },
    OrderStatusUpdate { update: &'a StatusUpdate },
}

pub struct NatsNotifier {
    client: async_nats::Client,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }

    async fn publish(&self, subject: &str, job: &EmailJob<'_>) -> Result<()> {
        let payload = serde_json::to_vec(job).map_err(|e| EcommerceError::Persistence(e.to_string()))?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| EcommerceError::Persistence(format!("publish to {subject} failed: {e}")))
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        self.publish(CONFIRMATION_SUBJECT, &EmailJob::OrderConfirmation { order }).await
    }

    async fn send_order_status_update(&self, update: &StatusUpdate) -> Result<()> {
        self.publish(STATUS_UPDATE_SUBJECT, &EmailJob::OrderStatusUpdate { update }).await
    }
}

/// Used when no broker is configured.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        tracing::info!(order_id = %order.id(), email = %order.email(), total = %order.totals().total, "order confirmation email");
        Ok(())
    }

    async fn send_order_status_update(&self, update: &StatusUpdate) -> Result<()> {
        tracing::info!(
            order_id = %update.order_id, email = %update.email, status = %update.status,
            tracking = update.tracking_number.as_deref().unwrap_or("-"), "order status email"
        );
        Ok(())
    }
}
