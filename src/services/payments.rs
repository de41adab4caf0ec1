//! Payment bridge: intents at the card processor, synchronous confirmation, and webhook reconciliation.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{to_minor_units, PaymentMethodKind};
use crate::domain::Identity;
use crate::infrastructure::stripe::{ProcessorEvent, WebhookVerifier};
use crate::ports::{IntentStatus, OrderRepository, PaymentIntent, PaymentProcessor};
use crate::services::orders::OrderLifecycle;
use crate::{EcommerceError, Result};

pub const EVENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_FAILED: &str = "payment_intent.payment_failed";

#[derive(Clone, Debug)]
pub enum ConfirmOutcome {
    Confirmed(Order),
    /// The processor has not settled the intent; the order was left alone.
    NotCompleted(IntentStatus),
}

/// What happened to a verified webhook. The endpoint acknowledges all of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied { order_id: Uuid },
    Duplicate { order_id: Uuid },
    Ignored,
    Unmatched,
    Failed,
}

#[derive(Clone)]
pub struct PaymentBridge {
    processor: Arc<dyn PaymentProcessor>,
    orders: Arc<dyn OrderRepository>,
    lifecycle: OrderLifecycle,
    verifier: WebhookVerifier,
    currency: String,
    timeout: Duration,
}

impl PaymentBridge {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        orders: Arc<dyn OrderRepository>,
        lifecycle: OrderLifecycle,
        verifier: WebhookVerifier,
        currency: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self { processor, orders, lifecycle, verifier, currency: currency.into(), timeout }
    }

    /// Bounds a processor call by the configured timeout. With `retryable` unset, every
    /// upstream failure is reported as non-retryable.
    async fn bounded<T>(&self, retryable: bool, call: impl Future<Output = Result<T>>) -> Result<T> {
        let outcome = tokio::time::timeout(self.timeout, call).await.map_err(|_| EcommerceError::UpstreamPayment {
            retryable,
            message: format!("payment processor did not answer within {:?}", self.timeout),
        })?;
        match outcome {
            Err(EcommerceError::UpstreamPayment { message, .. }) if !retryable => {
                Err(EcommerceError::UpstreamPayment { retryable: false, message })
            }
            other => other,
        }
    }

    /// Creates an intent for `amount` in the store currency. Writes nothing locally.
    #[instrument(skip(self, metadata), fields(owner = %owner))]
    pub async fn create_intent(
        &self,
        amount: Decimal,
        owner: &Identity,
        mut metadata: BTreeMap<String, String>,
    ) -> Result<PaymentIntent> {
        let minor = to_minor_units(amount)?;
        if minor <= 0 {
            return Err(EcommerceError::validation("payment amount must be positive"));
        }
        metadata.insert("identity".into(), owner.to_string());
        let intent = self.bounded(true, self.processor.create_payment_intent(minor, &self.currency, &metadata)).await?;
        tracing::info!(intent_id = %intent.intent_id, amount_minor = minor, "payment intent created");
        Ok(intent)
    }

    /// Opens an intent for an unpaid card order and remembers it on the order.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn start_order_payment(&self, owner: &Identity, order_id: Uuid) -> Result<PaymentIntent> {
        let order = self.lifecycle.get_for(owner, order_id).await?;
        if order.payment_method().kind != PaymentMethodKind::Card {
            return Err(EcommerceError::validation("order is not paid by card"));
        }
        if order.status() != OrderStatus::Pending || !order.payment_status().is_outstanding() {
            return Err(EcommerceError::validation(format!(
                "order is {} with payment {}",
                order.status(),
                order.payment_status()
            )));
        }
        let metadata = BTreeMap::from([
            ("orderId".to_string(), order.id().to_string()),
            ("orderNumber".to_string(), order.order_number().to_string()),
        ]);
        let intent = self.create_intent(order.totals().total, owner, metadata).await?;
        self.orders.attach_intent(order.id(), &intent.intent_id).await?;
        Ok(intent)
    }

    /// Client-side confirmation. Only a `succeeded` intent changes the order;
    /// anything else is reported back untouched and left to the webhook.
    ///
    /// The intent must be the one opened for this order by `start_order_payment`.
    /// Processor failures here are non-retryable: the webhook settles the order instead.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn confirm_intent(&self, owner: &Identity, intent_id: &str, order_id: Uuid) -> Result<ConfirmOutcome> {
        let order = self.lifecycle.get_for(owner, order_id).await?;
        if order.payment_method().intent_id.as_deref() != Some(intent_id) {
            return Err(EcommerceError::validation("payment intent does not belong to this order"));
        }
        let status = self.bounded(false, self.processor.retrieve_intent(intent_id)).await?;
        if status != IntentStatus::Succeeded {
            tracing::info!(%intent_id, %status, "payment not completed");
            return Ok(ConfirmOutcome::NotCompleted(status));
        }
        let applied = self.lifecycle.apply(order_id, OrderEvent::PaymentSucceeded).await?;
        Ok(ConfirmOutcome::Confirmed(applied.order))
    }

    /// Rejects unsigned or forged payloads with `InvalidSignature`. Everything after
    /// verification is logged and acknowledged so the processor stops redelivering.
    #[instrument(skip_all)]
    pub async fn handle_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let signature = signature.ok_or(EcommerceError::InvalidSignature)?;
        self.verifier.verify(payload, signature, Utc::now())?;

        let event = match ProcessorEvent::parse(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable webhook");
                return Ok(WebhookOutcome::Ignored);
            }
        };
        let order_event = match event.kind.as_str() {
            EVENT_SUCCEEDED => OrderEvent::PaymentSucceeded,
            EVENT_FAILED => OrderEvent::PaymentFailed,
            other => {
                tracing::debug!(event_id = %event.id, kind = other, "webhook event not handled");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let order_id = match self.find_order(&event).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::info!(event_id = %event.id, intent_id = %event.data.object.id, "webhook for unknown order");
                return Ok(WebhookOutcome::Unmatched);
            }
            Err(e) => {
                tracing::error!(event_id = %event.id, error = %e, "webhook order lookup failed");
                return Ok(WebhookOutcome::Failed);
            }
        };

        match self.lifecycle.apply(order_id, order_event).await {
            Ok(applied) if applied.changed => Ok(WebhookOutcome::Applied { order_id }),
            Ok(_) => Ok(WebhookOutcome::Duplicate { order_id }),
            Err(EcommerceError::NotFound) => Ok(WebhookOutcome::Unmatched),
            Err(e) => {
                tracing::error!(event_id = %event.id, %order_id, error = %e, "webhook could not be applied");
                Ok(WebhookOutcome::Failed)
            }
        }
    }

    async fn find_order(&self, event: &ProcessorEvent) -> Result<Option<Uuid>> {
        if let Some(id) = event.order_id().and_then(|id| Uuid::parse_str(id).ok()) {
            if self.orders.get(id).await?.is_some() {
                return Ok(Some(id));
            }
        }
        Ok(self.orders.find_by_intent(&event.data.object.id).await?.map(|o| o.id()))
    }
}
