//! Card processor client (Stripe-compatible API) and webhook signature checks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::ports::{IntentStatus, PaymentIntent, PaymentProcessor};
use crate::{EcommerceError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub struct StripeProcessor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl StripeProcessor {
    /// Every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| EcommerceError::UpstreamPayment { retryable: false, message: e.to_string() })?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), api_key: api_key.into() })
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.bearer_auth(&self.api_key).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EcommerceError::UpstreamPayment {
                retryable: status.is_server_error() || status.as_u16() == 429,
                message: format!("processor returned {status}: {body}"),
            });
        }
        response.json::<T>().await.map_err(|e| EcommerceError::UpstreamPayment {
            retryable: false,
            message: format!("unexpected processor response: {e}"),
        })
    }
}

fn transport_error(e: reqwest::Error) -> EcommerceError {
    EcommerceError::UpstreamPayment { retryable: e.is_timeout() || e.is_connect(), message: e.to_string() }
}

#[derive(Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: Option<String>,
    status: String,
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<PaymentIntent> {
        let mut form = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        form.extend(metadata.iter().map(|(k, v)| (format!("metadata[{k}]"), v.clone())));

        let intent: IntentResponse =
            self.send(self.client.post(format!("{}/v1/payment_intents", self.base_url)).form(&form)).await?;
        let client_secret = intent.client_secret.ok_or_else(|| EcommerceError::UpstreamPayment {
            retryable: false,
            message: format!("intent {} came back without a client secret", intent.id),
        })?;
        Ok(PaymentIntent { intent_id: intent.id, client_secret })
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<IntentStatus> {
        let intent: IntentResponse =
            self.send(self.client.get(format!("{}/v1/payment_intents/{intent_id}", self.base_url))).await?;
        Ok(IntentStatus::parse(&intent.status))
    }
}

/// Checks `t=<unix>,v1=<hex hmac>` signatures over `"<t>.<raw body>"`.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").field("secret", &"[REDACTED]").field("tolerance", &self.tolerance).finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self { Self { secret: secret.into(), tolerance } }

    fn mac(&self, timestamp: &str, payload: &[u8]) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts keys of any length");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }

    pub fn verify(&self, payload: &[u8], header: &str, now: DateTime<Utc>) -> Result<()> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", v)) => timestamp = Some(v),
                Some(("v1", v)) => signatures.push(v),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(EcommerceError::InvalidSignature)?;
        let signed_at: i64 = timestamp.parse().map_err(|_| EcommerceError::InvalidSignature)?;
        if now.timestamp().abs_diff(signed_at) > self.tolerance.as_secs() {
            return Err(EcommerceError::InvalidSignature);
        }

        let mac = self.mac(timestamp, payload);
        let valid = signatures.iter().filter_map(|s| hex::decode(s).ok()).any(|sig| mac.clone().verify_slice(&sig).is_ok());
        if valid { Ok(()) } else { Err(EcommerceError::InvalidSignature) }
    }

    /// Header value a processor would send for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let ts = timestamp.to_string();
        let sig = hex::encode(self.mac(&ts, payload).finalize().into_bytes());
        format!("t={ts},v1={sig}")
    }
}

/// A verified webhook event; only parsed after the signature checks out.
#[derive(Clone, Debug, Deserialize)]
pub struct ProcessorEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: ProcessorEventData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProcessorEventData {
    pub object: IntentObject,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IntentObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ProcessorEvent {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| EcommerceError::validation(format!("malformed webhook event: {e}")))
    }

    pub fn order_id(&self) -> Option<&str> { self.data.object.metadata.get("orderId").map(String::as_str) }
}
