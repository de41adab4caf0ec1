//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `JWT_SECRET` - HS256 secret for customer access tokens
//! - `PAYMENT_API_KEY` - Card processor secret key
//! - `PAYMENT_WEBHOOK_SECRET` - Webhook signing secret
//!
//! ## Optional
//! - `PORT` - Listen port (default: 8083)
//! - `NATS_URL` - Email job bus; notifications are only logged without it
//! - `PAYMENT_API_BASE` - Processor API root (default: https://api.stripe.com)
//! - `PAYMENT_TIMEOUT_SECS` - Upper bound on any processor call (default: 10)
//! - `WEBHOOK_TOLERANCE_SECS` - Accepted webhook clock skew (default: 300)
//! - `STORE_CURRENCY` - ISO currency for intents (default: usd)
//! - `TAX_RATE` - Flat tax rate on the subtotal (default: 0.05)

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Clone)]
pub struct PaymentConfig {
    pub api_base: String,
    pub api_key: String,
    pub webhook_secret: String,
    pub timeout: Duration,
    pub webhook_tolerance: Duration,
    pub currency: String,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("currency", &self.currency)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub jwt_secret: String,
    pub tax_rate: Decimal,
    pub payment: PaymentConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"[REDACTED]")
            .field("port", &self.port)
            .field("nats_url", &self.nats_url)
            .field("jwt_secret", &"[REDACTED]")
            .field("tax_rate", &self.tax_rate)
            .field("payment", &self.payment)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);
        let tax_rate: Decimal = vars.parsed("TAX_RATE", Decimal::new(5, 2))?;
        if tax_rate.is_sign_negative() || tax_rate >= Decimal::ONE {
            return Err(ConfigError::InvalidEnvVar("TAX_RATE".into(), "must be in [0, 1)".into()));
        }
        Ok(Self {
            database_url: vars.required("DATABASE_URL")?,
            port: vars.parsed("PORT", 8083)?,
            nats_url: vars.optional("NATS_URL"),
            jwt_secret: vars.required("JWT_SECRET")?,
            tax_rate,
            payment: PaymentConfig {
                api_base: vars.optional("PAYMENT_API_BASE").unwrap_or_else(|| "https://api.stripe.com".into()),
                api_key: vars.required("PAYMENT_API_KEY")?,
                webhook_secret: vars.required("PAYMENT_WEBHOOK_SECRET")?,
                timeout: Duration::from_secs(vars.parsed("PAYMENT_TIMEOUT_SECS", 10)?),
                webhook_tolerance: Duration::from_secs(vars.parsed("WEBHOOK_TOLERANCE_SECS", 300)?),
                currency: vars.optional("STORE_CURRENCY").unwrap_or_else(|| "usd".into()).to_lowercase(),
            },
        })
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()))
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.into(), e.to_string())),
            None => Ok(default),
        }
    }
}
