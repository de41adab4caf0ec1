//! OpenSASE Storefront
//!
//! Cart resolution and order lifecycle engine for a self-hosted storefront.
//!
//! ## Features
//! - Guest and authenticated carts, merged when a guest signs in
//! - Checkout into price-frozen orders (card or cash on delivery)
//! - Payment intents with signed, idempotent webhook reconciliation
//! - Order status / payment status state machine with customer notifications

pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ports;
pub mod services;

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid shipping method: {0}")]
    InvalidShippingMethod(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("A session id or credential is required")]
    MissingSessionIdentity,

    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Payment provider error: {message}")]
    UpstreamPayment { retryable: bool, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Storage error: {0}")]
    Persistence(String),
}

impl EcommerceError {
    pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }

    /// Input was rejected before any state changed.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidQuantity(_) | Self::InvalidShippingMethod(_) | Self::Validation(_))
    }
}

impl From<sqlx::Error> for EcommerceError {
    fn from(e: sqlx::Error) -> Self {
        match e.as_database_error() {
            Some(db) if db.is_unique_violation() => Self::Conflict(db.message().to_string()),
            _ => Self::Persistence(e.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
