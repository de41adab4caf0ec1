//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{EcommerceError, Result};

/// Line quantity; between one and [`Quantity::MAX`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Largest quantity a line can hold; matches the `INTEGER` storage column.
    pub const MAX: u32 = i32::MAX as u32;

    pub fn new(value: i64) -> Result<Self> {
        if value < 1 { return Err(EcommerceError::InvalidQuantity(format!("quantity must be at least 1, got {value}"))); }
        if value > i64::from(Self::MAX) {
            return Err(EcommerceError::InvalidQuantity(format!("quantity {value} is too large")));
        }
        Ok(Self(value as u32))
    }
    pub fn value(&self) -> u32 { self.0 }
    /// Sums two quantities, capped at [`Quantity::MAX`].
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0).min(Self::MAX)) }
}

impl TryFrom<i64> for Quantity {
    type Error = EcommerceError;
    fn try_from(value: i64) -> Result<Self> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> u32 { q.0 }
}

/// Result of interpreting a requested quantity update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantityUpdate {
    Remove,
    Set(Quantity),
}

impl QuantityUpdate {
    pub fn parse(value: i64) -> Result<Self> {
        match value {
            v if v < 0 => Err(EcommerceError::InvalidQuantity(format!("quantity cannot be negative, got {v}"))),
            0 => Ok(Self::Remove),
            v => Quantity::new(v).map(Self::Set),
        }
    }
}

/// Shipping methods offered at checkout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingMethod {
    #[default]
    Standard,
    Express,
    Overnight,
}

impl ShippingMethod {
    pub const ALL: [ShippingMethod; 3] = [Self::Standard, Self::Express, Self::Overnight];

    pub fn as_str(&self) -> &'static str {
        match self { Self::Standard => "standard", Self::Express => "express", Self::Overnight => "overnight" }
    }

    pub fn fee(&self) -> Decimal {
        match self {
            Self::Standard => Decimal::new(500, 2),
            Self::Express => Decimal::new(1500, 2),
            Self::Overnight => Decimal::new(2500, 2),
        }
    }
}

impl FromStr for ShippingMethod {
    type Err = EcommerceError;
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s).ok_or_else(|| EcommerceError::InvalidShippingMethod(s.to_string()))
    }
}

impl fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// How the customer intends to pay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethodKind {
    /// Cash on delivery.
    Cod,
    Card,
}

impl PaymentMethodKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Cod => "cod", Self::Card => "card" }
    }
}

impl FromStr for PaymentMethodKind {
    type Err = EcommerceError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cod" => Ok(Self::Cod),
            "card" => Ok(Self::Card),
            other => Err(EcommerceError::validation(format!("unknown payment method: {other}"))),
        }
    }
}

impl fmt::Display for PaymentMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Dedupe key for a line entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub product_id: String,
    pub color: String,
    pub size: String,
}

impl LineKey {
    pub fn new(product_id: impl Into<String>, color: impl Into<String>, size: impl Into<String>) -> Self {
        Self { product_id: product_id.into(), color: color.into(), size: size.into() }
    }
}

/// Rounds a money amount to cents, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a major-unit amount to the processor's integer minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| EcommerceError::validation(format!("amount {amount} cannot be charged")))
}
