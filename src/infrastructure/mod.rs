//! Adapters behind the `ports` traits.
pub mod jwt;
pub mod memory;
pub mod nats;
pub mod postgres;
pub mod stripe;
