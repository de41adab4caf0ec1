//! Domain model: identities, carts, orders and the order lifecycle.
pub mod aggregates;
pub mod events;
pub mod identity;
pub mod lifecycle;
pub mod value_objects;

pub use identity::Identity;
