//! Aggregates module
pub mod cart;
pub mod order;

pub use cart::{Cart, CartLine, LineSelector};
pub use order::{
    NewOrder, Order, OrderLine, OrderState, OrderStatus, OrderTotals, PaymentMethod, PaymentStatus, ShippingAddress,
};
