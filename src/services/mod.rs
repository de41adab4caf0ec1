//! Application services. Each one owns a single concern and talks to the outside
//! world only through the traits in `crate::ports`.

pub mod cart;
pub mod checkout;
pub mod identity;
pub mod orders;
pub mod payments;

pub use cart::CartService;
pub use checkout::{OrderFactory, PaymentSelection, PlaceOrder, RequestedItem};
pub use identity::{Credentials, IdentityResolver, ResolvedIdentity};
pub use orders::{Applied, OrderLifecycle};
pub use payments::{ConfirmOutcome, PaymentBridge, WebhookOutcome};
