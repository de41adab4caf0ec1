//! In-memory adapters for tests and local development.
//!
//! Each store guards its map with one `tokio::sync::Mutex`, which gives the same
//! per-record atomicity the Postgres adapter gets from single statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartLine, LineSelector, Order, OrderState};
use crate::domain::value_objects::{QuantityUpdate, ShippingMethod};
use crate::domain::Identity;
use crate::ports::{CartRepository, Notifier, OrderRepository, Page, ProductCatalog, ProductSnapshot, StatusUpdate};
use crate::{EcommerceError, Result};

#[derive(Default)]
pub struct InMemoryCartRepository {
    carts: Mutex<HashMap<Identity, Cart>>,
}

impl InMemoryCartRepository {
    pub fn new() -> Self { Self::default() }

    async fn mutate<T>(&self, owner: &Identity, f: impl FnOnce(&mut Cart) -> Result<T> + Send) -> Result<Cart> {
        let mut carts = self.carts.lock().await;
        let cart = carts.entry(owner.clone()).or_insert_with(|| Cart::new(owner.clone()));
        f(cart)?;
        Ok(cart.clone())
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn find(&self, owner: &Identity) -> Result<Option<Cart>> {
        Ok(self.carts.lock().await.get(owner).cloned())
    }

    async fn find_or_create(&self, owner: &Identity) -> Result<Cart> {
        self.mutate(owner, |_| Ok(())).await
    }

    async fn add_line(&self, owner: &Identity, line: CartLine) -> Result<Cart> {
        self.mutate(owner, |cart| { cart.add_line(line); Ok(()) }).await
    }

    async fn update_quantity(&self, owner: &Identity, selector: &LineSelector, update: QuantityUpdate) -> Result<Cart> {
        self.mutate(owner, |cart| cart.update_quantity(selector, update)).await
    }

    async fn remove(&self, owner: &Identity, selector: &LineSelector) -> Result<Cart> {
        self.mutate(owner, |cart| Ok(cart.remove(selector))).await
    }

    async fn set_shipping_method(&self, owner: &Identity, method: ShippingMethod) -> Result<Cart> {
        self.mutate(owner, |cart| { cart.set_shipping_method(method); Ok(()) }).await
    }

    async fn clear(&self, owner: &Identity) -> Result<Cart> {
        self.mutate(owner, |cart| { cart.clear(); Ok(()) }).await
    }

    async fn transfer(&self, guest: &Identity, user: &Identity) -> Result<Option<Cart>> {
        let mut carts = self.carts.lock().await;
        let Some(mut guest_cart) = carts.remove(guest) else { return Ok(None) };
        let merged = match carts.remove(user) {
            Some(mut user_cart) => { user_cart.absorb(guest_cart); user_cart }
            None => { guest_cart.reassign(user.clone()); guest_cart }
        };
        carts.insert(user.clone(), merged.clone());
        Ok(Some(merged))
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self { Self::default() }
}

fn page_of(mut orders: Vec<Order>, page: Page) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(&a.id())));
    orders.into_iter().skip(page.offset() as usize).take(page.per_page as usize).collect()
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.lock().await;
        if orders.contains_key(&order.id()) {
            return Err(EcommerceError::Conflict(format!("order {} already exists", order.id())));
        }
        if orders.values().any(|o| o.order_number() == order.order_number()) {
            return Err(EcommerceError::Conflict(format!("order number {} is taken", order.order_number())));
        }
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.lock().await.get(&id).cloned())
    }

    async fn list_for_owner(&self, owner: &Identity, page: Page) -> Result<Vec<Order>> {
        let orders = self.orders.lock().await;
        Ok(page_of(orders.values().filter(|o| o.is_owned_by(owner)).cloned().collect(), page))
    }

    async fn list_all(&self, page: Page) -> Result<Vec<Order>> {
        Ok(page_of(self.orders.lock().await.values().cloned().collect(), page))
    }

    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Order>> {
        let orders = self.orders.lock().await;
        Ok(orders.values().find(|o| o.payment_method().intent_id.as_deref() == Some(intent_id)).cloned())
    }

    async fn compare_and_set(
        &self,
        id: Uuid,
        expected: OrderState,
        next: OrderState,
        tracking_number: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut orders = self.orders.lock().await;
        match orders.get_mut(&id) {
            Some(order) if order.state() == expected => {
                order.apply_state(next, tracking_number.map(str::to_string), at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn attach_intent(&self, id: Uuid, intent_id: &str) -> Result<()> {
        let mut orders = self.orders.lock().await;
        let order = orders.get_mut(&id).ok_or(EcommerceError::NotFound)?;
        order.attach_intent(intent_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    products: Mutex<HashMap<String, ProductSnapshot>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self { Self::default() }

    pub async fn insert(&self, product_id: impl Into<String>, product: ProductSnapshot) {
        self.products.lock().await.insert(product_id.into(), product);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn get_product(&self, product_id: &str) -> Result<Option<ProductSnapshot>> {
        Ok(self.products.lock().await.get(product_id).cloned())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentNotification {
    Confirmation { order_id: Uuid, email: String },
    StatusUpdate(StatusUpdate),
}

/// Keeps every notification it is asked to send; can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self { Self::default() }

    pub fn fail_sends(&self, failing: bool) { self.failing.store(failing, Ordering::SeqCst); }

    pub async fn sent(&self) -> Vec<SentNotification> { self.sent.lock().await.clone() }

    pub async fn confirmations_for(&self, order_id: Uuid) -> usize {
        self.sent.lock().await.iter().filter(|n| matches!(n, SentNotification::Confirmation { order_id: id, .. } if *id == order_id)).count()
    }

    async fn record(&self, n: SentNotification) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EcommerceError::Persistence("mail relay unavailable".into()));
        }
        self.sent.lock().await.push(n);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        self.record(SentNotification::Confirmation { order_id: order.id(), email: order.email().to_string() }).await
    }

    async fn send_order_status_update(&self, update: &StatusUpdate) -> Result<()> {
        self.record(SentNotification::StatusUpdate(update.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::line;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_first_access_single_cart() {
        let repo = Arc::new(InMemoryCartRepository::new());
        let owner = Identity::guest("fresh");
        let (a, b) = tokio::join!(repo.find_or_create(&owner), repo.find_or_create(&owner));
        assert_eq!(a.unwrap().id(), b.unwrap().id());
    }

    #[tokio::test]
    async fn test_transfer_reowns_when_user_has_no_cart() {
        let repo = InMemoryCartRepository::new();
        let guest = Identity::guest("s1");
        let user = Identity::user("u1");
        let guest_cart = repo.add_line(&guest, line("A", "red", "M", 2, dec!(10))).await.unwrap();

        let moved = repo.transfer(&guest, &user).await.unwrap().unwrap();
        assert_eq!(moved.id(), guest_cart.id());
        assert_eq!(moved.owner(), &user);
        assert!(repo.find(&guest).await.unwrap().is_none());
        assert!(repo.transfer(&guest, &user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_state() {
        use crate::domain::aggregates::{NewOrder, OrderStatus, PaymentMethod, PaymentStatus};
        use crate::domain::aggregates::order::address;
        use crate::domain::value_objects::PaymentMethodKind;

        let repo = InMemoryOrderRepository::new();
        let order = Order::place(NewOrder {
            owner: Identity::user("u1"),
            email: "u1@example.com".into(),
            items: vec![line("A", "red", "M", 1, dec!(10)).into()],
            shipping_address: address(),
            shipping_method: ShippingMethod::Standard,
            payment_method: PaymentMethod { kind: PaymentMethodKind::Card, display_name: "Visa".into(), intent_id: None },
            tax_rate: dec!(0),
        })
        .unwrap();
        repo.insert(&order).await.unwrap();

        let next = OrderState::new(OrderStatus::Confirmed, PaymentStatus::Paid);
        assert!(repo.compare_and_set(order.id(), order.state(), next, None, Utc::now()).await.unwrap());
        assert!(!repo.compare_and_set(order.id(), order.state(), next, None, Utc::now()).await.unwrap());
        assert_eq!(repo.get(order.id()).await.unwrap().unwrap().state(), next);
    }
}
