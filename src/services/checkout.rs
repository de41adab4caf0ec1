//! Order factory: turns a cart snapshot (or an explicit item list) into a price-frozen order.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

use crate::domain::aggregates::{NewOrder, Order, OrderLine, PaymentMethod, ShippingAddress};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{LineKey, PaymentMethodKind, Quantity, ShippingMethod};
use crate::domain::Identity;
use crate::ports::{CartRepository, OrderRepository, ProductCatalog};
use crate::services::cart::snapshot_line;
use crate::services::orders::OrderLifecycle;
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedItem {
    pub product_id: String,
    pub color: String,
    pub size: String,
    pub quantity: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSelection {
    #[serde(rename = "type")]
    pub kind: PaymentMethodKind,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    /// Overrides the cart when present and non-empty. Prices are always re-read from the catalog.
    #[serde(default)]
    pub items: Option<Vec<RequestedItem>>,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub shipping_method: Option<ShippingMethod>,
    pub payment_method: PaymentSelection,
}

#[derive(Clone)]
pub struct OrderFactory {
    carts: Arc<dyn CartRepository>,
    catalog: Arc<dyn ProductCatalog>,
    orders: Arc<dyn OrderRepository>,
    lifecycle: OrderLifecycle,
    tax_rate: Decimal,
}

impl OrderFactory {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        catalog: Arc<dyn ProductCatalog>,
        orders: Arc<dyn OrderRepository>,
        lifecycle: OrderLifecycle,
        tax_rate: Decimal,
    ) -> Self {
        Self { carts, catalog, orders, lifecycle, tax_rate }
    }

    /// The source cart is left untouched; clearing it is the caller's call.
    #[instrument(skip(self, account_email, request), fields(owner = %owner, kind = %request.payment_method.kind))]
    pub async fn create_order(&self, owner: &Identity, account_email: Option<&str>, request: PlaceOrder) -> Result<Order> {
        request.shipping_address.validate()?;
        let email = account_email
            .or(request.shipping_address.email.as_deref())
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| EcommerceError::validation("an email address is required to place an order"))?
            .to_string();

        let (items, cart_method) = match request.items.filter(|items| !items.is_empty()) {
            Some(requested) => (self.price_items(requested).await?, None),
            None => {
                let cart = self.carts.find(owner).await?.filter(|c| !c.is_empty());
                let cart = cart.ok_or_else(|| EcommerceError::validation("cart is empty"))?;
                (cart.items().iter().cloned().map(OrderLine::from).collect(), cart.shipping_method())
            }
        };

        let kind = request.payment_method.kind;
        let display_name = request.payment_method.display_name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| default_display_name(kind).to_string());
        let mut order = Order::place(NewOrder {
            owner: owner.clone(),
            email,
            items,
            shipping_address: request.shipping_address,
            shipping_method: request.shipping_method.or(cart_method).unwrap_or_default(),
            payment_method: PaymentMethod { kind, display_name, intent_id: None },
            tax_rate: self.tax_rate,
        })?;
        match self.orders.insert(&order).await {
            Err(EcommerceError::Conflict(detail)) => {
                tracing::warn!(order_number = order.order_number(), error = %detail, "order number taken, drawing another");
                order.renumber();
                self.orders.insert(&order).await?;
            }
            other => other?,
        }
        tracing::info!(order_id = %order.id(), order_number = order.order_number(), total = %order.totals().total, "order placed");

        match kind {
            PaymentMethodKind::Cod => Ok(self.lifecycle.apply(order.id(), OrderEvent::CashOrderPlaced).await?.order),
            PaymentMethodKind::Card => Ok(order),
        }
    }

    async fn price_items(&self, requested: Vec<RequestedItem>) -> Result<Vec<OrderLine>> {
        let mut lines: Vec<OrderLine> = Vec::with_capacity(requested.len());
        for item in requested {
            let quantity = Quantity::new(item.quantity)?;
            let line = snapshot_line(self.catalog.as_ref(), LineKey::new(item.product_id, item.color, item.size), quantity).await?;
            match lines.iter_mut().find(|l| l.product_id == line.product_id && l.color == line.color && l.size == line.size) {
                Some(existing) => existing.quantity = existing.quantity.add(quantity),
                None => lines.push(line.into()),
            }
        }
        Ok(lines)
    }
}

fn default_display_name(kind: PaymentMethodKind) -> &'static str {
    match kind {
        PaymentMethodKind::Cod => "Cash on delivery",
        PaymentMethodKind::Card => "Card",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::address;
    use crate::domain::aggregates::{OrderStatus, PaymentStatus};
    use crate::infrastructure::memory::{InMemoryCartRepository, InMemoryOrderRepository, RecordingNotifier};
    use crate::ports::ProductSnapshot;
    use crate::services::cart::{catalog, CartService};
    use rust_decimal_macros::dec;

    struct Harness {
        carts: CartService,
        catalog: Arc<crate::infrastructure::memory::InMemoryCatalog>,
        notifier: Arc<RecordingNotifier>,
        factory: OrderFactory,
    }

    async fn harness() -> Harness {
        let cart_repo = Arc::new(InMemoryCartRepository::new());
        let catalog = catalog().await;
        let orders = Arc::new(InMemoryOrderRepository::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let lifecycle = OrderLifecycle::new(orders.clone(), notifier.clone());
        Harness {
            carts: CartService::new(cart_repo.clone(), catalog.clone()),
            factory: OrderFactory::new(cart_repo, catalog.clone(), orders, lifecycle, dec!(0.05)),
            catalog,
            notifier,
        }
    }

    fn request(kind: PaymentMethodKind) -> PlaceOrder {
        PlaceOrder {
            items: None,
            shipping_address: address(),
            shipping_method: None,
            payment_method: PaymentSelection { kind, display_name: None },
        }
    }

    #[tokio::test]
    async fn test_cod_order_confirms_with_one_email() {
        let h = harness().await;
        let owner = Identity::user("u1");
        h.carts.add_item(&owner, LineKey::new("A", "red", "M"), 2).await.unwrap();

        let order = h.factory.create_order(&owner, Some("u1@example.com"), request(PaymentMethodKind::Cod)).await.unwrap();
        assert_eq!(order.totals().subtotal, dec!(20.00));
        assert_eq!(order.totals().shipping, dec!(5));
        assert_eq!(order.totals().tax, dec!(1.00));
        assert_eq!(order.totals().total, dec!(26.00));
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.email(), "u1@example.com");
        assert_eq!(h.notifier.confirmations_for(order.id()).await, 1);
        assert_eq!(h.carts.find_or_create(&owner).await.unwrap().item_count(), 2);
    }

    #[tokio::test]
    async fn test_card_order_waits_for_payment() {
        let h = harness().await;
        let owner = Identity::guest("s1");
        h.carts.add_item(&owner, LineKey::new("A", "red", "M"), 1).await.unwrap();
        let order = h.factory.create_order(&owner, None, request(PaymentMethodKind::Card)).await.unwrap();
        assert_eq!(order.state().status, OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Unpaid);
        assert_eq!(order.email(), "ada@example.com");
        assert!(h.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_shipping_method_precedence() {
        let h = harness().await;
        let owner = Identity::user("u1");
        h.carts.add_item(&owner, LineKey::new("A", "red", "M"), 1).await.unwrap();
        h.carts.set_shipping_method(&owner, "express").await.unwrap();

        let from_cart = h.factory.create_order(&owner, None, request(PaymentMethodKind::Card)).await.unwrap();
        assert_eq!(from_cart.shipping_method(), ShippingMethod::Express);

        let mut explicit = request(PaymentMethodKind::Card);
        explicit.shipping_method = Some(ShippingMethod::Overnight);
        let overridden = h.factory.create_order(&owner, None, explicit).await.unwrap();
        assert_eq!(overridden.totals().shipping, dec!(25));
    }

    #[tokio::test]
    async fn test_explicit_items_use_catalog_prices() {
        let h = harness().await;
        let mut req = request(PaymentMethodKind::Card);
        req.items = Some(vec![
            RequestedItem { product_id: "B".into(), color: "blue".into(), size: "L".into(), quantity: 1 },
            RequestedItem { product_id: "B".into(), color: "blue".into(), size: "L".into(), quantity: 1 },
        ]);
        let order = h.factory.create_order(&Identity::guest("s9"), None, req).await.unwrap();
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].quantity.value(), 2);
        assert_eq!(order.totals().subtotal, dec!(9.00));
    }

    #[tokio::test]
    async fn test_totals_frozen_after_price_change() {
        let h = harness().await;
        let owner = Identity::user("u1");
        h.carts.add_item(&owner, LineKey::new("A", "red", "M"), 2).await.unwrap();
        let order = h.factory.create_order(&owner, None, request(PaymentMethodKind::Cod)).await.unwrap();

        h.catalog.insert("A", ProductSnapshot {
            name: "Product A".into(), price: dec!(99.00), image: None, available_colors: vec![], available_sizes: vec![],
        }).await;
        let again = h.factory.lifecycle.get_for(&owner, order.id()).await.unwrap();
        assert_eq!(again.totals().total, dec!(26.00));
        assert_eq!(again.items()[0].price, dec!(10.00));
    }

    #[tokio::test]
    async fn test_rejections() {
        let h = harness().await;
        let owner = Identity::user("u1");
        assert!(h.factory.create_order(&owner, None, request(PaymentMethodKind::Cod)).await.unwrap_err().is_validation());

        h.carts.add_item(&owner, LineKey::new("A", "red", "M"), 1).await.unwrap();
        let mut no_email = request(PaymentMethodKind::Card);
        no_email.shipping_address.email = None;
        assert!(h.factory.create_order(&owner, None, no_email).await.unwrap_err().is_validation());

        let mut bad_address = request(PaymentMethodKind::Card);
        bad_address.shipping_address.street = String::new();
        assert!(h.factory.create_order(&owner, None, bad_address).await.unwrap_err().is_validation());
    }

    /// Rejects the first insert as if its order number were already stored.
    struct TakenNumber {
        inner: InMemoryOrderRepository,
        rejected: tokio::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl OrderRepository for TakenNumber {
        async fn insert(&self, order: &Order) -> Result<()> {
            let mut rejected = self.rejected.lock().await;
            if rejected.is_empty() {
                rejected.push(order.order_number().to_string());
                return Err(EcommerceError::Conflict("duplicate key value violates unique constraint".into()));
            }
            self.inner.insert(order).await
        }
        async fn get(&self, id: uuid::Uuid) -> Result<Option<Order>> { self.inner.get(id).await }
        async fn list_for_owner(&self, owner: &Identity, page: crate::ports::Page) -> Result<Vec<Order>> {
            self.inner.list_for_owner(owner, page).await
        }
        async fn list_all(&self, page: crate::ports::Page) -> Result<Vec<Order>> { self.inner.list_all(page).await }
        async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Order>> { self.inner.find_by_intent(intent_id).await }
        async fn compare_and_set(
            &self,
            id: uuid::Uuid,
            expected: crate::domain::aggregates::OrderState,
            next: crate::domain::aggregates::OrderState,
            tracking_number: Option<&str>,
            at: chrono::DateTime<chrono::Utc>,
        ) -> Result<bool> {
            self.inner.compare_and_set(id, expected, next, tracking_number, at).await
        }
        async fn attach_intent(&self, id: uuid::Uuid, intent_id: &str) -> Result<()> { self.inner.attach_intent(id, intent_id).await }
    }

    #[tokio::test]
    async fn test_order_number_collision_draws_another() {
        let cart_repo = Arc::new(InMemoryCartRepository::new());
        let catalog = catalog().await;
        let orders = Arc::new(TakenNumber { inner: InMemoryOrderRepository::new(), rejected: Default::default() });
        let notifier = Arc::new(RecordingNotifier::new());
        let lifecycle = OrderLifecycle::new(orders.clone(), notifier.clone());
        let carts = CartService::new(cart_repo.clone(), catalog.clone());
        let factory = OrderFactory::new(cart_repo, catalog, orders.clone(), lifecycle, dec!(0.05));

        let owner = Identity::user("u1");
        carts.add_item(&owner, LineKey::new("A", "red", "M"), 1).await.unwrap();
        let order = factory.create_order(&owner, None, request(PaymentMethodKind::Cod)).await.unwrap();

        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert!(order.order_number().starts_with("ORD-"));
        assert_eq!(orders.rejected.lock().await.len(), 1);
        let stored = orders.get(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.order_number(), order.order_number());
        assert_eq!(notifier.confirmations_for(order.id()).await, 1);
    }
}
