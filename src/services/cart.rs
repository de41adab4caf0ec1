//! Cart store operations and the guest-to-user merge.

use std::sync::Arc;
use tracing::instrument;

use crate::domain::aggregates::{Cart, CartLine, LineSelector};
use crate::domain::value_objects::{LineKey, Quantity, QuantityUpdate, ShippingMethod};
use crate::domain::Identity;
use crate::ports::{CartRepository, ProductCatalog, ProductSnapshot};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartRepository>,
    catalog: Arc<dyn ProductCatalog>,
}

/// Looks up a product and freezes its display data into a line.
pub(crate) async fn snapshot_line(catalog: &dyn ProductCatalog, key: LineKey, quantity: Quantity) -> Result<CartLine> {
    let product = catalog
        .get_product(&key.product_id)
        .await?
        .ok_or_else(|| EcommerceError::validation(format!("unknown product {}", key.product_id)))?;
    check_variant(&product, &key)?;
    Ok(CartLine {
        product_id: key.product_id,
        color: key.color,
        size: key.size,
        quantity,
        name: product.name,
        price: product.price,
        image: product.image,
    })
}

fn check_variant(product: &ProductSnapshot, key: &LineKey) -> Result<()> {
    if !product.available_colors.is_empty() && !product.available_colors.contains(&key.color) {
        return Err(EcommerceError::validation(format!("{} is not available in {}", product.name, key.color)));
    }
    if !product.available_sizes.is_empty() && !product.available_sizes.contains(&key.size) {
        return Err(EcommerceError::validation(format!("{} is not available in size {}", product.name, key.size)));
    }
    Ok(())
}

impl CartService {
    pub fn new(carts: Arc<dyn CartRepository>, catalog: Arc<dyn ProductCatalog>) -> Self { Self { carts, catalog } }

    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn find_or_create(&self, owner: &Identity) -> Result<Cart> {
        self.carts.find_or_create(owner).await
    }

    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn add_item(&self, owner: &Identity, key: LineKey, quantity: i64) -> Result<Cart> {
        let quantity = Quantity::new(quantity)?;
        let line = snapshot_line(self.catalog.as_ref(), key, quantity).await?;
        self.carts.add_line(owner, line).await
    }

    /// `0` removes the selected lines, a positive quantity replaces theirs.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn update_item_quantity(&self, owner: &Identity, selector: &LineSelector, quantity: i64) -> Result<Cart> {
        let update = QuantityUpdate::parse(quantity)?;
        self.carts.update_quantity(owner, selector, update).await
    }

    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn remove_item(&self, owner: &Identity, selector: &LineSelector) -> Result<Cart> {
        self.carts.remove(owner, selector).await
    }

    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn set_shipping_method(&self, owner: &Identity, method: &str) -> Result<Cart> {
        let method: ShippingMethod = method.parse()?;
        self.carts.set_shipping_method(owner, method).await
    }

    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn clear(&self, owner: &Identity) -> Result<Cart> {
        self.carts.clear(owner).await
    }

    /// Moves a guest cart to the signed-in user. Retrying after success is a no-op.
    #[instrument(skip(self), fields(guest = %guest, user = %user))]
    pub async fn transfer(&self, guest: &Identity, user: &Identity) -> Result<Option<Cart>> {
        if guest.is_user() || !user.is_user() {
            return Err(EcommerceError::validation("transfer goes from a guest session to a user"));
        }
        let moved = self.carts.transfer(guest, user).await?;
        match &moved {
            Some(cart) => tracing::info!(cart_id = %cart.id(), lines = cart.items().len(), "guest cart transferred"),
            None => tracing::debug!("no guest cart to transfer"),
        }
        Ok(moved)
    }
}

#[cfg(test)]
pub(crate) async fn catalog() -> Arc<crate::infrastructure::memory::InMemoryCatalog> {
    use rust_decimal_macros::dec;
    let catalog = Arc::new(crate::infrastructure::memory::InMemoryCatalog::new());
    for (id, price) in [("A", dec!(10.00)), ("B", dec!(4.50))] {
        catalog.insert(id, ProductSnapshot {
            name: format!("Product {id}"), price, image: Some(format!("/img/{id}.jpg")),
            available_colors: vec!["red".into(), "blue".into()], available_sizes: vec!["M".into(), "L".into()],
        }).await;
    }
    catalog
}
