//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::identity::Identity;
use crate::domain::value_objects::{LineKey, Quantity, QuantityUpdate, ShippingMethod};
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    id: Uuid,
    owner: Identity,
    items: Vec<CartLine>,
    shipping_method: Option<ShippingMethod>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// One product/color/size entry with display data captured when it was added.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub color: String,
    pub size: String,
    pub quantity: Quantity,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
}

impl CartLine {
    pub fn key(&self) -> LineKey { LineKey::new(&self.product_id, &self.color, &self.size) }
    pub fn line_total(&self) -> Decimal { self.price * Decimal::from(self.quantity.value()) }
}

/// Which lines an update or removal targets.
///
/// Without a variant every line of the product matches; with one only the exact line does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineSelector {
    pub product_id: String,
    pub variant: Option<(String, String)>,
}

impl LineSelector {
    pub fn product(product_id: impl Into<String>) -> Self { Self { product_id: product_id.into(), variant: None } }

    pub fn exact(key: &LineKey) -> Self {
        Self { product_id: key.product_id.clone(), variant: Some((key.color.clone(), key.size.clone())) }
    }

    pub fn matches(&self, line: &CartLine) -> bool {
        line.product_id == self.product_id
            && self.variant.as_ref().map_or(true, |(color, size)| &line.color == color && &line.size == size)
    }
}

impl Cart {
    pub fn new(owner: Identity) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), owner, items: vec![], shipping_method: None, created_at: now, updated_at: now }
    }

    /// Rebuilds a cart loaded from storage.
    pub fn restore(
        id: Uuid,
        owner: Identity,
        items: Vec<CartLine>,
        shipping_method: Option<ShippingMethod>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, owner, items, shipping_method, created_at, updated_at }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn owner(&self) -> &Identity { &self.owner }
    pub fn items(&self) -> &[CartLine] { &self.items }
    pub fn shipping_method(&self) -> Option<ShippingMethod> { self.shipping_method }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity.value()).sum() }
    pub fn subtotal(&self) -> Decimal { self.items.iter().map(CartLine::line_total).sum() }

    pub fn line(&self, key: &LineKey) -> Option<&CartLine> { self.items.iter().find(|i| &i.key() == key) }

    /// Adds a line, summing quantities into an existing line with the same key.
    pub fn add_line(&mut self, line: CartLine) {
        let key = line.key();
        if let Some(existing) = self.items.iter_mut().find(|i| i.key() == key) {
            existing.quantity = existing.quantity.add(line.quantity);
        } else {
            self.items.push(line);
        }
        self.touch();
    }

    /// Sets or removes the selected lines. Returns how many lines matched.
    pub fn update_quantity(&mut self, selector: &LineSelector, update: QuantityUpdate) -> Result<usize> {
        match update {
            QuantityUpdate::Remove => Ok(self.remove(selector)),
            QuantityUpdate::Set(quantity) => {
                let mut matched = 0;
                for line in self.items.iter_mut().filter(|l| selector.matches(l)) {
                    line.quantity = quantity;
                    matched += 1;
                }
                if matched == 0 {
                    return Err(EcommerceError::validation(format!("product {} is not in the cart", selector.product_id)));
                }
                self.touch();
                Ok(matched)
            }
        }
    }

    /// Removes every matching line. Returns how many were removed.
    pub fn remove(&mut self, selector: &LineSelector) -> usize {
        let before = self.items.len();
        self.items.retain(|l| !selector.matches(l));
        let removed = before - self.items.len();
        if removed > 0 { self.touch(); }
        removed
    }

    pub fn set_shipping_method(&mut self, method: ShippingMethod) { self.shipping_method = Some(method); self.touch(); }

    /// Empties the items; the shipping method is kept.
    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    /// Folds a guest cart's lines into this one with the same dedupe rule as `add_line`.
    pub fn absorb(&mut self, guest: Cart) {
        for line in guest.items { self.add_line(line); }
        if self.shipping_method.is_none() { self.shipping_method = guest.shipping_method; }
        self.touch();
    }

    /// Hands the cart to a new owner, keeping its lines.
    pub fn reassign(&mut self, owner: Identity) { self.owner = owner; self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
pub(crate) fn line(product_id: &str, color: &str, size: &str, qty: i64, price: Decimal) -> CartLine {
    CartLine {
        product_id: product_id.into(), color: color.into(), size: size.into(),
        quantity: Quantity::new(qty).unwrap(), name: format!("Product {product_id}"), price, image: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quantities(cart: &Cart) -> Vec<(String, u32)> {
        cart.items().iter().map(|l| (format!("{}/{}/{}", l.product_id, l.color, l.size), l.quantity.value())).collect()
    }

    #[test]
    fn test_same_key_merges() {
        let mut cart = Cart::new(Identity::guest("s1"));
        cart.add_line(line("P1", "red", "M", 2, dec!(10)));
        cart.add_line(line("P1", "red", "M", 3, dec!(10)));
        cart.add_line(line("P1", "red", "M", 1, dec!(10)));
        assert_eq!(quantities(&cart), vec![("P1/red/M".to_string(), 6)]);
        assert_eq!(cart.subtotal(), dec!(60));
    }

    #[test]
    fn test_different_variant_appends() {
        let mut cart = Cart::new(Identity::guest("s1"));
        cart.add_line(line("P1", "red", "M", 1, dec!(10)));
        cart.add_line(line("P1", "blue", "M", 1, dec!(10)));
        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_zero_removes_then_fresh_add() {
        let mut cart = Cart::new(Identity::guest("s1"));
        cart.add_line(line("P1", "red", "M", 5, dec!(10)));
        cart.update_quantity(&LineSelector::product("P1"), QuantityUpdate::Remove).unwrap();
        assert!(cart.is_empty());
        cart.add_line(line("P1", "red", "M", 2, dec!(10)));
        assert_eq!(quantities(&cart), vec![("P1/red/M".to_string(), 2)]);
    }

    #[test]
    fn test_exact_selector_leaves_other_variants() {
        let mut cart = Cart::new(Identity::guest("s1"));
        cart.add_line(line("P1", "red", "M", 1, dec!(10)));
        cart.add_line(line("P1", "blue", "L", 1, dec!(10)));
        let removed = cart.remove(&LineSelector::exact(&LineKey::new("P1", "red", "M")));
        assert_eq!(removed, 1);
        assert_eq!(quantities(&cart), vec![("P1/blue/L".to_string(), 1)]);
        assert_eq!(cart.remove(&LineSelector::product("P1")), 1);
    }

    #[test]
    fn test_set_quantity_on_missing_product() {
        let mut cart = Cart::new(Identity::guest("s1"));
        let err = cart.update_quantity(&LineSelector::product("nope"), QuantityUpdate::Set(Quantity::new(2).unwrap()));
        assert!(err.unwrap_err().is_validation());
    }

    #[test]
    fn test_clear_keeps_shipping() {
        let mut cart = Cart::new(Identity::user("u1"));
        cart.add_line(line("P1", "red", "M", 1, dec!(10)));
        cart.set_shipping_method(ShippingMethod::Express);
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.shipping_method(), Some(ShippingMethod::Express));
    }

    #[test]
    fn test_absorb_sums_matching_lines() {
        let mut user = Cart::new(Identity::user("u1"));
        user.add_line(line("A", "red", "M", 1, dec!(10)));
        user.add_line(line("B", "red", "M", 3, dec!(4)));
        let mut guest = Cart::new(Identity::guest("s1"));
        guest.add_line(line("A", "red", "M", 2, dec!(10)));
        user.absorb(guest);
        assert_eq!(quantities(&user), vec![("A/red/M".to_string(), 3), ("B/red/M".to_string(), 3)]);
    }

    #[test]
    fn test_merge_caps_at_max_quantity() {
        let max = i64::from(Quantity::MAX);
        let mut cart = Cart::new(Identity::user("u1"));
        cart.add_line(line("A", "red", "M", max - 1, dec!(1)));
        cart.add_line(line("A", "red", "M", 5, dec!(1)));
        assert_eq!(quantities(&cart), vec![("A/red/M".to_string(), Quantity::MAX)]);
        let mut guest = Cart::new(Identity::guest("s1"));
        guest.add_line(line("A", "red", "M", max, dec!(1)));
        cart.absorb(guest);
        assert_eq!(cart.items()[0].quantity.value(), Quantity::MAX);
    }
}
