//! Postgres adapters.
//!
//! Carts are a `carts` row plus `cart_items` rows keyed by `(cart_id, product_id, color, size)`,
//! so quantity merges are a single `ON CONFLICT ... DO UPDATE` increment, capped at
//! [`Quantity::MAX`] like the in-memory merge. Order state changes
//! are conditional updates on the previous `(status, payment_status)` pair.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use std::future::Future;
use std::pin::Pin;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::aggregates::{
    Cart, CartLine, LineSelector, Order, OrderLine, OrderState, OrderTotals, PaymentMethod, ShippingAddress,
};
use crate::domain::value_objects::{Quantity, QuantityUpdate, ShippingMethod};
use crate::domain::Identity;
use crate::ports::{CartRepository, OrderRepository, Page, ProductCatalog, ProductSnapshot};
use crate::{EcommerceError, Result};

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    owner_kind: String,
    owner_id: String,
    shipping_method: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    product_id: String,
    color: String,
    size: String,
    quantity: i32,
    name: String,
    price: Decimal,
    image: Option<String>,
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> EcommerceError {
    EcommerceError::Persistence(format!("unreadable {what}: {detail}"))
}

fn db_quantity(q: Quantity) -> Result<i32> {
    i32::try_from(q.value()).map_err(|_| EcommerceError::InvalidQuantity(format!("quantity {} is too large", q.value())))
}

/// Work done on a cart's rows inside the mutation transaction.
type TxFuture<'c> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'c>>;

const CART_COLUMNS: &str = "id, owner_kind, owner_id, shipping_method, created_at, updated_at";

#[derive(Clone)]
pub struct PgCartRepository {
    pool: PgPool,
}

impl PgCartRepository {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    /// Find-or-create as one statement; the no-op update makes `RETURNING` yield the existing row.
    async fn upsert(conn: &mut PgConnection, owner: &Identity) -> Result<CartRow> {
        let sql = format!(
            "INSERT INTO carts (id, owner_kind, owner_id, created_at, updated_at) VALUES ($1, $2, $3, NOW(), NOW()) \
             ON CONFLICT (owner_kind, owner_id) DO UPDATE SET owner_id = EXCLUDED.owner_id RETURNING {CART_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, CartRow>(&sql)
            .bind(Uuid::now_v7()).bind(owner.kind()).bind(owner.id())
            .fetch_one(conn).await?)
    }

    async fn row_for(conn: &mut PgConnection, owner: &Identity, lock: bool) -> Result<Option<CartRow>> {
        let sql = format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE owner_kind = $1 AND owner_id = $2{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        Ok(sqlx::query_as::<_, CartRow>(&sql).bind(owner.kind()).bind(owner.id()).fetch_optional(conn).await?)
    }

    async fn touch(conn: &mut PgConnection, cart_id: Uuid) -> Result<CartRow> {
        let sql = format!("UPDATE carts SET updated_at = NOW() WHERE id = $1 RETURNING {CART_COLUMNS}");
        Ok(sqlx::query_as::<_, CartRow>(&sql).bind(cart_id).fetch_one(conn).await?)
    }

    async fn hydrate(conn: &mut PgConnection, row: CartRow) -> Result<Cart> {
        let items = sqlx::query_as::<_, CartItemRow>(
            "SELECT product_id, color, size, quantity, name, price, image FROM cart_items WHERE cart_id = $1 ORDER BY position",
        )
        .bind(row.id)
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(|i| -> Result<CartLine> {
            Ok(CartLine {
                quantity: Quantity::new(i64::from(i.quantity)).map_err(|e| corrupt("cart item", e))?,
                product_id: i.product_id, color: i.color, size: i.size, name: i.name, price: i.price, image: i.image,
            })
        })
        .collect::<Result<Vec<_>>>()?;
        let owner = Identity::from_parts(&row.owner_kind, row.owner_id).ok_or_else(|| corrupt("cart owner", &row.owner_kind))?;
        let shipping = row.shipping_method.as_deref().map(str::parse::<ShippingMethod>).transpose().map_err(|e| corrupt("cart", e))?;
        Ok(Cart::restore(row.id, owner, items, shipping, row.created_at, row.updated_at))
    }

    /// Runs `f` against the owner's cart row inside a transaction and returns the result cart.
    async fn mutate<F>(&self, owner: &Identity, f: F) -> Result<Cart>
    where
        F: for<'c> FnOnce(&'c mut PgConnection, Uuid) -> TxFuture<'c> + Send,
    {
        let mut tx = self.pool.begin().await?;
        let row = Self::upsert(&mut *tx, owner).await?;
        f(&mut *tx, row.id).await?;
        let row = Self::touch(&mut *tx, row.id).await?;
        let cart = Self::hydrate(&mut *tx, row).await?;
        tx.commit().await?;
        Ok(cart)
    }
}

fn selector_binds(selector: &LineSelector) -> (Option<String>, Option<String>) {
    match &selector.variant {
        Some((color, size)) => (Some(color.clone()), Some(size.clone())),
        None => (None, None),
    }
}

const SELECT_LINES: &str = "cart_id = $1 AND product_id = $2 AND ($3::TEXT IS NULL OR (color = $3 AND size = $4))";

#[async_trait]
impl CartRepository for PgCartRepository {
    async fn find(&self, owner: &Identity) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        match Self::row_for(&mut *conn, owner, false).await? {
            Some(row) => Ok(Some(Self::hydrate(&mut *conn, row).await?)),
            None => Ok(None),
        }
    }

    async fn find_or_create(&self, owner: &Identity) -> Result<Cart> {
        let mut conn = self.pool.acquire().await?;
        let row = Self::upsert(&mut *conn, owner).await?;
        Self::hydrate(&mut *conn, row).await
    }

    async fn add_line(&self, owner: &Identity, line: CartLine) -> Result<Cart> {
        let quantity = db_quantity(line.quantity)?;
        self.mutate(owner, move |conn, cart_id| {
            Box::pin(async move {
                sqlx::query(
                    "INSERT INTO cart_items (cart_id, product_id, color, size, quantity, name, price, image) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                     ON CONFLICT (cart_id, product_id, color, size) DO UPDATE SET quantity = LEAST(cart_items.quantity::BIGINT + EXCLUDED.quantity, 2147483647)::INTEGER",
                )
                .bind(cart_id).bind(&line.product_id).bind(&line.color).bind(&line.size)
                .bind(quantity).bind(&line.name).bind(line.price).bind(&line.image)
                .execute(conn).await?;
                Ok(())
            })
        })
        .await
    }

    async fn update_quantity(&self, owner: &Identity, selector: &LineSelector, update: QuantityUpdate) -> Result<Cart> {
        let product_id = selector.product_id.clone();
        let (color, size) = selector_binds(selector);
        self.mutate(owner, move |conn, cart_id| {
            Box::pin(async move {
                match update {
                    QuantityUpdate::Remove => {
                        sqlx::query(&format!("DELETE FROM cart_items WHERE {SELECT_LINES}"))
                            .bind(cart_id).bind(&product_id).bind(&color).bind(&size)
                            .execute(conn).await?;
                    }
                    QuantityUpdate::Set(quantity) => {
                        let updated = sqlx::query(&format!("UPDATE cart_items SET quantity = $5 WHERE {SELECT_LINES}"))
                            .bind(cart_id).bind(&product_id).bind(&color).bind(&size).bind(db_quantity(quantity)?)
                            .execute(conn).await?
                            .rows_affected();
                        if updated == 0 {
                            return Err(EcommerceError::validation(format!("product {product_id} is not in the cart")));
                        }
                    }
                }
                Ok(())
            })
        })
        .await
    }

    async fn remove(&self, owner: &Identity, selector: &LineSelector) -> Result<Cart> {
        self.update_quantity(owner, selector, QuantityUpdate::Remove).await
    }

    async fn set_shipping_method(&self, owner: &Identity, method: ShippingMethod) -> Result<Cart> {
        self.mutate(owner, move |conn, cart_id| {
            Box::pin(async move {
                sqlx::query("UPDATE carts SET shipping_method = $2 WHERE id = $1")
                    .bind(cart_id).bind(method.as_str())
                    .execute(conn).await?;
                Ok(())
            })
        })
        .await
    }

    async fn clear(&self, owner: &Identity) -> Result<Cart> {
        self.mutate(owner, |conn, cart_id| {
            Box::pin(async move {
                sqlx::query("DELETE FROM cart_items WHERE cart_id = $1").bind(cart_id).execute(conn).await?;
                Ok(())
            })
        })
        .await
    }

    async fn transfer(&self, guest: &Identity, user: &Identity) -> Result<Option<Cart>> {
        let mut tx = self.pool.begin().await?;
        let Some(guest_row) = Self::row_for(&mut *tx, guest, true).await? else {
            tx.commit().await?;
            return Ok(None);
        };
        let target = match Self::row_for(&mut *tx, user, true).await? {
            None => {
                sqlx::query("UPDATE carts SET owner_kind = $2, owner_id = $3, updated_at = NOW() WHERE id = $1")
                    .bind(guest_row.id).bind(user.kind()).bind(user.id())
                    .execute(&mut *tx).await?;
                guest_row.id
            }
            Some(user_row) => {
                sqlx::query(
                    "INSERT INTO cart_items (cart_id, product_id, color, size, quantity, name, price, image) \
                     SELECT $1, product_id, color, size, quantity, name, price, image FROM cart_items WHERE cart_id = $2 ORDER BY position \
                     ON CONFLICT (cart_id, product_id, color, size) DO UPDATE SET quantity = LEAST(cart_items.quantity::BIGINT + EXCLUDED.quantity, 2147483647)::INTEGER",
                )
                .bind(user_row.id).bind(guest_row.id)
                .execute(&mut *tx).await?;
                sqlx::query("UPDATE carts SET shipping_method = COALESCE(shipping_method, $2) WHERE id = $1")
                    .bind(user_row.id).bind(&guest_row.shipping_method)
                    .execute(&mut *tx).await?;
                sqlx::query("DELETE FROM carts WHERE id = $1").bind(guest_row.id).execute(&mut *tx).await?;
                user_row.id
            }
        };
        let row = Self::touch(&mut *tx, target).await?;
        let cart = Self::hydrate(&mut *tx, row).await?;
        tx.commit().await?;
        Ok(Some(cart))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    owner_kind: String,
    owner_id: String,
    email: String,
    items: Json<Vec<OrderLine>>,
    shipping_address: Json<ShippingAddress>,
    shipping_method: String,
    payment_kind: String,
    payment_display_name: String,
    payment_intent_id: Option<String>,
    subtotal: Decimal,
    shipping: Decimal,
    tax: Decimal,
    total: Decimal,
    status: String,
    payment_status: String,
    tracking_number: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = EcommerceError;

    fn try_from(r: OrderRow) -> Result<Self> {
        let owner = Identity::from_parts(&r.owner_kind, r.owner_id).ok_or_else(|| corrupt("order owner", &r.owner_kind))?;
        let state = OrderState::new(
            r.status.parse().map_err(|e| corrupt("order", e))?,
            r.payment_status.parse().map_err(|e| corrupt("order", e))?,
        );
        Ok(Order::restore(
            r.id,
            r.order_number,
            owner,
            r.email,
            r.items.0,
            r.shipping_address.0,
            r.shipping_method.parse().map_err(|e| corrupt("order", e))?,
            PaymentMethod {
                kind: r.payment_kind.parse().map_err(|e| corrupt("order", e))?,
                display_name: r.payment_display_name,
                intent_id: r.payment_intent_id,
            },
            OrderTotals { subtotal: r.subtotal, shipping: r.shipping, tax: r.tax, total: r.total },
            state,
            r.tracking_number,
            r.created_at,
            r.updated_at,
        ))
    }
}

#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>> {
    rows.into_iter().map(Order::try_from).collect()
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, o: &Order) -> Result<()> {
        let t = o.totals();
        let pm = o.payment_method();
        sqlx::query(
            "INSERT INTO orders (id, order_number, owner_kind, owner_id, email, items, shipping_address, shipping_method, \
             payment_kind, payment_display_name, payment_intent_id, subtotal, shipping, tax, total, status, payment_status, \
             tracking_number, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
        )
        .bind(o.id()).bind(o.order_number()).bind(o.owner().kind()).bind(o.owner().id()).bind(o.email())
        .bind(Json(o.items())).bind(Json(o.shipping_address())).bind(o.shipping_method().as_str())
        .bind(pm.kind.as_str()).bind(&pm.display_name).bind(&pm.intent_id)
        .bind(t.subtotal).bind(t.shipping).bind(t.tax).bind(t.total)
        .bind(o.status().as_str()).bind(o.payment_status().as_str()).bind(o.tracking_number())
        .bind(o.created_at()).bind(o.updated_at())
        .execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn list_for_owner(&self, owner: &Identity, page: Page) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE owner_kind = $1 AND owner_id = $2 ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
        )
        .bind(owner.kind()).bind(owner.id()).bind(page.limit()).bind(page.offset())
        .fetch_all(&self.pool).await?;
        into_orders(rows)
    }

    async fn list_all(&self, page: Page) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2")
            .bind(page.limit()).bind(page.offset())
            .fetch_all(&self.pool).await?;
        into_orders(rows)
    }

    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE payment_intent_id = $1")
            .bind(intent_id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn compare_and_set(
        &self,
        id: Uuid,
        expected: OrderState,
        next: OrderState,
        tracking_number: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE orders SET status = $2, payment_status = $3, tracking_number = COALESCE($4, tracking_number), updated_at = $5 \
             WHERE id = $1 AND status = $6 AND payment_status = $7",
        )
        .bind(id).bind(next.status.as_str()).bind(next.payment_status.as_str()).bind(tracking_number).bind(at)
        .bind(expected.status.as_str()).bind(expected.payment_status.as_str())
        .execute(&self.pool).await?
        .rows_affected();
        Ok(updated == 1)
    }

    async fn attach_intent(&self, id: Uuid, intent_id: &str) -> Result<()> {
        let updated = sqlx::query("UPDATE orders SET payment_intent_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id).bind(intent_id)
            .execute(&self.pool).await?
            .rows_affected();
        if updated == 0 { return Err(EcommerceError::NotFound); }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    name: String,
    price: Decimal,
    image: Option<String>,
    available_colors: Vec<String>,
    available_sizes: Vec<String>,
}

#[derive(Clone)]
pub struct PgProductCatalog {
    pool: PgPool,
}

impl PgProductCatalog {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl ProductCatalog for PgProductCatalog {
    async fn get_product(&self, product_id: &str) -> Result<Option<ProductSnapshot>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT name, price, image, available_colors, available_sizes FROM products WHERE id = $1 AND status = 'active'",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|p| ProductSnapshot {
            name: p.name, price: p.price, image: p.image, available_colors: p.available_colors, available_sizes: p.available_sizes,
        }))
    }
}
