use crate::{
    entities::{cart, cart_item, coupon, product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{coupons, discounts},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

/// One cart line joined with its product. `product` is `None` when the item
/// has no product id, or the product is missing or soft-deleted.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub item: cart_item::Model,
    pub product: Option<product::Model>,
}

/// A user's cart as read at one point in time.
#[derive(Debug, Clone)]
pub struct CartSnapshot {
    pub cart: cart::Model,
    pub lines: Vec<CartLine>,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Loads the cart of `user_id` with its items and products.
///
/// Generic over the connection so the checkout can read the cart inside its
/// own transaction. Returns `Ok(None)` when the user has no cart.
pub async fn load_snapshot<C>(conn: &C, user_id: i32) -> Result<Option<CartSnapshot>, ServiceError>
where
    C: ConnectionTrait,
{
    let Some(cart) = cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let lines = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .find_also_related(product::Entity)
        .order_by_asc(cart_item::Column::Id)
        .all(conn)
        .await?
        .into_iter()
        .map(|(item, product)| CartLine {
            item,
            product: product.filter(|p| !p.is_deleted()),
        })
        .collect();

    Ok(Some(CartSnapshot { cart, lines }))
}

/// Cart line as presented to the customer
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartItemView {
    pub item_id: i32,
    pub product_id: Option<i32>,
    pub name: Option<String>,
    pub unit_price: Option<Decimal>,
    pub quantity: i32,
    pub line_total: Decimal,
    /// False when the product is gone; such a line blocks checkout.
    pub available: bool,
}

/// Cart with computed totals (shipping excluded)
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartView {
    pub cart_id: Option<i32>,
    pub coupon_code: Option<String>,
    /// False when the applied coupon has expired or been deleted since it was applied.
    pub coupon_usable: bool,
    pub items: Vec<CartItemView>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl CartView {
    fn empty() -> Self {
        Self {
            cart_id: None,
            coupon_code: None,
            coupon_usable: false,
            items: Vec::new(),
            subtotal: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }
}

/// Result of a quantity-changing cart operation
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartItemChange {
    #[schema(value_type = Object)]
    pub item: cart_item::Model,
    /// True when the requested quantity was reduced to the available stock.
    pub capped: bool,
}

/// Shopping cart service.
///
/// Carts are created lazily by the first mutation and consumed by checkout.
/// Quantities are capped at the product's current stock; stock itself is
/// never reserved by the cart.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    /// Creates a new `CartService` instance.
    ///
    /// # Arguments
    ///
    /// * `db` - Database connection pool
    /// * `event_sender` - Event sender for publishing cart events
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the user's cart with line totals and the applied coupon's discount.
    ///
    /// A user without a cart gets an empty view rather than an error.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: i32) -> Result<CartView, ServiceError> {
        let Some(snapshot) = load_snapshot(&*self.db, user_id).await? else {
            return Ok(CartView::empty());
        };

        let applied_coupon = match snapshot.cart.coupon_id {
            Some(coupon_id) => coupon::Entity::find_by_id(coupon_id).one(&*self.db).await?,
            None => None,
        };

        let items: Vec<CartItemView> = snapshot
            .lines
            .iter()
            .map(|line| {
                let unit_price = line.product.as_ref().map(|p| p.price);
                CartItemView {
                    item_id: line.item.id,
                    product_id: line.item.product_id,
                    name: line.product.as_ref().map(|p| p.name.clone()),
                    unit_price,
                    quantity: line.item.quantity,
                    line_total: unit_price.unwrap_or_default()
                        * Decimal::from(line.item.quantity),
                    available: line.product.is_some(),
                }
            })
            .collect();

        let subtotal: Decimal = items.iter().map(|i| i.line_total).sum();
        let coupon_usable = applied_coupon
            .as_ref()
            .map_or(false, |c| discounts::is_usable(c, Utc::now()));
        let discount = match &applied_coupon {
            Some(c) if coupon_usable => discounts::discount(subtotal, c),
            _ => Decimal::ZERO,
        };

        Ok(CartView {
            cart_id: Some(snapshot.cart.id),
            coupon_code: applied_coupon.map(|c| c.code),
            coupon_usable,
            items,
            subtotal,
            discount,
            total: (subtotal - discount).max(Decimal::ZERO),
        })
    }

    /// Adds `quantity` units of a product, merging with an existing line.
    ///
    /// # Arguments
    ///
    /// * `user_id` - Owner of the cart; the cart is created if missing
    /// * `product_id` - Live (not soft-deleted) product to add
    /// * `quantity` - Units to add, at least 1
    ///
    /// # Returns
    ///
    /// * `Ok(CartItemChange)` - The stored line; `capped` is set when the
    ///   resulting quantity had to be reduced to the available stock
    /// * `Err(ServiceError::ProductUnavailable)` - Unknown or deleted product
    /// * `Err(ServiceError::InvalidInput)` - Bad quantity or product out of stock
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: i32,
        product_id: i32,
        quantity: i32,
    ) -> Result<CartItemChange, ServiceError> {
        ensure_quantity(quantity)?;

        let txn = self.db.begin().await?;

        let product = find_live_product(&txn, product_id).await?;
        ensure_in_stock(&product)?;

        let cart = find_or_create_cart(&txn, user_id).await?;
        let existing = find_line(&txn, cart.id, product_id).await?;

        let requested = existing
            .as_ref()
            .map_or(quantity, |line| line.quantity.saturating_add(quantity));
        let (quantity, capped) = cap_to_stock(requested, product.stock);
        let now = Utc::now();

        let item = match existing {
            Some(line) => {
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(quantity);
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => {
                cart_item::ActiveModel {
                    cart_id: Set(cart.id),
                    product_id: Set(Some(product_id)),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };
        touch_cart(&txn, cart.clone()).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated {
                cart_id: cart.id,
                user_id,
            })
            .await;

        info!(user_id, product_id, quantity, capped, "Added item to cart");
        Ok(CartItemChange { item, capped })
    }

    /// Sets the quantity of an existing line, capped at current stock.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: i32,
        product_id: i32,
        quantity: i32,
    ) -> Result<CartItemChange, ServiceError> {
        ensure_quantity(quantity)?;

        let txn = self.db.begin().await?;

        let cart = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or(ServiceError::CartNotFound(user_id))?;
        let line = find_line(&txn, cart.id, product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;

        let product = find_live_product(&txn, product_id).await?;
        ensure_in_stock(&product)?;
        let (quantity, capped) = cap_to_stock(quantity, product.stock);

        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        let item = active.update(&txn).await?;
        touch_cart(&txn, cart.clone()).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated {
                cart_id: cart.id,
                user_id,
            })
            .await;

        info!(user_id, product_id, quantity, capped, "Updated cart item quantity");
        Ok(CartItemChange { item, capped })
    }

    /// Removes a product line. Removing something that is not there succeeds.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: i32, product_id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let Some(cart) = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
        else {
            return Ok(());
        };

        if let Some(line) = find_line(&txn, cart.id, product_id).await? {
            line.delete(&txn).await?;
            touch_cart(&txn, cart.clone()).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated {
                cart_id: cart.id,
                user_id,
            })
            .await;

        info!(user_id, product_id, "Removed item from cart");
        Ok(())
    }

    /// Attaches a usable coupon to the cart; checkout will use it when no
    /// code is passed explicitly.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, user_id: i32, code: &str) -> Result<cart::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let coupon = coupons::find_by_code(&txn, code)
            .await?
            .ok_or_else(|| ServiceError::CouponNotFound(code.to_string()))?;
        if !discounts::is_usable(&coupon, Utc::now()) {
            return Err(ServiceError::CouponInvalid(code.to_string()));
        }

        let cart = find_or_create_cart(&txn, user_id).await?;
        let mut active: cart::ActiveModel = cart.into();
        active.coupon_id = Set(Some(coupon.id));
        active.updated_at = Set(Utc::now());
        let cart = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated {
                cart_id: cart.id,
                user_id,
            })
            .await;

        info!(user_id, coupon_id = coupon.id, "Applied coupon to cart");
        Ok(cart)
    }

    /// Detaches the coupon, if any.
    #[instrument(skip(self))]
    pub async fn remove_coupon(&self, user_id: i32) -> Result<(), ServiceError> {
        let Some(cart) = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(());
        };

        let cart_id = cart.id;
        let mut active: cart::ActiveModel = cart.into();
        active.coupon_id = Set(None);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartUpdated { cart_id, user_id })
            .await;

        info!(user_id, "Removed coupon from cart");
        Ok(())
    }
}

fn ensure_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::InvalidInput(
            "quantity must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn ensure_in_stock(product: &product::Model) -> Result<(), ServiceError> {
    if product.stock <= 0 {
        return Err(ServiceError::InvalidInput(format!(
            "quantity exceeds stock for product {}",
            product.id
        )));
    }
    Ok(())
}

fn cap_to_stock(requested: i32, stock: i32) -> (i32, bool) {
    if requested > stock {
        (stock, true)
    } else {
        (requested, false)
    }
}

async fn find_live_product(
    txn: &DatabaseTransaction,
    product_id: i32,
) -> Result<product::Model, ServiceError> {
    product::Entity::find_by_id(product_id)
        .filter(product::Column::DeletedAt.is_null())
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::ProductUnavailable(product_id.to_string()))
}

async fn find_line(
    txn: &DatabaseTransaction,
    cart_id: i32,
    product_id: i32,
) -> Result<Option<cart_item::Model>, ServiceError> {
    Ok(cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .filter(cart_item::Column::ProductId.eq(product_id))
        .one(txn)
        .await?)
}

async fn find_or_create_cart(
    txn: &DatabaseTransaction,
    user_id: i32,
) -> Result<cart::Model, ServiceError> {
    if let Some(cart) = cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(txn)
        .await?
    {
        return Ok(cart);
    }

    let now = Utc::now();
    cart::ActiveModel {
        user_id: Set(user_id),
        coupon_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(|e| {
        ServiceError::from_unique_violation(
            e,
            ServiceError::Conflict(format!("cart for user {} was created concurrently", user_id)),
        )
    })
}

async fn touch_cart(txn: &DatabaseTransaction, cart: cart::Model) -> Result<(), ServiceError> {
    let mut active: cart::ActiveModel = cart.into();
    active.updated_at = Set(Utc::now());
    active.update(txn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::cap_to_stock;

    #[test]
    fn quantities_above_stock_are_capped() {
        assert_eq!(cap_to_stock(3, 5), (3, false));
        assert_eq!(cap_to_stock(5, 5), (5, false));
        assert_eq!(cap_to_stock(8, 5), (5, true));
    }
}
