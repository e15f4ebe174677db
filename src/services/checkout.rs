use crate::{
    entities::{
        cart, cart_item, coupon,
        order::{self, OrderStatus},
        order_item, shipment,
        shipment::ShipmentStatus,
        shipping_method,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        carts::{self, CartLine},
        coupons, discounts,
        inventory::InventoryLedger,
        orders::OrderDetail,
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(range(min = 1))]
    pub shipping_method_id: i32,
    /// Overrides the coupon applied to the cart, if any
    #[validate(length(min = 1, max = 64))]
    pub coupon_code: Option<String>,
}

/// An order line priced and debited, waiting to be persisted.
#[derive(Debug)]
struct PricedLine {
    product_id: i32,
    quantity: i32,
    unit_price: Decimal,
    remaining_stock: i32,
}

/// Converts a cart into an order.
///
/// The whole conversion is one transaction: stock debits, the order, its
/// items, the shipment and the deletion of the cart commit together or not
/// at all.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CheckoutService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Places an order from the cart of `user_id`.
    ///
    /// `coupon_code` takes precedence over a coupon applied to the cart. A
    /// cart coupon that has expired or been deleted since it was applied is
    /// ignored rather than failing the checkout.
    ///
    /// # Errors
    ///
    /// * `CartNotFound` / `CartEmpty` - nothing to check out
    /// * `ProductUnavailable` - a line points at a missing or deleted product
    /// * `InsufficientStock` - first product (in lock order) short of stock
    /// * `CouponNotFound` / `CouponInvalid` - unknown, expired or deleted `coupon_code`
    /// * `ShippingMethodNotFound` - unknown or deleted shipping method
    #[instrument(skip(self))]
    pub async fn checkout(
        &self,
        user_id: i32,
        shipping_method_id: i32,
        coupon_code: Option<&str>,
    ) -> Result<OrderDetail, ServiceError> {
        let txn = self.db.begin().await?;

        let snapshot = carts::load_snapshot(&txn, user_id)
            .await?
            .ok_or(ServiceError::CartNotFound(user_id))?;
        if snapshot.is_empty() {
            return Err(ServiceError::CartEmpty(snapshot.cart.id));
        }

        let lines = debit_lines(&txn, snapshot.lines).await?;
        let subtotal: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();

        let code = coupon_code.map(str::trim).filter(|c| !c.is_empty());
        let coupon = resolve_coupon(&txn, code, snapshot.cart.coupon_id).await?;
        let discount = coupon
            .as_ref()
            .map_or(Decimal::ZERO, |c| discounts::discount(subtotal, c));

        let shipping = shipping_method::Entity::find_by_id(shipping_method_id)
            .filter(shipping_method::Column::DeletedAt.is_null())
            .one(&txn)
            .await?
            .ok_or(ServiceError::ShippingMethodNotFound(shipping_method_id))?;

        let total = discounts::order_total(subtotal, discount, shipping.cost);
        let now = Utc::now();

        let order = order::ActiveModel {
            user_id: Set(user_id),
            coupon_id: Set(coupon.as_ref().map(|c| c.id)),
            total_amount: Set(total),
            status: Set(OrderStatus::Pending),
            stock_debits: Set(1),
            confirmed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = order_item::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                price: Set(line.unit_price),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        let shipment = shipment::ActiveModel {
            order_id: Set(order.id),
            shipping_method_id: Set(shipping.id),
            tracking_number: Set(None),
            status: Set(ShipmentStatus::Pending),
            shipped_at: Set(None),
            delivered_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            ServiceError::from_unique_violation(
                e,
                ServiceError::Conflict(format!("order {} already has a shipment", order.id)),
            )
        })?;

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(snapshot.cart.id))
            .exec(&txn)
            .await?;
        cart::Entity::delete_by_id(snapshot.cart.id)
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                user_id,
            })
            .await;
        for line in &lines {
            self.event_sender
                .send_or_log(Event::InventoryDebited {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    remaining: line.remaining_stock,
                })
                .await;
        }

        counter!("fulfillment.checkouts.completed", 1);
        info!(
            order_id = order.id,
            user_id,
            %subtotal,
            %discount,
            %total,
            "Checkout completed"
        );

        Ok(OrderDetail {
            order,
            items,
            shipment: Some(shipment),
            payments: Vec::new(),
        })
    }
}

/// Locks and debits every line in ascending product id order, so two
/// checkouts sharing products always take their locks in the same order.
async fn debit_lines(
    txn: &DatabaseTransaction,
    mut lines: Vec<CartLine>,
) -> Result<Vec<PricedLine>, ServiceError> {
    lines.sort_by_key(|line| (line.item.product_id, line.item.id));

    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let product_id = match (line.item.product_id, &line.product) {
            (Some(id), Some(_)) => id,
            (Some(id), None) => return Err(ServiceError::ProductUnavailable(id.to_string())),
            (None, _) => {
                return Err(ServiceError::ProductUnavailable(format!(
                    "cart item {} has no product",
                    line.item.id
                )))
            }
        };

        let locked = InventoryLedger::lock_product(txn, product_id).await?;
        let locked = InventoryLedger::decrement(txn, locked, line.item.quantity)
            .await
            .map_err(|e| {
                if matches!(e, ServiceError::InsufficientStock { .. }) {
                    counter!("fulfillment.checkouts.insufficient_stock", 1);
                }
                e
            })?;

        priced.push(PricedLine {
            product_id,
            quantity: line.item.quantity,
            unit_price: locked.model().price,
            remaining_stock: locked.stock(),
        });
    }
    Ok(priced)
}

/// An explicit code wins and must be usable. Without one, the coupon applied
/// to the cart is used only while it is still usable; a lapsed one is
/// dropped and the order is placed at full price.
async fn resolve_coupon(
    txn: &DatabaseTransaction,
    code: Option<&str>,
    applied: Option<i32>,
) -> Result<Option<coupon::Model>, ServiceError> {
    let now = Utc::now();

    if let Some(code) = code {
        let coupon = coupons::find_by_code(txn, code)
            .await?
            .ok_or_else(|| ServiceError::CouponNotFound(code.to_string()))?;
        if !discounts::is_usable(&coupon, now) {
            warn!(coupon_id = coupon.id, code = %coupon.code, "coupon rejected at checkout");
            return Err(ServiceError::CouponInvalid(coupon.code));
        }
        return Ok(Some(coupon));
    }

    let Some(coupon_id) = applied else {
        return Ok(None);
    };
    match coupon::Entity::find_by_id(coupon_id).one(txn).await? {
        Some(c) if discounts::is_usable(&c, now) => Ok(Some(c)),
        Some(c) => {
            warn!(coupon_id, code = %c.code, "dropping lapsed cart coupon at checkout");
            Ok(None)
        }
        None => {
            warn!(coupon_id, "cart coupon no longer exists");
            Ok(None)
        }
    }
}
