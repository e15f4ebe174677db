//! Order status state machine.
//!
//! Every transition locks the order row first, so transitions on one order
//! are serialized no matter which service drives them. The allowed moves
//! live in [`OrderStatus::apply`]; this module adds the side effects
//! (stock debits on confirm, restocking on cancel).

use crate::{
    entities::{
        order::{self, OrderStatus, OrderTransition},
        order_item, shipment,
        shipment::ShipmentStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::InventoryLedger,
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of a committed-or-pending transition.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub order: order::Model,
}

impl StatusChange {
    pub fn event(&self) -> Event {
        Event::OrderStatusChanged {
            order_id: self.order.id,
            old_status: self.from,
            new_status: self.order.status,
        }
    }
}

/// `SELECT ... FOR UPDATE` on the order row.
pub(crate) async fn lock_order(
    txn: &DatabaseTransaction,
    order_id: i32,
) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or(ServiceError::OrderNotFound(order_id))
}

/// Target status of `transition`, or the error explaining why it is refused.
pub(crate) fn next_status(
    order: &order::Model,
    transition: OrderTransition,
) -> Result<OrderStatus, ServiceError> {
    if order.status == OrderStatus::Cancelled && transition == OrderTransition::Cancel {
        return Err(ServiceError::AlreadyCancelled(order.id));
    }
    let refused = ServiceError::InvalidTransition {
        order_id: order.id,
        from: order.status,
        action: transition,
    };
    // Stock is debited by the first confirm only, whatever path the order took since.
    if transition == OrderTransition::Confirm && order.confirmed_at.is_some() {
        return Err(refused);
    }
    order.status.apply(transition).ok_or(refused)
}

/// Applies a transition without inventory effects (mark paid, ship,
/// deliver) inside the caller's transaction. The caller publishes
/// [`StatusChange::event`] after committing.
pub(crate) async fn transition_in(
    txn: &DatabaseTransaction,
    order_id: i32,
    transition: OrderTransition,
) -> Result<StatusChange, ServiceError> {
    let current = lock_order(txn, order_id).await?;
    apply_locked(txn, current, transition).await
}

/// Same as [`transition_in`] for an order the caller has already locked.
pub(crate) async fn apply_locked(
    txn: &DatabaseTransaction,
    current: order::Model,
    transition: OrderTransition,
) -> Result<StatusChange, ServiceError> {
    let to = next_status(&current, transition)?;

    let from = current.status;
    let mut active: order::ActiveModel = current.into();
    active.status = Set(to);
    active.updated_at = Set(Utc::now());
    let order = active.update(txn).await?;

    Ok(StatusChange { from, order })
}

/// Units per product, ascending by product id.
async fn quantities_by_product(
    txn: &DatabaseTransaction,
    order_id: i32,
) -> Result<BTreeMap<i32, i32>, ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(txn)
        .await?;

    let mut quantities = BTreeMap::new();
    for item in items {
        let entry = quantities.entry(item.product_id).or_insert(0i32);
        *entry = entry.checked_add(item.quantity).ok_or_else(|| {
            ServiceError::InternalError(format!("quantity overflow on order {}", order_id))
        })?;
    }
    Ok(quantities)
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Moves an order to `processing`, debiting stock for every item.
    ///
    /// Allowed from `pending`, `paid` and `processing`, once per order: an
    /// order that carries `confirmed_at` is refused even after it moved
    /// processing -> paid. Any shortfall rolls the whole confirm back and names
    /// the first product (by id) that could not be covered.
    #[instrument(skip(self))]
    pub async fn confirm_checkout(&self, order_id: i32) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let current = lock_order(&txn, order_id).await?;
        let to = next_status(&current, OrderTransition::Confirm)?;

        let quantities = quantities_by_product(&txn, order_id).await?;
        let mut debited = Vec::with_capacity(quantities.len());
        for (&product_id, &quantity) in &quantities {
            let locked = InventoryLedger::lock_product(&txn, product_id).await?;
            let locked = InventoryLedger::decrement(&txn, locked, quantity).await?;
            debited.push((product_id, quantity, locked.stock()));
        }

        let from = current.status;
        let stock_debits = current.stock_debits.saturating_add(1);
        let now = Utc::now();
        let mut active: order::ActiveModel = current.into();
        active.status = Set(to);
        active.stock_debits = Set(stock_debits);
        active.confirmed_at = Set(Some(now));
        active.updated_at = Set(now);
        let order = active.update(&txn).await?;

        txn.commit().await?;

        let change = StatusChange { from, order };
        self.event_sender.send_or_log(change.event()).await;
        for (product_id, quantity, remaining) in debited {
            self.event_sender
                .send_or_log(Event::InventoryDebited {
                    product_id,
                    quantity,
                    remaining,
                })
                .await;
        }

        counter!("fulfillment.orders.confirmed", 1);
        info!(order_id, from = %from, "Order confirmed");
        Ok(change.order)
    }

    /// Cancels an order and returns every debited unit to stock.
    ///
    /// Allowed from `pending`, `paid` and `processing`. Cancelling twice
    /// reports `AlreadyCancelled` and restores nothing.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: i32) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let current = lock_order(&txn, order_id).await?;
        let to = next_status(&current, OrderTransition::Cancel).map_err(|e| {
            warn!(order_id, status = %current.status, "cancellation refused");
            e
        })?;

        let mut restored = Vec::new();
        let mut restocked_units: i64 = 0;
        if current.stock_debits > 0 {
            let quantities = quantities_by_product(&txn, order_id).await?;
            for (&product_id, &quantity) in &quantities {
                let units = quantity.checked_mul(current.stock_debits).ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "restock overflow on order {} product {}",
                        order_id, product_id
                    ))
                })?;
                let locked = InventoryLedger::lock_for_restock(&txn, product_id).await?;
                let locked = InventoryLedger::increment(&txn, locked, units).await?;
                restocked_units += i64::from(units);
                restored.push((product_id, units, locked.stock()));
            }
        }

        let open_shipment = shipment::Entity::find()
            .filter(shipment::Column::OrderId.eq(order_id))
            .one(&txn)
            .await?
            .filter(|s| {
                !matches!(
                    s.status,
                    ShipmentStatus::Shipped | ShipmentStatus::Delivered | ShipmentStatus::Cancelled
                )
            });
        if let Some(open) = open_shipment {
            let mut active: shipment::ActiveModel = open.into();
            active.status = Set(ShipmentStatus::Cancelled);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }

        let from = current.status;
        let mut active: order::ActiveModel = current.into();
        active.status = Set(to);
        active.stock_debits = Set(0);
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;

        txn.commit().await?;

        let change = StatusChange { from, order };
        self.event_sender.send_or_log(change.event()).await;
        self.event_sender
            .send_or_log(Event::OrderCancelled {
                order_id,
                restocked_units,
            })
            .await;
        for (product_id, quantity, remaining) in restored {
            self.event_sender
                .send_or_log(Event::InventoryRestored {
                    product_id,
                    quantity,
                    remaining,
                })
                .await;
        }

        counter!("fulfillment.orders.cancelled", 1);
        info!(order_id, from = %from, restocked_units, "Order cancelled");
        Ok(change.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn order_in(status: OrderStatus) -> order::Model {
        let now = Utc::now();
        order::Model {
            id: 7,
            user_id: 1,
            coupon_id: None,
            total_amount: dec!(10),
            status,
            stock_debits: 1,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn second_cancel_is_reported_as_already_cancelled() {
        assert_matches!(
            next_status(&order_in(OrderStatus::Cancelled), OrderTransition::Cancel),
            Err(ServiceError::AlreadyCancelled(7))
        );
    }

    #[test]
    fn refused_transitions_name_state_and_action() {
        assert_matches!(
            next_status(&order_in(OrderStatus::Delivered), OrderTransition::Cancel),
            Err(ServiceError::InvalidTransition {
                order_id: 7,
                from: OrderStatus::Delivered,
                action: OrderTransition::Cancel,
            })
        );
    }

    #[test]
    fn confirm_is_refused_once_the_order_was_confirmed() {
        let mut confirmed = order_in(OrderStatus::Processing);
        confirmed.stock_debits = 2;
        confirmed.confirmed_at = Some(Utc::now());
        assert_matches!(
            next_status(&confirmed, OrderTransition::Confirm),
            Err(ServiceError::InvalidTransition {
                from: OrderStatus::Processing,
                action: OrderTransition::Confirm,
                ..
            })
        );

        // processing -> paid keeps the stamp, so the paid order cannot be confirmed again
        confirmed.status = OrderStatus::Paid;
        assert_matches!(
            next_status(&confirmed, OrderTransition::Confirm),
            Err(ServiceError::InvalidTransition { from: OrderStatus::Paid, .. })
        );

        assert!(next_status(&order_in(OrderStatus::Paid), OrderTransition::Confirm).is_ok());
    }

    #[test]
    fn allowed_transitions_return_the_target() {
        assert_eq!(
            next_status(&order_in(OrderStatus::Pending), OrderTransition::Confirm).unwrap(),
            OrderStatus::Processing
        );
        assert_eq!(
            next_status(&order_in(OrderStatus::Paid), OrderTransition::Ship).unwrap(),
            OrderStatus::Shipped
        );
    }
}
