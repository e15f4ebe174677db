use crate::{
    auth::AuthUser,
    entities::{
        order::{self, OrderStatus, OrderTransition},
        shipment::{self, ShipmentStatus},
        shipping_method,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{order_status, orders::ensure_owner_or_admin},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateShipmentRequest {
    #[validate(length(min = 1, max = 128))]
    pub tracking_number: Option<String>,
    pub status: Option<ShipmentStatus>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateShipmentRequest {
    #[validate(range(min = 1))]
    pub order_id: i32,
    #[validate(range(min = 1))]
    pub shipping_method_id: i32,
    #[validate(length(min = 1, max = 128))]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ShipmentFilter {
    pub status: Option<ShipmentStatus>,
    pub order_id: Option<i32>,
    pub shipping_method_id: Option<i32>,
    /// Substring match on the tracking number
    pub tracking_number: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub created_before: Option<DateTime<Utc>>,
}

/// Order transition driven by a shipment reaching `status`, if any.
fn order_transition_for(status: ShipmentStatus) -> Option<OrderTransition> {
    match status {
        ShipmentStatus::Shipped => Some(OrderTransition::Ship),
        ShipmentStatus::Delivered => Some(OrderTransition::Deliver),
        _ => None,
    }
}

#[derive(Clone)]
pub struct ShipmentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ShipmentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, caller), fields(caller = caller.user_id))]
    pub async fn get_shipment(
        &self,
        shipment_id: i32,
        caller: &AuthUser,
    ) -> Result<shipment::Model, ServiceError> {
        let shipment = shipment::Entity::find_by_id(shipment_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::ShipmentNotFound(shipment_id))?;
        let order = order::Entity::find_by_id(shipment.order_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::OrderNotFound(shipment.order_id))?;
        ensure_owner_or_admin(&order, caller)?;
        Ok(shipment)
    }

    /// Opens a shipment for an order that has none, e.g. one whose shipment
    /// row was removed by hand. The order must be `paid` or `processing`;
    /// checkout already creates a shipment, so most orders get `Conflict`.
    #[instrument(skip(self, request))]
    pub async fn create_shipment(
        &self,
        request: CreateShipmentRequest,
    ) -> Result<shipment::Model, ServiceError> {
        request.validate()?;
        let order_id = request.order_id;

        let txn = self.db.begin().await?;

        let order = order_status::lock_order(&txn, order_id).await?;
        if !matches!(order.status, OrderStatus::Paid | OrderStatus::Processing) {
            warn!(order_id, status = %order.status, "shipment refused for order");
            return Err(ServiceError::InvalidTransition {
                order_id,
                from: order.status,
                action: OrderTransition::Ship,
            });
        }

        let existing = shipment::Entity::find()
            .filter(shipment::Column::OrderId.eq(order_id))
            .one(&txn)
            .await?;
        if let Some(existing) = existing {
            return Err(ServiceError::Conflict(format!(
                "order {} already has shipment {}",
                order_id, existing.id
            )));
        }

        shipping_method::Entity::find_by_id(request.shipping_method_id)
            .filter(shipping_method::Column::DeletedAt.is_null())
            .one(&txn)
            .await?
            .ok_or(ServiceError::ShippingMethodNotFound(request.shipping_method_id))?;

        let now = Utc::now();
        let shipment = shipment::ActiveModel {
            order_id: Set(order_id),
            shipping_method_id: Set(request.shipping_method_id),
            tracking_number: Set(request.tracking_number.map(|t| t.trim().to_string())),
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
                ServiceError::Conflict(format!("order {} already has a shipment", order_id)),
            )
        })?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ShipmentCreated {
                shipment_id: shipment.id,
                order_id,
            })
            .await;

        info!(shipment_id = shipment.id, order_id, "Shipment created");
        Ok(shipment)
    }

    /// Shipments across all orders, newest first. Returns the page and the total count.
    #[instrument(skip(self))]
    pub async fn list_shipments(
        &self,
        filter: ShipmentFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<shipment::Model>, u64), ServiceError> {
        let mut query = shipment::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(shipment::Column::Status.eq(status));
        }
        if let Some(order_id) = filter.order_id {
            query = query.filter(shipment::Column::OrderId.eq(order_id));
        }
        if let Some(method_id) = filter.shipping_method_id {
            query = query.filter(shipment::Column::ShippingMethodId.eq(method_id));
        }
        if let Some(tracking) = filter
            .tracking_number
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            query = query.filter(shipment::Column::TrackingNumber.contains(tracking));
        }
        if let Some(from) = filter.created_from {
            query = query.filter(shipment::Column::CreatedAt.gte(from));
        }
        if let Some(before) = filter.created_before {
            query = query.filter(shipment::Column::CreatedAt.lt(before));
        }

        let paginator = query
            .order_by_desc(shipment::Column::CreatedAt)
            .order_by_desc(shipment::Column::Id)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count shipments");
            ServiceError::DatabaseError(e)
        })?;
        let shipments = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((shipments, total))
    }

    /// Sets the tracking number and/or advances the shipment.
    ///
    /// Reaching `shipped` or `delivered` moves the order along in the same
    /// transaction, so an unpaid or cancelled order cannot be shipped.
    #[instrument(skip(self, request))]
    pub async fn update_shipment(
        &self,
        shipment_id: i32,
        request: UpdateShipmentRequest,
    ) -> Result<shipment::Model, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;

        let order_id = shipment::Entity::find_by_id(shipment_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::ShipmentNotFound(shipment_id))?
            .order_id;
        let order = order_status::lock_order(&txn, order_id).await?;
        let current = shipment::Entity::find_by_id(shipment_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(ServiceError::ShipmentNotFound(shipment_id))?;

        if order.status == OrderStatus::Cancelled || current.status == ShipmentStatus::Cancelled {
            let action = request
                .status
                .and_then(order_transition_for)
                .unwrap_or(OrderTransition::Ship);
            return Err(ServiceError::InvalidTransition {
                order_id,
                from: order.status,
                action,
            });
        }

        let target = request.status.filter(|s| *s != current.status);
        if let Some(next) = target {
            if !current.status.can_advance_to(next) {
                return Err(ServiceError::InvalidInput(format!(
                    "shipment {} cannot move from {} to {}",
                    shipment_id, current.status, next
                )));
            }
        }

        let now = Utc::now();
        let mut active: shipment::ActiveModel = current.into();
        if let Some(tracking) = request.tracking_number {
            active.tracking_number = Set(Some(tracking.trim().to_string()));
        }
        if let Some(next) = target {
            active.status = Set(next);
            match next {
                ShipmentStatus::Shipped => active.shipped_at = Set(Some(now)),
                ShipmentStatus::Delivered => active.delivered_at = Set(Some(now)),
                _ => {}
            }
        }
        active.updated_at = Set(now);
        let shipment = active.update(&txn).await?;

        let change = match target.and_then(order_transition_for) {
            Some(transition) => Some(order_status::apply_locked(&txn, order, transition).await?),
            None => None,
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ShipmentUpdated {
                shipment_id,
                order_id,
                status: shipment.status,
            })
            .await;
        if let Some(change) = change {
            self.event_sender.send_or_log(change.event()).await;
        }

        info!(shipment_id, order_id, status = %shipment.status, "Shipment updated");
        Ok(shipment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_shipping_and_delivery_touch_the_order() {
        assert_eq!(
            order_transition_for(ShipmentStatus::Shipped),
            Some(OrderTransition::Ship)
        );
        assert_eq!(
            order_transition_for(ShipmentStatus::Delivered),
            Some(OrderTransition::Deliver)
        );
        assert_eq!(order_transition_for(ShipmentStatus::Processing), None);
    }
}
