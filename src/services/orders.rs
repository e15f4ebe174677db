use crate::{
    auth::AuthUser,
    entities::{order, order_item, payment, shipment},
    errors::ServiceError,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

/// An order together with everything it owns.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    #[schema(inline)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub shipment: Option<shipment::Model>,
    pub payments: Vec<payment::Model>,
}

/// Loads the children of `order` on any connection, including an open transaction.
pub async fn load_detail<C>(conn: &C, order: order::Model) -> Result<OrderDetail, ServiceError>
where
    C: ConnectionTrait,
{
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .order_by_asc(order_item::Column::Id)
        .all(conn)
        .await?;
    let shipment = shipment::Entity::find()
        .filter(shipment::Column::OrderId.eq(order.id))
        .one(conn)
        .await?;
    let payments = payment::Entity::find()
        .filter(payment::Column::OrderId.eq(order.id))
        .order_by_asc(payment::Column::Id)
        .all(conn)
        .await?;

    Ok(OrderDetail {
        order,
        items,
        shipment,
        payments,
    })
}

/// Read side of orders: listing and detail views.
#[derive(Clone)]
pub struct OrderQueryService {
    db: Arc<DatabaseConnection>,
}

impl OrderQueryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Orders placed by `user_id`, newest first, with the total count.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: i32,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, user_id, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(|e| {
                error!(error = %e, user_id, page, "Failed to fetch orders page");
                ServiceError::DatabaseError(e)
            })?;

        Ok((orders, total))
    }

    /// Full order view. Only the owner or an admin may read it.
    #[instrument(skip(self, caller), fields(caller = caller.user_id))]
    pub async fn get_order(
        &self,
        order_id: i32,
        caller: &AuthUser,
    ) -> Result<OrderDetail, ServiceError> {
        let order = self.find_order(order_id).await?;
        ensure_owner_or_admin(&order, caller)?;
        load_detail(&*self.db, order).await
    }

    pub async fn find_order(&self, order_id: i32) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))
    }
}

pub fn ensure_owner_or_admin(order: &order::Model, caller: &AuthUser) -> Result<(), ServiceError> {
    if caller.is_admin() || order.user_id == caller.user_id {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(format!(
            "order {} does not belong to the caller",
            order.id
        )))
    }
}
