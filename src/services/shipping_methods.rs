use crate::{
    entities::shipping_method,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateShippingMethodInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub cost: Decimal,
    #[validate(range(min = 0))]
    pub estimated_days: i32,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateShippingMethodInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub cost: Option<Decimal>,
    #[validate(range(min = 0))]
    pub estimated_days: Option<i32>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// Shipping methods offered at checkout. Deleting one only hides it from
/// new checkouts; shipments that reference it keep working.
#[derive(Clone)]
pub struct ShippingMethodService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ShippingMethodService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn create_shipping_method(
        &self,
        input: CreateShippingMethodInput,
    ) -> Result<shipping_method::Model, ServiceError> {
        input.validate()?;
        validate_cost(input.cost)?;

        let now = Utc::now();
        let method = shipping_method::ActiveModel {
            name: Set(input.name.trim().to_string()),
            cost: Set(input.cost),
            estimated_days: Set(input.estimated_days),
            description: Set(input.description),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::ShippingMethodChanged(method.id))
            .await;

        info!(shipping_method_id = method.id, name = %method.name, "Created shipping method");
        Ok(method)
    }

    #[instrument(skip(self))]
    pub async fn update_shipping_method(
        &self,
        id: i32,
        input: UpdateShippingMethodInput,
    ) -> Result<shipping_method::Model, ServiceError> {
        input.validate()?;
        if let Some(cost) = input.cost {
            validate_cost(cost)?;
        }

        let mut active: shipping_method::ActiveModel = self.get_shipping_method(id).await?.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(cost) = input.cost {
            active.cost = Set(cost);
        }
        if let Some(days) = input.estimated_days {
            active.estimated_days = Set(days);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        active.updated_at = Set(Utc::now());
        let method = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ShippingMethodChanged(id))
            .await;

        info!(shipping_method_id = id, "Updated shipping method");
        Ok(method)
    }

    #[instrument(skip(self))]
    pub async fn delete_shipping_method(&self, id: i32) -> Result<(), ServiceError> {
        let mut active: shipping_method::ActiveModel = self.get_shipping_method(id).await?.into();
        let now = Utc::now();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ShippingMethodChanged(id))
            .await;

        info!(shipping_method_id = id, "Deleted shipping method");
        Ok(())
    }

    pub async fn get_shipping_method(
        &self,
        id: i32,
    ) -> Result<shipping_method::Model, ServiceError> {
        shipping_method::Entity::find_by_id(id)
            .filter(shipping_method::Column::DeletedAt.is_null())
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::ShippingMethodNotFound(id))
    }

    /// Live methods, cheapest first. Returns the page and the total count.
    #[instrument(skip(self))]
    pub async fn list_shipping_methods(
        &self,
        name: Option<String>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<shipping_method::Model>, u64), ServiceError> {
        let mut query = shipping_method::Entity::find()
            .filter(shipping_method::Column::DeletedAt.is_null());
        if let Some(name) = name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            query = query.filter(shipping_method::Column::Name.contains(name));
        }

        let paginator = query
            .order_by_asc(shipping_method::Column::Cost)
            .order_by_asc(shipping_method::Column::Id)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count shipping methods");
            ServiceError::DatabaseError(e)
        })?;
        let methods = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((methods, total))
    }
}

fn validate_cost(cost: Decimal) -> Result<(), ServiceError> {
    if cost < Decimal::ZERO {
        return Err(ServiceError::InvalidInput(
            "shipping cost cannot be negative".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn free_shipping_is_allowed_but_negative_cost_is_not() {
        assert!(validate_cost(dec!(0)).is_ok());
        assert!(validate_cost(dec!(12.50)).is_ok());
        assert_matches!(validate_cost(dec!(-0.01)), Err(ServiceError::InvalidInput(_)));
    }
}
