use crate::{
    entities::payment_method,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentMethodInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdatePaymentMethodInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// Payment methods a customer can open a payment with.
#[derive(Clone)]
pub struct PaymentMethodService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl PaymentMethodService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn create_payment_method(
        &self,
        input: CreatePaymentMethodInput,
    ) -> Result<payment_method::Model, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let method = payment_method::ActiveModel {
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::PaymentMethodChanged(method.id))
            .await;

        info!(payment_method_id = method.id, name = %method.name, "Created payment method");
        Ok(method)
    }

    #[instrument(skip(self))]
    pub async fn update_payment_method(
        &self,
        id: i32,
        input: UpdatePaymentMethodInput,
    ) -> Result<payment_method::Model, ServiceError> {
        input.validate()?;

        let mut active: payment_method::ActiveModel = self.get_payment_method(id).await?.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        active.updated_at = Set(Utc::now());
        let method = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentMethodChanged(id))
            .await;

        info!(payment_method_id = id, "Updated payment method");
        Ok(method)
    }

    /// Soft-deletes a method. Existing payments keep their reference, new
    /// payments can no longer pick it.
    #[instrument(skip(self))]
    pub async fn delete_payment_method(&self, id: i32) -> Result<(), ServiceError> {
        let mut active: payment_method::ActiveModel = self.get_payment_method(id).await?.into();
        let now = Utc::now();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentMethodChanged(id))
            .await;

        info!(payment_method_id = id, "Deleted payment method");
        Ok(())
    }

    pub async fn get_payment_method(&self, id: i32) -> Result<payment_method::Model, ServiceError> {
        payment_method::Entity::find_by_id(id)
            .filter(payment_method::Column::DeletedAt.is_null())
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::PaymentMethodNotFound(id))
    }

    #[instrument(skip(self))]
    pub async fn list_payment_methods(
        &self,
        name: Option<String>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<payment_method::Model>, u64), ServiceError> {
        let mut query =
            payment_method::Entity::find().filter(payment_method::Column::DeletedAt.is_null());
        if let Some(name) = name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            query = query.filter(payment_method::Column::Name.contains(name));
        }

        let paginator = query
            .order_by_asc(payment_method::Column::Name)
            .order_by_asc(payment_method::Column::Id)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let methods = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((methods, total))
    }
}
