use crate::{
    entities::coupon,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use validator::Validate;

/// Looks a coupon up by code, soft-deleted ones included, so callers can tell
/// "unknown code" apart from "no longer valid".
pub async fn find_by_code<C>(conn: &C, code: &str) -> Result<Option<coupon::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(coupon::Entity::find()
        .filter(coupon::Column::Code.eq(code.trim()))
        .one(conn)
        .await?)
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCouponInput {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    /// Percentage between 0 and 100
    pub discount_percent: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub expired_at: Option<DateTime<Utc>>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCouponInput {
    #[validate(length(min = 1, max = 64))]
    pub code: Option<String>,
    pub discount_percent: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub expired_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct CouponFilter {
    /// Substring match on the code
    pub code: Option<String>,
    /// Only coupons that are usable right now
    pub active_only: bool,
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn create_coupon(
        &self,
        input: CreateCouponInput,
    ) -> Result<coupon::Model, ServiceError> {
        input.validate()?;
        validate_amounts(input.discount_percent, input.max_discount)?;

        let code = input.code.trim().to_string();
        self.ensure_code_free(&code, None).await?;

        let now = Utc::now();
        let coupon = coupon::ActiveModel {
            code: Set(code.clone()),
            discount_percent: Set(input.discount_percent),
            max_discount: Set(input.max_discount),
            expired_at: Set(input.expired_at),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_unique_violation(e, code_taken(&code)))?;

        self.event_sender
            .send_or_log(Event::CouponCreated(coupon.id))
            .await;

        info!(coupon_id = coupon.id, code = %coupon.code, "Created coupon");
        Ok(coupon)
    }

    /// Updates a live coupon. Orders already placed keep their own snapshot.
    #[instrument(skip(self))]
    pub async fn update_coupon(
        &self,
        id: i32,
        input: UpdateCouponInput,
    ) -> Result<coupon::Model, ServiceError> {
        input.validate()?;

        let existing = self.get_coupon(id).await?;
        validate_amounts(
            input.discount_percent.or(existing.discount_percent),
            input.max_discount.or(existing.max_discount),
        )?;

        let mut active: coupon::ActiveModel = existing.into();
        if let Some(code) = input.code {
            let code = code.trim().to_string();
            self.ensure_code_free(&code, Some(id)).await?;
            active.code = Set(code);
        }
        if let Some(percent) = input.discount_percent {
            active.discount_percent = Set(Some(percent));
        }
        if let Some(max) = input.max_discount {
            active.max_discount = Set(Some(max));
        }
        if let Some(expiry) = input.expired_at {
            active.expired_at = Set(Some(expiry));
        }
        active.updated_at = Set(Utc::now());

        let coupon = active.update(&*self.db).await.map_err(|e| {
            ServiceError::from_unique_violation(
                e,
                ServiceError::Conflict("coupon code already exists".into()),
            )
        })?;

        self.event_sender
            .send_or_log(Event::CouponUpdated(coupon.id))
            .await;

        info!(coupon_id = coupon.id, "Updated coupon");
        Ok(coupon)
    }

    /// Soft-deletes a coupon; it stays referenced by existing orders.
    #[instrument(skip(self))]
    pub async fn delete_coupon(&self, id: i32) -> Result<(), ServiceError> {
        let existing = self.get_coupon(id).await?;

        let mut active: coupon::ActiveModel = existing.into();
        let now = Utc::now();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&*self.db).await?;

        self.event_sender.send_or_log(Event::CouponDeleted(id)).await;

        info!(coupon_id = id, "Deleted coupon");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_coupon(&self, id: i32) -> Result<coupon::Model, ServiceError> {
        coupon::Entity::find_by_id(id)
            .filter(coupon::Column::DeletedAt.is_null())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))
    }

    /// Lists live coupons, newest first. Returns the page and the total count.
    #[instrument(skip(self))]
    pub async fn list_coupons(
        &self,
        filter: CouponFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<coupon::Model>, u64), ServiceError> {
        let mut query = coupon::Entity::find().filter(coupon::Column::DeletedAt.is_null());

        if let Some(code) = filter.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            query = query.filter(coupon::Column::Code.contains(code));
        }
        if filter.active_only {
            query = query.filter(
                Condition::any()
                    .add(coupon::Column::ExpiredAt.is_null())
                    .add(coupon::Column::ExpiredAt.gt(Utc::now())),
            );
        }

        let paginator = query
            .order_by_desc(coupon::Column::CreatedAt)
            .order_by_desc(coupon::Column::Id)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count coupons");
            ServiceError::DatabaseError(e)
        })?;
        let coupons = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(|e| {
                error!(error = %e, page, "Failed to fetch coupons page");
                ServiceError::DatabaseError(e)
            })?;

        Ok((coupons, total))
    }

    async fn ensure_code_free(&self, code: &str, except: Option<i32>) -> Result<(), ServiceError> {
        match find_by_code(&*self.db, code).await? {
            Some(other) if Some(other.id) != except => Err(code_taken(code)),
            _ => Ok(()),
        }
    }
}

fn code_taken(code: &str) -> ServiceError {
    ServiceError::Conflict(format!("coupon code '{}' already exists", code))
}

fn validate_amounts(
    percent: Option<Decimal>,
    max_discount: Option<Decimal>,
) -> Result<(), ServiceError> {
    if let Some(percent) = percent {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(ServiceError::InvalidInput(
                "discount_percent must be between 0 and 100".to_string(),
            ));
        }
    }
    if let Some(max) = max_discount {
        if max < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "max_discount cannot be negative".to_string(),
            ));
        }
    }
    Ok(())
}
