use crate::{
    auth::AuthUser,
    entities::{
        order::{self, OrderStatus, OrderTransition},
        payment::{self, PaymentStatus},
        payment_method,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        order_status::{self, StatusChange},
        orders::ensure_owner_or_admin,
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentRequest {
    #[validate(range(min = 1))]
    pub order_id: i32,
    #[validate(range(min = 1))]
    pub payment_method_id: i32,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub order_id: Option<i32>,
    pub payment_method_id: Option<i32>,
}

/// Records payments against orders. No money moves here; a payment row is
/// the local bookkeeping of an attempt and its outcome.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl PaymentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Opens a pending payment for an order owned by `payer_id`.
    ///
    /// Refused when the order already has a paid or a pending payment, and
    /// for cancelled orders. The order row is locked while the existing
    /// payments are inspected, so two concurrent attempts cannot both pass.
    #[instrument(skip(self))]
    pub async fn create_payment(
        &self,
        order_id: i32,
        payment_method_id: i32,
        amount: Decimal,
        payer_id: i32,
    ) -> Result<payment::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "payment amount must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let order = order_status::lock_order(&txn, order_id).await?;
        if order.user_id != payer_id {
            warn!(order_id, payer_id, "payment attempted on foreign order");
            return Err(ServiceError::Unauthorized(format!(
                "order {} does not belong to the payer",
                order_id
            )));
        }

        payment_method::Entity::find_by_id(payment_method_id)
            .filter(payment_method::Column::DeletedAt.is_null())
            .one(&txn)
            .await?
            .ok_or(ServiceError::PaymentMethodNotFound(payment_method_id))?;

        if order.status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidInput(format!(
                "order {} is cancelled",
                order_id
            )));
        }

        let existing = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .filter(payment::Column::Status.is_in([PaymentStatus::Paid, PaymentStatus::Pending]))
            .all(&txn)
            .await?;
        if existing.iter().any(|p| p.status == PaymentStatus::Paid) {
            return Err(ServiceError::AlreadyPaid(order_id));
        }
        if !existing.is_empty() {
            return Err(ServiceError::PendingPaymentExists(order_id));
        }

        let now = Utc::now();
        let payment = payment::ActiveModel {
            order_id: Set(order_id),
            payment_method_id: Set(payment_method_id),
            amount: Set(amount),
            status: Set(PaymentStatus::Pending),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            ServiceError::from_unique_violation(e, ServiceError::PendingPaymentExists(order_id))
        })?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentCreated {
                payment_id: payment.id,
                order_id,
            })
            .await;

        counter!("fulfillment.payments.created", 1);
        info!(payment_id = payment.id, order_id, %amount, "Payment created");
        Ok(payment)
    }

    /// Settles a pending payment as `paid` or `failed`.
    ///
    /// A `paid` outcome moves the order to `paid` in the same transaction; if
    /// the order cannot be marked paid the payment stays pending.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        payment_id: i32,
        status: PaymentStatus,
    ) -> Result<payment::Model, ServiceError> {
        if status == PaymentStatus::Pending {
            return Err(ServiceError::InvalidInput(
                "a payment can only be settled as paid or failed".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let order_id = payment::Entity::find_by_id(payment_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::PaymentNotFound(payment_id))?
            .order_id;

        // Order before payment, the same order create_payment takes its locks in.
        let order = order_status::lock_order(&txn, order_id).await?;
        let current = payment::Entity::find_by_id(payment_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(ServiceError::PaymentNotFound(payment_id))?;
        if current.status != PaymentStatus::Pending {
            return Err(ServiceError::PaymentNotPending {
                payment_id,
                status: current.status,
            });
        }

        let now = Utc::now();
        let mut active: payment::ActiveModel = current.into();
        active.status = Set(status);
        active.updated_at = Set(now);
        if status == PaymentStatus::Paid {
            active.paid_at = Set(Some(now));
        }
        let payment = active.update(&txn).await.map_err(|e| {
            ServiceError::from_unique_violation(e, ServiceError::AlreadyPaid(order_id))
        })?;

        let change: Option<StatusChange> = if status == PaymentStatus::Paid {
            Some(order_status::apply_locked(&txn, order, OrderTransition::MarkPaid).await?)
        } else {
            None
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentStatusChanged {
                payment_id,
                order_id,
                new_status: status,
            })
            .await;
        if let Some(change) = change {
            self.event_sender.send_or_log(change.event()).await;
        }

        counter!("fulfillment.payments.settled", 1, "status" => status.to_string());
        info!(payment_id, order_id, status = %status, "Payment settled");
        Ok(payment)
    }

    #[instrument(skip(self, caller), fields(caller = caller.user_id))]
    pub async fn get_payment(
        &self,
        payment_id: i32,
        caller: &AuthUser,
    ) -> Result<payment::Model, ServiceError> {
        let payment = payment::Entity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::PaymentNotFound(payment_id))?;

        let order = order::Entity::find_by_id(payment.order_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::OrderNotFound(payment.order_id))?;
        ensure_owner_or_admin(&order, caller)?;

        Ok(payment)
    }

    /// Every payment, newest first. Returns the page and the total count.
    #[instrument(skip(self))]
    pub async fn list_payments(
        &self,
        filter: PaymentFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<payment::Model>, u64), ServiceError> {
        let mut query = payment::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(payment::Column::Status.eq(status));
        }
        if let Some(order_id) = filter.order_id {
            query = query.filter(payment::Column::OrderId.eq(order_id));
        }
        if let Some(method_id) = filter.payment_method_id {
            query = query.filter(payment::Column::PaymentMethodId.eq(method_id));
        }

        let paginator = query
            .order_by_desc(payment::Column::CreatedAt)
            .order_by_desc(payment::Column::Id)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let payments = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((payments, total))
    }

    /// Payments of one order, oldest first.
    #[instrument(skip(self, caller), fields(caller = caller.user_id))]
    pub async fn list_order_payments(
        &self,
        order_id: i32,
        caller: &AuthUser,
    ) -> Result<Vec<payment::Model>, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;
        ensure_owner_or_admin(&order, caller)?;

        Ok(payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_asc(payment::Column::Id)
            .all(&*self.db)
            .await?)
    }
}
