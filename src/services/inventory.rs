//! Inventory ledger: the only code that writes `products.stock`.
//!
//! Every operation runs inside a caller-owned transaction. Stock can only be
//! changed through a [`LockedProduct`], which is obtained by taking the row
//! lock first, so concurrent writers to the same product serialize at the lock.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect,
    Set, Unchanged,
};
use tracing::{debug, instrument, warn};

use crate::entities::product;
use crate::errors::ServiceError;

/// A product row read under an exclusive row lock held by the current transaction.
#[derive(Debug, Clone)]
pub struct LockedProduct(product::Model);

impl LockedProduct {
    pub fn id(&self) -> i32 {
        self.0.id
    }

    pub fn stock(&self) -> i32 {
        self.0.stock
    }

    pub fn model(&self) -> &product::Model {
        &self.0
    }

    pub fn into_model(self) -> product::Model {
        self.0
    }
}

pub struct InventoryLedger;

impl InventoryLedger {
    /// `SELECT ... FOR UPDATE` on a live product. Soft-deleted and missing
    /// products are reported as unavailable.
    #[instrument(skip(txn))]
    pub async fn lock_product(
        txn: &DatabaseTransaction,
        product_id: i32,
    ) -> Result<LockedProduct, ServiceError> {
        product::Entity::find_by_id(product_id)
            .filter(product::Column::DeletedAt.is_null())
            .lock_exclusive()
            .one(txn)
            .await?
            .map(LockedProduct)
            .ok_or_else(|| ServiceError::ProductUnavailable(product_id.to_string()))
    }

    /// Locks a product for restocking. Soft-deleted rows still get their units back.
    #[instrument(skip(txn))]
    pub async fn lock_for_restock(
        txn: &DatabaseTransaction,
        product_id: i32,
    ) -> Result<LockedProduct, ServiceError> {
        product::Entity::find_by_id(product_id)
            .lock_exclusive()
            .one(txn)
            .await?
            .map(LockedProduct)
            .ok_or_else(|| ServiceError::ProductUnavailable(product_id.to_string()))
    }

    /// Removes `quantity` units. Leaves the row untouched and reports
    /// `InsufficientStock` when fewer units are available.
    #[instrument(skip(txn, product), fields(product_id = product.id(), stock = product.stock()))]
    pub async fn decrement(
        txn: &DatabaseTransaction,
        product: LockedProduct,
        quantity: i32,
    ) -> Result<LockedProduct, ServiceError> {
        ensure_positive(quantity)?;

        let current = product.into_model();
        if current.stock < quantity {
            warn!(
                product_id = current.id,
                available = current.stock,
                requested = quantity,
                "insufficient stock"
            );
            return Err(ServiceError::insufficient_stock(
                current.id,
                current.name,
                current.stock,
                quantity,
            ));
        }

        let updated = write_stock(txn, &current, current.stock - quantity).await?;
        debug!(remaining = updated.stock, "stock decremented");
        Ok(LockedProduct(updated))
    }

    /// Returns `quantity` units to stock (compensation path).
    #[instrument(skip(txn, product), fields(product_id = product.id(), stock = product.stock()))]
    pub async fn increment(
        txn: &DatabaseTransaction,
        product: LockedProduct,
        quantity: i32,
    ) -> Result<LockedProduct, ServiceError> {
        ensure_positive(quantity)?;

        let current = product.into_model();
        let restored = current.stock.checked_add(quantity).ok_or_else(|| {
            ServiceError::InvalidInput(format!("stock overflow for product {}", current.id))
        })?;

        let updated = write_stock(txn, &current, restored).await?;
        debug!(remaining = updated.stock, "stock incremented");
        Ok(LockedProduct(updated))
    }
}

fn ensure_positive(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::InvalidInput(format!(
            "quantity must be at least 1, got {}",
            quantity
        )));
    }
    Ok(())
}

async fn write_stock(
    txn: &DatabaseTransaction,
    current: &product::Model,
    stock: i32,
) -> Result<product::Model, ServiceError> {
    let active = product::ActiveModel {
        id: Unchanged(current.id),
        stock: Set(stock),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    Ok(active.update(txn).await?)
}
