use sea_orm::ConnectionTrait;
use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_cart_tables::Migration),
            Box::new(m20240301_000003_create_order_tables::Migration),
            Box::new(m20240301_000004_create_payment_constraints::Migration),
        ]
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Name,
    Description,
    Price,
    Stock,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Coupons {
    Table,
    Id,
    Code,
    DiscountPercent,
    MaxDiscount,
    ExpiredAt,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

#[derive(DeriveIden)]
enum ShippingMethods {
    Table,
    Id,
    Name,
    Cost,
    EstimatedDays,
    Description,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

#[derive(DeriveIden)]
enum PaymentMethods {
    Table,
    Id,
    Name,
    Description,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Carts {
    Table,
    Id,
    UserId,
    CouponId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CartItems {
    Table,
    Id,
    CartId,
    ProductId,
    Quantity,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    UserId,
    CouponId,
    TotalAmount,
    Status,
    StockDebits,
    ConfirmedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OrderItems {
    Table,
    Id,
    OrderId,
    ProductId,
    Quantity,
    Price,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Shipments {
    Table,
    Id,
    OrderId,
    ShippingMethodId,
    TrackingNumber,
    Status,
    ShippedAt,
    DeliveredAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Payments {
    Table,
    Id,
    OrderId,
    PaymentMethodId,
    Amount,
    Status,
    PaidAt,
    CreatedAt,
    UpdatedAt,
}

fn id_column<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn money_column<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).decimal_len(16, 4).not_null().to_owned()
}

fn timestamp_column<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .to_owned()
}

fn nullable_timestamp_column<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).timestamp_with_time_zone().null().to_owned()
}

mod m20240301_000001_create_catalog_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(id_column(Products::Id))
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(money_column(Products::Price))
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(Products::Stock).gte(0)),
                        )
                        .col(timestamp_column(Products::CreatedAt))
                        .col(timestamp_column(Products::UpdatedAt))
                        .col(nullable_timestamp_column(Products::DeletedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(id_column(Coupons::Id))
                        .col(ColumnDef::new(Coupons::Code).string_len(64).not_null())
                        .col(ColumnDef::new(Coupons::DiscountPercent).decimal_len(5, 2).null())
                        .col(ColumnDef::new(Coupons::MaxDiscount).decimal_len(16, 4).null())
                        .col(nullable_timestamp_column(Coupons::ExpiredAt))
                        .col(timestamp_column(Coupons::CreatedAt))
                        .col(timestamp_column(Coupons::UpdatedAt))
                        .col(nullable_timestamp_column(Coupons::DeletedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_coupons_code")
                        .table(Coupons::Table)
                        .col(Coupons::Code)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ShippingMethods::Table)
                        .if_not_exists()
                        .col(id_column(ShippingMethods::Id))
                        .col(ColumnDef::new(ShippingMethods::Name).string().not_null())
                        .col(money_column(ShippingMethods::Cost))
                        .col(
                            ColumnDef::new(ShippingMethods::EstimatedDays)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ShippingMethods::Description).text().null())
                        .col(timestamp_column(ShippingMethods::CreatedAt))
                        .col(timestamp_column(ShippingMethods::UpdatedAt))
                        .col(nullable_timestamp_column(ShippingMethods::DeletedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PaymentMethods::Table)
                        .if_not_exists()
                        .col(id_column(PaymentMethods::Id))
                        .col(ColumnDef::new(PaymentMethods::Name).string().not_null())
                        .col(ColumnDef::new(PaymentMethods::Description).text().null())
                        .col(timestamp_column(PaymentMethods::CreatedAt))
                        .col(timestamp_column(PaymentMethods::UpdatedAt))
                        .col(nullable_timestamp_column(PaymentMethods::DeletedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentMethods::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ShippingMethods::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }
}

mod m20240301_000002_create_cart_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_cart_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(id_column(Carts::Id))
                        .col(ColumnDef::new(Carts::UserId).integer().not_null())
                        .col(ColumnDef::new(Carts::CouponId).integer().null())
                        .col(timestamp_column(Carts::CreatedAt))
                        .col(timestamp_column(Carts::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_carts_coupon_id")
                                .from(Carts::Table, Carts::CouponId)
                                .to(Coupons::Table, Coupons::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_carts_user_id")
                        .table(Carts::Table)
                        .col(Carts::UserId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(id_column(CartItems::Id))
                        .col(ColumnDef::new(CartItems::CartId).integer().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).integer().null())
                        .col(
                            ColumnDef::new(CartItems::Quantity)
                                .integer()
                                .not_null()
                                .check(Expr::col(CartItems::Quantity).gte(1)),
                        )
                        .col(timestamp_column(CartItems::CreatedAt))
                        .col(timestamp_column(CartItems::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_cart_id")
                                .from(CartItems::Table, CartItems::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_product_id")
                                .from(CartItems::Table, CartItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_cart_id")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }
}

mod m20240301_000003_create_order_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(id_column(Orders::Id))
                        .col(ColumnDef::new(Orders::UserId).integer().not_null())
                        .col(ColumnDef::new(Orders::CouponId).integer().null())
                        .col(money_column(Orders::TotalAmount))
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Orders::StockDebits)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(nullable_timestamp_column(Orders::ConfirmedAt))
                        .col(timestamp_column(Orders::CreatedAt))
                        .col(timestamp_column(Orders::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_coupon_id")
                                .from(Orders::Table, Orders::CouponId)
                                .to(Coupons::Table, Coupons::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(id_column(OrderItems::Id))
                        .col(ColumnDef::new(OrderItems::OrderId).integer().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Quantity)
                                .integer()
                                .not_null()
                                .check(Expr::col(OrderItems::Quantity).gte(1)),
                        )
                        .col(money_column(OrderItems::Price))
                        .col(timestamp_column(OrderItems::CreatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_product_id")
                                .from(OrderItems::Table, OrderItems::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Shipments::Table)
                        .if_not_exists()
                        .col(id_column(Shipments::Id))
                        .col(ColumnDef::new(Shipments::OrderId).integer().not_null())
                        .col(
                            ColumnDef::new(Shipments::ShippingMethodId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Shipments::TrackingNumber).string().null())
                        .col(ColumnDef::new(Shipments::Status).string_len(20).not_null())
                        .col(nullable_timestamp_column(Shipments::ShippedAt))
                        .col(nullable_timestamp_column(Shipments::DeliveredAt))
                        .col(timestamp_column(Shipments::CreatedAt))
                        .col(timestamp_column(Shipments::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shipments_order_id")
                                .from(Shipments::Table, Shipments::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shipments_shipping_method_id")
                                .from(Shipments::Table, Shipments::ShippingMethodId)
                                .to(ShippingMethods::Table, ShippingMethods::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_shipments_order_id")
                        .table(Shipments::Table)
                        .col(Shipments::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(id_column(Payments::Id))
                        .col(ColumnDef::new(Payments::OrderId).integer().not_null())
                        .col(
                            ColumnDef::new(Payments::PaymentMethodId)
                                .integer()
                                .not_null(),
                        )
                        .col(money_column(Payments::Amount))
                        .col(ColumnDef::new(Payments::Status).string_len(20).not_null())
                        .col(nullable_timestamp_column(Payments::PaidAt))
                        .col(timestamp_column(Payments::CreatedAt))
                        .col(timestamp_column(Payments::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payments_order_id")
                                .from(Payments::Table, Payments::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payments_payment_method_id")
                                .from(Payments::Table, Payments::PaymentMethodId)
                                .to(PaymentMethods::Table, PaymentMethods::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_order_id")
                        .table(Payments::Table)
                        .col(Payments::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Shipments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }
}

/// Partial unique indexes: one pending and one paid payment per order.
/// The same statement works on Postgres and SQLite.
mod m20240301_000004_create_payment_constraints {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_payment_constraints"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let db = manager.get_connection();
            db.execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_payments_order_pending \
                 ON payments (order_id) WHERE status = 'pending'",
            )
            .await?;
            db.execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_payments_order_paid \
                 ON payments (order_id) WHERE status = 'paid'",
            )
            .await?;
            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let db = manager.get_connection();
            db.execute_unprepared("DROP INDEX IF EXISTS uq_payments_order_paid")
                .await?;
            db.execute_unprepared("DROP INDEX IF EXISTS uq_payments_order_pending")
                .await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_unique() {
        let names: Vec<String> = Migrator::migrations()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn schema_builds_and_stores_money_on_sqlite() {
        use crate::entities::product;
        use chrono::Utc;
        use rust_decimal_macros::dec;
        use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, Set};

        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();

        Migrator::up(&db, None).await.unwrap();
        assert_eq!(Migrator::get_pending_migrations(&db).await.unwrap().len(), 0);

        let now = Utc::now();
        let lamp = product::ActiveModel {
            name: Set("Lamp".to_string()),
            description: Set(None),
            price: Set(dec!(1249.5)),
            stock: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let stored = product::Entity::find_by_id(lamp.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.price, dec!(1249.5));

        Migrator::down(&db, None).await.unwrap();
    }
}
