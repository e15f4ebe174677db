//! Applies (or rolls back) the schema migrations against `APP__DATABASE_URL`
//! or `DATABASE_URL`.
//!
//! Usage: `migration [up|down|status]` (default `up`).

use fulfillment_api::{
    config::init_tracing,
    db::{establish_connection_with_config, DbConfig},
    migrator::Migrator,
};
use sea_orm::DbErr;
use sea_orm_migration::MigratorTrait;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), DbErr> {
    init_tracing("info", false);

    let database_url = std::env::var("APP__DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .unwrap_or_else(|_| "sqlite://fulfillment.db?mode=rwc".to_string());
    let command = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());

    info!(command = %command, "Starting database migration");

    let db = establish_connection_with_config(&DbConfig {
        url: database_url,
        max_connections: 1,
        ..Default::default()
    })
    .await?;

    match command.as_str() {
        "up" => Migrator::up(&db, None).await?,
        "down" => Migrator::down(&db, Some(1)).await?,
        "status" => Migrator::status(&db).await?,
        other => {
            return Err(DbErr::Custom(format!(
                "unknown command '{}', expected up, down or status",
                other
            )))
        }
    }

    info!(command = %command, "Migration completed successfully");
    Ok(())
}
