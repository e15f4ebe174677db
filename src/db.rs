use crate::config::AppConfig;
use crate::migrator::Migrator;
use metrics::gauge;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
    /// Statement timeout; bounds how long a transaction can sit on a row lock
    pub statement_timeout: Option<Duration>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
            statement_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
            statement_timeout: cfg.db_statement_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Appends a per-connection `statement_timeout` to Postgres URLs so that every
/// pooled connection carries it. Other backends are returned unchanged.
pub fn with_statement_timeout(url: &str, timeout: Option<Duration>) -> String {
    let Some(timeout) = timeout else {
        return url.to_string();
    };
    let is_postgres = url.starts_with("postgres://") || url.starts_with("postgresql://");
    if !is_postgres || url.contains("options=") {
        return url.to_string();
    }

    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}",
        url,
        separator,
        timeout.as_millis()
    )
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Configuring database connection"
    );

    let mut opt = ConnectOptions::new(with_statement_timeout(
        &config.url,
        config.statement_timeout,
    ));
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("fulfillment_db.max_connections", config.max_connections as f64);

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Database connection establishment failed");
        e
    })?;

    info!(
        max_connections = config.max_connections,
        "Database connection pool established"
    );
    Ok(db_pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Applies all pending migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbErr> {
    info!("Running database migrations");
    let started = Instant::now();

    Migrator::up(pool, None).await.map_err(|e| {
        error!(error = %e, "Database migrations failed");
        e
    })?;

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Database migrations completed"
    );
    Ok(())
}

/// Liveness check used by the health endpoint
pub async fn check_connection(pool: &DbPool) -> Result<(), DbErr> {
    pool.execute_unprepared("SELECT 1").await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_timeout_is_added_to_postgres_urls() {
        let url = with_statement_timeout(
            "postgres://app:secret@db/shop",
            Some(Duration::from_secs(5)),
        );
        assert_eq!(
            url,
            "postgres://app:secret@db/shop?options=-c%20statement_timeout%3D5000"
        );

        let url = with_statement_timeout(
            "postgres://db/shop?sslmode=require",
            Some(Duration::from_secs(1)),
        );
        assert!(url.ends_with("&options=-c%20statement_timeout%3D1000"));
    }

    #[test]
    fn other_urls_are_left_alone() {
        let sqlite = "sqlite://shop.db?mode=rwc";
        assert_eq!(
            with_statement_timeout(sqlite, Some(Duration::from_secs(5))),
            sqlite
        );

        let explicit = "postgres://db/shop?options=-c%20search_path%3Dshop";
        assert_eq!(
            with_statement_timeout(explicit, Some(Duration::from_secs(5))),
            explicit
        );

        assert_eq!(
            with_statement_timeout("postgres://db/shop", None),
            "postgres://db/shop"
        );
    }

    #[tokio::test]
    async fn migrations_apply_to_a_fresh_database() {
        let pool = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();

        run_migrations(&pool).await.unwrap();
        check_connection(&pool).await.unwrap();
        // Idempotent on a migrated database.
        run_migrations(&pool).await.unwrap();
    }
}
