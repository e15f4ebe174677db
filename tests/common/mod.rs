#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use fulfillment_api::{
    auth::{AuthUser, ADMIN_ROLE},
    config::AppConfig,
    db,
    entities::{coupon, order, payment_method, product, shipping_method},
    events::{self, EventSender},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, Unchanged,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration-secret-k3y-for-fulfillment-tests-0123456789";

/// Application state backed by a throwaway SQLite file, or by an external
/// database for the opt-in Postgres runs.
pub struct TestApp {
    pub state: AppState,
    router: Router,
    _dir: Option<TempDir>,
    _event_task: tokio::task::JoinHandle<()>,
}

/// Connection string of a disposable Postgres database. Tests that need real
/// row locks skip themselves when it is unset.
pub const POSTGRES_URL_VAR: &str = "FULFILLMENT_TEST_POSTGRES_URL";

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("fulfillment_test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        // A single connection: SQLite transactions queue behind each other.
        Self::connect(url, 1, Some(dir)).await
    }

    /// Postgres-backed app with a real pool, or `None` when
    /// [`POSTGRES_URL_VAR`] is not set.
    pub async fn postgres(max_connections: u32) -> Option<Self> {
        let url = std::env::var(POSTGRES_URL_VAR).ok()?;
        Some(Self::connect(url, max_connections, None).await)
    }

    async fn connect(url: String, max_connections: u32, dir: Option<TempDir>) -> Self {
        let mut cfg = AppConfig::new(url, TEST_JWT_SECRET.to_string(), "test".to_string());
        cfg.db_max_connections = max_connections;
        cfg.db_min_connections = 1;
        cfg.db_acquire_timeout_secs = 30;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let event_sender = Arc::new(EventSender::new(event_tx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let router = fulfillment_api::build_router(state.clone());

        Self {
            state,
            router,
            _dir: dir,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            name: Set(name.to_string()),
            description: Set(None),
            price: Set(price),
            stock: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed product")
    }

    pub async fn seed_shipping_method(&self, cost: Decimal) -> shipping_method::Model {
        let now = Utc::now();
        shipping_method::ActiveModel {
            name: Set("Ground".to_string()),
            cost: Set(cost),
            estimated_days: Set(3),
            description: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed shipping method")
    }

    pub async fn seed_payment_method(&self) -> payment_method::Model {
        let now = Utc::now();
        payment_method::ActiveModel {
            name: Set("Card".to_string()),
            description: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed payment method")
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        percent: Option<Decimal>,
        max_discount: Option<Decimal>,
        expired_at: Option<DateTime<Utc>>,
    ) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            code: Set(code.to_string()),
            discount_percent: Set(percent),
            max_discount: Set(max_discount),
            expired_at: Set(expired_at),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed coupon")
    }

    pub async fn stock_of(&self, product_id: i32) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(self.db())
            .await
            .expect("query product")
            .expect("product exists")
            .stock
    }

    /// Overwrites stock behind the cart's back, e.g. to simulate a sale elsewhere.
    pub async fn set_stock(&self, product_id: i32, stock: i32) {
        product::ActiveModel {
            id: Unchanged(product_id),
            stock: Set(stock),
            ..Default::default()
        }
        .update(self.db())
        .await
        .expect("update stock");
    }

    pub async fn order_count(&self) -> usize {
        order::Entity::find()
            .all(self.db())
            .await
            .expect("query orders")
            .len()
    }

    pub async fn orders_of(&self, user_ids: &[i32]) -> usize {
        order::Entity::find()
            .filter(order::Column::UserId.is_in(user_ids.iter().copied()))
            .all(self.db())
            .await
            .expect("query orders")
            .len()
    }

    /// Fills `user_id`'s cart with `(product_id, quantity)` lines.
    pub async fn fill_cart(&self, user_id: i32, lines: &[(i32, i32)]) {
        for &(product_id, quantity) in lines {
            self.state
                .services
                .cart
                .add_item(user_id, product_id, quantity)
                .await
                .expect("add cart item");
        }
    }

    pub fn token(&self, user_id: i32, admin: bool) -> String {
        let roles: &[&str] = if admin { &[ADMIN_ROLE] } else { &[] };
        self.state
            .services
            .auth
            .issue_token(user_id, roles)
            .expect("issue token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

pub fn customer(user_id: i32) -> AuthUser {
    AuthUser {
        user_id,
        roles: Vec::new(),
    }
}

pub fn admin() -> AuthUser {
    AuthUser {
        user_id: 1,
        roles: vec![ADMIN_ROLE.to_string()],
    }
}
