//! Fulfillment API Library
//!
//! Checkout and order lifecycle engine: carts, checkout with pessimistic
//! stock locking, the order status state machine, payment bookkeeping,
//! shipments and coupons, served over an axum HTTP API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    http::HeaderValue,
    middleware,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires every service onto one pool and event channel.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
    ) -> Self {
        let auth_service = Arc::new(auth::AuthService::new(auth::AuthConfig::from(&config)));
        let services = handlers::AppServices::new(db.clone(), event_sender.clone(), auth_service);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes under `/api/v1`. Everything but `/health` sits behind the JWT middleware.
pub fn api_v1_routes(auth_service: Arc<auth::AuthService>) -> Router<AppState> {
    let cart = Router::new()
        .route("/cart", get(handlers::carts::get_cart))
        .route("/cart/items", post(handlers::carts::add_item))
        .route(
            "/cart/items/:product_id",
            put(handlers::carts::update_item).delete(handlers::carts::remove_item),
        )
        .route(
            "/cart/coupon",
            post(handlers::carts::apply_coupon).delete(handlers::carts::remove_coupon),
        );

    let orders = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/checkout", post(handlers::orders::checkout))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .route("/orders/:id/confirm", post(handlers::orders::confirm_order))
        .route(
            "/orders/:id/payments",
            get(handlers::payments::list_order_payments),
        );

    let payments = Router::new()
        .route(
            "/payments",
            get(handlers::payments::list_payments).post(handlers::payments::create_payment),
        )
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route(
            "/payments/:id/status",
            put(handlers::payments::update_payment_status),
        );

    let shipments = Router::new()
        .route(
            "/shipments",
            get(handlers::shipments::list_shipments).post(handlers::shipments::create_shipment),
        )
        .route(
            "/shipments/:id",
            get(handlers::shipments::get_shipment).put(handlers::shipments::update_shipment),
        );

    let methods = Router::new()
        .route(
            "/shipping-methods",
            get(handlers::shipping_methods::list_shipping_methods)
                .post(handlers::shipping_methods::create_shipping_method),
        )
        .route(
            "/shipping-methods/:id",
            get(handlers::shipping_methods::get_shipping_method)
                .put(handlers::shipping_methods::update_shipping_method)
                .delete(handlers::shipping_methods::delete_shipping_method),
        )
        .route(
            "/payment-methods",
            get(handlers::payment_methods::list_payment_methods)
                .post(handlers::payment_methods::create_payment_method),
        )
        .route(
            "/payment-methods/:id",
            get(handlers::payment_methods::get_payment_method)
                .put(handlers::payment_methods::update_payment_method)
                .delete(handlers::payment_methods::delete_payment_method),
        );

    let coupons = Router::new()
        .route(
            "/coupons",
            get(handlers::coupons::list_coupons).post(handlers::coupons::create_coupon),
        )
        .route(
            "/coupons/:id",
            get(handlers::coupons::get_coupon)
                .put(handlers::coupons::update_coupon)
                .delete(handlers::coupons::delete_coupon),
        );

    let protected = Router::new()
        .merge(cart)
        .merge(orders)
        .merge(payments)
        .merge(shipments)
        .merge(coupons)
        .merge(methods)
        .route_layer(middleware::from_fn_with_state(
            auth_service,
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(protected)
}

/// Full application router: API, OpenAPI docs and the HTTP middleware stack.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = TimeoutLayer::new(Duration::from_secs(state.config.request_timeout_secs));

    Router::new()
        .nest("/api/v1", api_v1_routes(state.services.auth.clone()))
        .merge(openapi::swagger_ui())
        .layer(timeout)
        .layer(cors)
        .layer(crate::tracing::configure_http_tracing())
        .layer(middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

fn cors_layer(config: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        if config.is_production() {
            // No cross-origin access unless origins are configured.
            CorsLayer::new()
        } else {
            CorsLayer::permissive()
        }
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
