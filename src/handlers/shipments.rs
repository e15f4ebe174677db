use super::common::{total_pages, PaginationParams};
use crate::{
    auth::AuthUser,
    entities::shipment::{self, ShipmentStatus},
    errors::ServiceError,
    handlers::AppState,
    services::shipments::{CreateShipmentRequest, ShipmentFilter, UpdateShipmentRequest},
    ApiResponse, ApiResult, PaginatedResponse,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ShipmentQuery {
    pub status: Option<ShipmentStatus>,
    pub order_id: Option<i32>,
    pub shipping_method_id: Option<i32>,
    /// Substring of the tracking number
    pub tracking_number: Option<String>,
    /// First day included (`YYYY-MM-DD`, UTC)
    pub date_from: Option<NaiveDate>,
    /// Last day included (`YYYY-MM-DD`, UTC)
    pub date_to: Option<NaiveDate>,
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

impl From<ShipmentQuery> for ShipmentFilter {
    fn from(query: ShipmentQuery) -> Self {
        Self {
            status: query.status,
            order_id: query.order_id,
            shipping_method_id: query.shipping_method_id,
            tracking_number: query.tracking_number,
            created_from: query.date_from.map(start_of),
            created_before: query.date_to.and_then(|d| d.succ_opt()).map(start_of),
        }
    }
}

/// List shipments across all orders (admin)
#[utoipa::path(
    get,
    path = "/api/v1/shipments",
    params(PaginationParams, ShipmentQuery),
    responses(
        (status = 200, description = "Shipments page", body = crate::ApiResponse<crate::PaginatedResponse<shipment::Model>>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Shipments"
)]
pub async fn list_shipments(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
    Query(query): Query<ShipmentQuery>,
) -> ApiResult<PaginatedResponse<shipment::Model>> {
    user.require_admin()?;
    let (page, per_page) = params.resolve(&state.config);
    let (items, total) = state
        .services
        .shipments
        .list_shipments(query.into(), page, per_page)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit: per_page,
        total_pages: total_pages(total, per_page),
    })))
}

/// Open a shipment for a paid or processing order that has none (admin)
#[utoipa::path(
    post,
    path = "/api/v1/shipments",
    request_body = CreateShipmentRequest,
    responses(
        (status = 201, description = "Shipment created", body = crate::ApiResponse<shipment::Model>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or shipping method not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order not shippable or already has a shipment", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Shipments"
)]
pub async fn create_shipment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateShipmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<shipment::Model>>), ServiceError> {
    user.require_admin()?;
    let shipment = state.services.shipments.create_shipment(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(shipment))))
}

/// Get shipment by ID (owner of the order or admin)
#[utoipa::path(
    get,
    path = "/api/v1/shipments/{id}",
    params(("id" = i32, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Shipment details", body = crate::ApiResponse<shipment::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Shipments"
)]
pub async fn get_shipment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<shipment::Model> {
    let shipment = state.services.shipments.get_shipment(id, &user).await?;
    Ok(Json(ApiResponse::success(shipment)))
}

/// Set tracking and advance a shipment (admin)
#[utoipa::path(
    put,
    path = "/api/v1/shipments/{id}",
    params(("id" = i32, Path, description = "Shipment ID")),
    request_body = UpdateShipmentRequest,
    responses(
        (status = 200, description = "Shipment updated", body = crate::ApiResponse<shipment::Model>),
        (status = 400, description = "Shipment cannot move to that status", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order cannot be shipped or delivered", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Shipments"
)]
pub async fn update_shipment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateShipmentRequest>,
) -> ApiResult<shipment::Model> {
    user.require_admin()?;
    let shipment = state.services.shipments.update_shipment(id, request).await?;
    Ok(Json(ApiResponse::success(shipment)))
}
