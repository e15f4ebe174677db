use super::common::{total_pages, PaginationParams};
use crate::{
    auth::AuthUser,
    entities::coupon,
    errors::ServiceError,
    handlers::AppState,
    services::coupons::{CouponFilter, CreateCouponInput, UpdateCouponInput},
    ApiResponse, ApiResult, PaginatedResponse,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CouponQuery {
    /// Substring of the coupon code
    pub code: Option<String>,
    /// Only coupons that have not expired
    #[serde(default)]
    pub active: bool,
}

/// List coupons
#[utoipa::path(
    get,
    path = "/api/v1/coupons",
    params(PaginationParams, CouponQuery),
    responses(
        (status = 200, description = "Coupons page", body = crate::ApiResponse<crate::PaginatedResponse<coupon::Model>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
    Query(query): Query<CouponQuery>,
) -> ApiResult<PaginatedResponse<coupon::Model>> {
    let (page, per_page) = params.resolve(&state.config);
    let filter = CouponFilter {
        code: query.code,
        active_only: query.active,
    };
    let (items, total) = state
        .services
        .coupons
        .list_coupons(filter, page, per_page)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit: per_page,
        total_pages: total_pages(total, per_page),
    })))
}

/// Get coupon by ID
#[utoipa::path(
    get,
    path = "/api/v1/coupons/{id}",
    params(("id" = i32, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Coupon", body = crate::ApiResponse<coupon::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<coupon::Model> {
    let coupon = state.services.coupons.get_coupon(id).await?;
    Ok(Json(ApiResponse::success(coupon)))
}

/// Create a coupon (admin)
#[utoipa::path(
    post,
    path = "/api/v1/coupons",
    request_body = CreateCouponInput,
    responses(
        (status = 201, description = "Coupon created", body = crate::ApiResponse<coupon::Model>),
        (status = 400, description = "Invalid amounts", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already exists", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateCouponInput>,
) -> Result<(StatusCode, Json<ApiResponse<coupon::Model>>), ServiceError> {
    user.require_admin()?;
    let coupon = state.services.coupons.create_coupon(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(coupon))))
}

/// Update a coupon (admin)
#[utoipa::path(
    put,
    path = "/api/v1/coupons/{id}",
    params(("id" = i32, Path, description = "Coupon ID")),
    request_body = UpdateCouponInput,
    responses(
        (status = 200, description = "Coupon updated", body = crate::ApiResponse<coupon::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already exists", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateCouponInput>,
) -> ApiResult<coupon::Model> {
    user.require_admin()?;
    let coupon = state.services.coupons.update_coupon(id, request).await?;
    Ok(Json(ApiResponse::success(coupon)))
}

/// Soft-delete a coupon (admin)
#[utoipa::path(
    delete,
    path = "/api/v1/coupons/{id}",
    params(("id" = i32, Path, description = "Coupon ID")),
    responses(
        (status = 204, description = "Coupon deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    user.require_admin()?;
    state.services.coupons.delete_coupon(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
