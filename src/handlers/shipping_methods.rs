use super::common::{total_pages, PaginationParams};
use crate::{
    auth::AuthUser,
    entities::shipping_method,
    errors::ServiceError,
    handlers::AppState,
    services::shipping_methods::{CreateShippingMethodInput, UpdateShippingMethodInput},
    ApiResponse, ApiResult, PaginatedResponse,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MethodQuery {
    /// Substring of the method name
    pub name: Option<String>,
}

/// List shipping methods available at checkout
#[utoipa::path(
    get,
    path = "/api/v1/shipping-methods",
    params(PaginationParams, MethodQuery),
    responses(
        (status = 200, description = "Shipping methods page", body = crate::ApiResponse<crate::PaginatedResponse<shipping_method::Model>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Shipping Methods"
)]
pub async fn list_shipping_methods(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
    Query(query): Query<MethodQuery>,
) -> ApiResult<PaginatedResponse<shipping_method::Model>> {
    let (page, per_page) = params.resolve(&state.config);
    let (items, total) = state
        .services
        .shipping_methods
        .list_shipping_methods(query.name, page, per_page)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit: per_page,
        total_pages: total_pages(total, per_page),
    })))
}

/// Get shipping method by ID
#[utoipa::path(
    get,
    path = "/api/v1/shipping-methods/{id}",
    params(("id" = i32, Path, description = "Shipping method ID")),
    responses(
        (status = 200, description = "Shipping method", body = crate::ApiResponse<shipping_method::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Shipping Methods"
)]
pub async fn get_shipping_method(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<shipping_method::Model> {
    let method = state.services.shipping_methods.get_shipping_method(id).await?;
    Ok(Json(ApiResponse::success(method)))
}

/// Create a shipping method (admin)
#[utoipa::path(
    post,
    path = "/api/v1/shipping-methods",
    request_body = CreateShippingMethodInput,
    responses(
        (status = 201, description = "Shipping method created", body = crate::ApiResponse<shipping_method::Model>),
        (status = 400, description = "Invalid name, cost or delivery estimate", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Shipping Methods"
)]
pub async fn create_shipping_method(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateShippingMethodInput>,
) -> Result<(StatusCode, Json<ApiResponse<shipping_method::Model>>), ServiceError> {
    user.require_admin()?;
    let method = state
        .services
        .shipping_methods
        .create_shipping_method(request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(method))))
}

/// Update a shipping method (admin)
#[utoipa::path(
    put,
    path = "/api/v1/shipping-methods/{id}",
    params(("id" = i32, Path, description = "Shipping method ID")),
    request_body = UpdateShippingMethodInput,
    responses(
        (status = 200, description = "Shipping method updated", body = crate::ApiResponse<shipping_method::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Shipping Methods"
)]
pub async fn update_shipping_method(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateShippingMethodInput>,
) -> ApiResult<shipping_method::Model> {
    user.require_admin()?;
    let method = state
        .services
        .shipping_methods
        .update_shipping_method(id, request)
        .await?;
    Ok(Json(ApiResponse::success(method)))
}

/// Soft-delete a shipping method (admin)
#[utoipa::path(
    delete,
    path = "/api/v1/shipping-methods/{id}",
    params(("id" = i32, Path, description = "Shipping method ID")),
    responses(
        (status = 204, description = "Shipping method deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Shipping Methods"
)]
pub async fn delete_shipping_method(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    user.require_admin()?;
    state
        .services
        .shipping_methods
        .delete_shipping_method(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
