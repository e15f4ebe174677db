use super::{
    common::{total_pages, PaginationParams},
    shipping_methods::MethodQuery,
};
use crate::{
    auth::AuthUser,
    entities::payment_method,
    errors::ServiceError,
    handlers::AppState,
    services::payment_methods::{CreatePaymentMethodInput, UpdatePaymentMethodInput},
    ApiResponse, ApiResult, PaginatedResponse,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};

/// List payment methods
#[utoipa::path(
    get,
    path = "/api/v1/payment-methods",
    params(PaginationParams, MethodQuery),
    responses(
        (status = 200, description = "Payment methods page", body = crate::ApiResponse<crate::PaginatedResponse<payment_method::Model>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Payment Methods"
)]
pub async fn list_payment_methods(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
    Query(query): Query<MethodQuery>,
) -> ApiResult<PaginatedResponse<payment_method::Model>> {
    let (page, per_page) = params.resolve(&state.config);
    let (items, total) = state
        .services
        .payment_methods
        .list_payment_methods(query.name, page, per_page)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit: per_page,
        total_pages: total_pages(total, per_page),
    })))
}

/// Get payment method by ID
#[utoipa::path(
    get,
    path = "/api/v1/payment-methods/{id}",
    params(("id" = i32, Path, description = "Payment method ID")),
    responses(
        (status = 200, description = "Payment method", body = crate::ApiResponse<payment_method::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payment Methods"
)]
pub async fn get_payment_method(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<payment_method::Model> {
    let method = state.services.payment_methods.get_payment_method(id).await?;
    Ok(Json(ApiResponse::success(method)))
}

/// Create a payment method (admin)
#[utoipa::path(
    post,
    path = "/api/v1/payment-methods",
    request_body = CreatePaymentMethodInput,
    responses(
        (status = 201, description = "Payment method created", body = crate::ApiResponse<payment_method::Model>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payment Methods"
)]
pub async fn create_payment_method(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreatePaymentMethodInput>,
) -> Result<(StatusCode, Json<ApiResponse<payment_method::Model>>), ServiceError> {
    user.require_admin()?;
    let method = state
        .services
        .payment_methods
        .create_payment_method(request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(method))))
}

/// Update a payment method (admin)
#[utoipa::path(
    put,
    path = "/api/v1/payment-methods/{id}",
    params(("id" = i32, Path, description = "Payment method ID")),
    request_body = UpdatePaymentMethodInput,
    responses(
        (status = 200, description = "Payment method updated", body = crate::ApiResponse<payment_method::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payment Methods"
)]
pub async fn update_payment_method(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdatePaymentMethodInput>,
) -> ApiResult<payment_method::Model> {
    user.require_admin()?;
    let method = state
        .services
        .payment_methods
        .update_payment_method(id, request)
        .await?;
    Ok(Json(ApiResponse::success(method)))
}

/// Soft-delete a payment method (admin)
#[utoipa::path(
    delete,
    path = "/api/v1/payment-methods/{id}",
    params(("id" = i32, Path, description = "Payment method ID")),
    responses(
        (status = 204, description = "Payment method deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payment Methods"
)]
pub async fn delete_payment_method(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    user.require_admin()?;
    state
        .services
        .payment_methods
        .delete_payment_method(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
