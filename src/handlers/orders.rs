use super::common::{total_pages, PaginationParams};
use crate::{
    auth::AuthUser,
    entities::order,
    errors::ServiceError,
    handlers::AppState,
    services::{checkout::CheckoutRequest, orders::{ensure_owner_or_admin, OrderDetail}},
    ApiResponse, ApiResult, PaginatedResponse,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use validator::Validate;

/// Turn the current user's cart into an order
#[utoipa::path(
    post,
    path = "/api/v1/orders/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = crate::ApiResponse<OrderDetail>),
        (status = 400, description = "Empty cart or invalid coupon", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart, product, coupon or shipping method not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>), ServiceError> {
    request.validate()?;
    let detail = state
        .services
        .checkout
        .checkout(
            user.user_id,
            request.shipping_method_id,
            request.coupon_code.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(detail))))
}

/// Orders of the current user, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders page", body = crate::ApiResponse<crate::PaginatedResponse<order::Model>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    let (page, per_page) = params.resolve(&state.config);
    let (items, total) = state
        .services
        .orders
        .list_orders(user.user_id, page, per_page)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit: per_page,
        total_pages: total_pages(total, per_page),
    })))
}

/// Order with items, shipment and payments
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order details", body = crate::ApiResponse<OrderDetail>),
        (status = 401, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<OrderDetail> {
    let detail = state.services.orders.get_order(id, &user).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// Cancel an order and restock its items (owner or admin)
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled", body = crate::ApiResponse<order::Model>),
        (status = 409, description = "Already cancelled, shipped or delivered", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<order::Model> {
    let existing = state.services.orders.find_order(id).await?;
    ensure_owner_or_admin(&existing, &user)?;

    let order = state.services.order_status.cancel_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Confirm an order, debiting stock (admin)
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/confirm",
    params(("id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order processing", body = crate::ApiResponse<order::Model>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order cannot be confirmed", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn confirm_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<order::Model> {
    user.require_admin()?;
    let order = state.services.order_status.confirm_checkout(id).await?;
    Ok(Json(ApiResponse::success(order)))
}
