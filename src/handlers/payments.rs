use super::common::{total_pages, PaginationParams};
use crate::{
    auth::AuthUser,
    entities::payment::{self, PaymentStatus},
    errors::ServiceError,
    handlers::AppState,
    services::payments::{CreatePaymentRequest, PaymentFilter, UpdatePaymentStatusRequest},
    ApiResponse, ApiResult, PaginatedResponse,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use utoipa::IntoParams;
use validator::Validate;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PaymentQuery {
    pub status: Option<PaymentStatus>,
    pub order_id: Option<i32>,
    pub payment_method_id: Option<i32>,
}

/// List all payments (admin)
#[utoipa::path(
    get,
    path = "/api/v1/payments",
    params(PaginationParams, PaymentQuery),
    responses(
        (status = 200, description = "Payments page", body = crate::ApiResponse<crate::PaginatedResponse<payment::Model>>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
    Query(query): Query<PaymentQuery>,
) -> ApiResult<PaginatedResponse<payment::Model>> {
    user.require_admin()?;
    let (page, per_page) = params.resolve(&state.config);
    let filter = PaymentFilter {
        status: query.status,
        order_id: query.order_id,
        payment_method_id: query.payment_method_id,
    };
    let (items, total) = state
        .services
        .payments
        .list_payments(filter, page, per_page)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit: per_page,
        total_pages: total_pages(total, per_page),
    })))
}

/// Open a pending payment for one of the caller's orders
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment created", body = crate::ApiResponse<payment::Model>,
            headers(
                ("X-Request-Id" = String, description = "Unique request identifier"),
            )
        ),
        (status = 400, description = "Bad amount or cancelled order", body = crate::errors::ErrorResponse),
        (status = 401, description = "Order belongs to someone else", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already paid or payment pending", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<payment::Model>>), ServiceError> {
    request.validate()?;
    let payment = state
        .services
        .payments
        .create_payment(
            request.order_id,
            request.payment_method_id,
            request.amount,
            user.user_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(payment))))
}

/// Get payment by ID
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = i32, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment details", body = crate::ApiResponse<payment::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<payment::Model> {
    let payment = state.services.payments.get_payment(id, &user).await?;
    Ok(Json(ApiResponse::success(payment)))
}

/// Settle a pending payment as paid or failed (admin)
#[utoipa::path(
    put,
    path = "/api/v1/payments/{id}/status",
    params(("id" = i32, Path, description = "Payment ID")),
    request_body = UpdatePaymentStatusRequest,
    responses(
        (status = 200, description = "Payment settled", body = crate::ApiResponse<payment::Model>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payment not pending or order not payable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn update_payment_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdatePaymentStatusRequest>,
) -> ApiResult<payment::Model> {
    user.require_admin()?;
    let payment = state
        .services
        .payments
        .update_payment_status(id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(payment)))
}

/// Get payments for an order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/payments",
    params(("id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payments for order", body = crate::ApiResponse<Vec<payment::Model>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn list_order_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Vec<payment::Model>> {
    let payments = state
        .services
        .payments
        .list_order_payments(id, &user)
        .await?;
    Ok(Json(ApiResponse::success(payments)))
}
