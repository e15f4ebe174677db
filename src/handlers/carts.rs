use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::AppState,
    services::carts::{CartItemChange, CartView},
    ApiResponse, ApiResult,
};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    #[validate(range(min = 1))]
    pub product_id: i32,
    #[validate(range(min = 1))]
    #[schema(example = 2)]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "SPRING20")]
    pub code: String,
}

/// Current user's cart with totals
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart contents", body = crate::ApiResponse<CartView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartView> {
    let cart = state.services.cart.get_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Add a product to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Item stored; `capped` when reduced to stock", body = crate::ApiResponse<CartItemChange>),
        (status = 400, description = "Bad quantity or out of stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<AddCartItemRequest>,
) -> ApiResult<CartItemChange> {
    request.validate()?;
    let change = state
        .services
        .cart
        .add_item(user.user_id, request.product_id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::success(change)))
}

/// Change the quantity of a cart line
#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{product_id}",
    params(("product_id" = i32, Path, description = "Product ID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Item updated", body = crate::ApiResponse<CartItemChange>),
        (status = 404, description = "No such line", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<i32>,
    Json(request): Json<UpdateCartItemRequest>,
) -> ApiResult<CartItemChange> {
    request.validate()?;
    let change = state
        .services
        .cart
        .update_item_quantity(user.user_id, product_id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::success(change)))
}

/// Remove a product from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{product_id}",
    params(("product_id" = i32, Path, description = "Product ID")),
    responses((status = 204, description = "Removed (or was not there)")),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .cart
        .remove_item(user.user_id, product_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Apply a coupon code to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/coupon",
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Coupon applied", body = crate::ApiResponse<CartView>),
        (status = 400, description = "Coupon expired or deleted", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown coupon", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ApplyCouponRequest>,
) -> ApiResult<CartView> {
    request.validate()?;
    state
        .services
        .cart
        .apply_coupon(user.user_id, &request.code)
        .await?;
    let cart = state.services.cart.get_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Remove the coupon from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/coupon",
    responses((status = 204, description = "Coupon removed")),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_coupon(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state.services.cart.remove_coupon(user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
