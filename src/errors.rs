use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{error::DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::order::{OrderStatus, OrderTransition};
use crate::entities::payment::PaymentStatus;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "kind": "invalid_input",
    "message": "Insufficient stock for product 'Desk Lamp' (id 7): available 1, requested 2",
    "request_id": "0b6f6a36-7d6b-4d55-a3f3-3c4f6a0a1d2e",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category
    pub error: String,
    /// Machine-readable error kind
    pub kind: ErrorKind,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

/// Coarse error categories shared by every service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    Unauthorized,
    Forbidden,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Cart not found for user {0}")]
    CartNotFound(i32),

    #[error("Cart {0} is empty")]
    CartEmpty(i32),

    #[error("Product {0} is not available")]
    ProductUnavailable(String),

    #[error(
        "Insufficient stock for product '{product_name}' (id {product_id}): available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: i32,
        product_name: String,
        available: i32,
        requested: i32,
    },

    #[error("Coupon '{0}' not found")]
    CouponNotFound(String),

    #[error("Coupon '{0}' is not valid or has expired")]
    CouponInvalid(String),

    #[error("Shipping method {0} not found")]
    ShippingMethodNotFound(i32),

    #[error("Payment method {0} not found")]
    PaymentMethodNotFound(i32),

    #[error("Order {0} not found")]
    OrderNotFound(i32),

    #[error("Payment {0} not found")]
    PaymentNotFound(i32),

    #[error("Shipment {0} not found")]
    ShipmentNotFound(i32),

    #[error("Order {0} has already been paid")]
    AlreadyPaid(i32),

    #[error("A pending payment for order {0} already exists")]
    PendingPaymentExists(i32),

    #[error("Payment {payment_id} is {status}; only pending payments can be updated")]
    PaymentNotPending {
        payment_id: i32,
        status: PaymentStatus,
    },

    #[error("Order {order_id} cannot {action} while {from}")]
    InvalidTransition {
        order_id: i32,
        from: OrderStatus,
        action: OrderTransition,
    },

    #[error("Order {0} is already cancelled")]
    AlreadyCancelled(i32),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn insufficient_stock(
        product_id: i32,
        product_name: impl Into<String>,
        available: i32,
        requested: i32,
    ) -> Self {
        Self::InsufficientStock {
            product_id,
            product_name: product_name.into(),
            available,
            requested,
        }
    }

    /// Maps a unique-index violation to `conflict`, passing every other database error through.
    pub fn from_unique_violation(err: DbErr, conflict: ServiceError) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => conflict,
            _ => ServiceError::DatabaseError(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CartNotFound(_)
            | Self::ProductUnavailable(_)
            | Self::CouponNotFound(_)
            | Self::ShippingMethodNotFound(_)
            | Self::PaymentMethodNotFound(_)
            | Self::OrderNotFound(_)
            | Self::PaymentNotFound(_)
            | Self::ShipmentNotFound(_)
            | Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyPaid(_)
            | Self::PendingPaymentExists(_)
            | Self::PaymentNotPending { .. }
            | Self::InvalidTransition { .. }
            | Self::AlreadyCancelled(_)
            | Self::Conflict(_) => ErrorKind::Conflict,
            Self::CartEmpty(_)
            | Self::InsufficientStock { .. }
            | Self::CouponInvalid(_)
            | Self::InvalidInput(_)
            | Self::ValidationError(_) => ErrorKind::InvalidInput,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::DatabaseError(_) | Self::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        if let Self::InsufficientStock { .. } = self {
            return StatusCode::UNPROCESSABLE_ENTITY;
        }
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();
        if kind == ErrorKind::Internal {
            tracing::error!(error = %self, "request failed with internal error");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            kind,
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rstest::rstest;

    #[rstest]
    #[case(ServiceError::CartNotFound(1), StatusCode::NOT_FOUND)]
    #[case(ServiceError::CartEmpty(1), StatusCode::BAD_REQUEST)]
    #[case(ServiceError::insufficient_stock(1, "Lamp", 0, 1), StatusCode::UNPROCESSABLE_ENTITY)]
    #[case(ServiceError::CouponInvalid("SPRING".into()), StatusCode::BAD_REQUEST)]
    #[case(ServiceError::AlreadyPaid(3), StatusCode::CONFLICT)]
    #[case(ServiceError::AlreadyCancelled(3), StatusCode::CONFLICT)]
    #[case(ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED)]
    #[case(ServiceError::Forbidden("x".into()), StatusCode::FORBIDDEN)]
    #[case(ServiceError::InternalError("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn status_code_follows_kind(#[case] err: ServiceError, #[case] expected: StatusCode) {
        assert_eq!(err.status_code(), expected);
    }

    #[test]
    fn invalid_transition_is_a_conflict() {
        let err = ServiceError::InvalidTransition {
            order_id: 9,
            from: OrderStatus::Shipped,
            action: OrderTransition::Cancel,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "Order 9 cannot be cancelled while shipped");
    }

    #[test]
    fn coupon_messages_are_distinct() {
        let missing = ServiceError::CouponNotFound("SAVE10".into()).to_string();
        let invalid = ServiceError::CouponInvalid("SAVE10".into()).to_string();
        assert_ne!(missing, invalid);
        assert!(invalid.contains("expired"));
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ServiceError::DatabaseError(DbErr::Custom("relation \"orders\" does not exist".into()));
        assert_eq!(err.response_message(), "Database error");

        let err = ServiceError::InternalError("pool exhausted".into());
        assert_eq!(err.response_message(), "Internal server error");
    }

    #[tokio::test]
    async fn response_carries_request_id_and_kind() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::OrderNotFound(42).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.kind, ErrorKind::NotFound);
        assert_eq!(payload.message, "Order 42 not found");
    }
}
