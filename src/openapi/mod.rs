use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fulfillment API",
        version = "1.0.0",
        description = r#"
# Checkout & Order Lifecycle API

Carts, checkout, order status transitions, payments, shipments and coupons.

## Authentication

Every endpoint except `/health` requires a JWT bearer token:

```
Authorization: Bearer <your-jwt-token>
```

Administrative operations (confirming orders, settling payments, listing
payments and shipments, managing shipments, coupons and shipping/payment
methods) require the `admin` role.

## Error Handling

Errors share one body shape carrying a machine-readable `kind` and the request id:

```json
{
  "error": "Unprocessable Entity",
  "kind": "invalid_input",
  "message": "Insufficient stock for product 'Lamp' (id 3): available 1, requested 2",
  "request_id": "5f0c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20, max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Cart", description = "Shopping cart endpoints"),
        (name = "Orders", description = "Checkout and order lifecycle endpoints"),
        (name = "Payments", description = "Payment bookkeeping endpoints"),
        (name = "Shipments", description = "Shipment tracking endpoints"),
        (name = "Coupons", description = "Coupon management endpoints"),
        (name = "Shipping Methods", description = "Shipping method catalog endpoints"),
        (name = "Payment Methods", description = "Payment method catalog endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::health::health_check,

        // Cart
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::update_item,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::apply_coupon,
        crate::handlers::carts::remove_coupon,

        // Orders
        crate::handlers::orders::checkout,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::confirm_order,

        // Payments
        crate::handlers::payments::list_payments,
        crate::handlers::payments::create_payment,
        crate::handlers::payments::get_payment,
        crate::handlers::payments::update_payment_status,
        crate::handlers::payments::list_order_payments,

        // Shipments
        crate::handlers::shipments::list_shipments,
        crate::handlers::shipments::create_shipment,
        crate::handlers::shipments::get_shipment,
        crate::handlers::shipments::update_shipment,

        // Coupons
        crate::handlers::coupons::list_coupons,
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::update_coupon,
        crate::handlers::coupons::delete_coupon,

        // Shipping and payment methods
        crate::handlers::shipping_methods::list_shipping_methods,
        crate::handlers::shipping_methods::get_shipping_method,
        crate::handlers::shipping_methods::create_shipping_method,
        crate::handlers::shipping_methods::update_shipping_method,
        crate::handlers::shipping_methods::delete_shipping_method,
        crate::handlers::payment_methods::list_payment_methods,
        crate::handlers::payment_methods::get_payment_method,
        crate::handlers::payment_methods::create_payment_method,
        crate::handlers::payment_methods::update_payment_method,
        crate::handlers::payment_methods::delete_payment_method,
    ),
    components(
        schemas(
            crate::entities::order::OrderStatus,
            crate::entities::payment::PaymentStatus,
            crate::entities::shipment::ShipmentStatus,
            crate::services::orders::OrderDetail,
            crate::services::carts::CartView,
            crate::services::carts::CartItemView,
            crate::errors::ErrorResponse,
            crate::errors::ErrorKind
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
