pub mod carts;
pub mod common;
pub mod coupons;
pub mod health;
pub mod orders;
pub mod payment_methods;
pub mod payments;
pub mod shipments;
pub mod shipping_methods;

use crate::auth::AuthService;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    carts::CartService, checkout::CheckoutService, coupons::CouponService,
    order_status::OrderStatusService, orders::OrderQueryService,
    payment_methods::PaymentMethodService, payments::PaymentService, shipments::ShipmentService,
    shipping_methods::ShippingMethodService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub coupons: Arc<CouponService>,
    pub checkout: Arc<CheckoutService>,
    pub order_status: Arc<OrderStatusService>,
    pub orders: Arc<OrderQueryService>,
    pub payments: Arc<PaymentService>,
    pub shipments: Arc<ShipmentService>,
    pub shipping_methods: Arc<ShippingMethodService>,
    pub payment_methods: Arc<PaymentMethodService>,
    pub auth: Arc<AuthService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
    ) -> Self {
        Self {
            cart: Arc::new(CartService::new(db_pool.clone(), event_sender.clone())),
            coupons: Arc::new(CouponService::new(db_pool.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(db_pool.clone(), event_sender.clone())),
            order_status: Arc::new(OrderStatusService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            orders: Arc::new(OrderQueryService::new(db_pool.clone())),
            payments: Arc::new(PaymentService::new(db_pool.clone(), event_sender.clone())),
            shipments: Arc::new(ShipmentService::new(db_pool.clone(), event_sender.clone())),
            shipping_methods: Arc::new(ShippingMethodService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            payment_methods: Arc::new(PaymentMethodService::new(db_pool, event_sender)),
            auth: auth_service,
        }
    }
}
