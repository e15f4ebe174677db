//! SeaORM entities for the storefront tables.

pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod payment_method;
pub mod product;
pub mod shipment;
pub mod shipping_method;
