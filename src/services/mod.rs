pub mod carts;
pub mod checkout;
pub mod coupons;
pub mod discounts;
pub mod inventory;
pub mod order_status;
pub mod orders;
pub mod payment_methods;
pub mod payments;
pub mod shipments;
pub mod shipping_methods;
