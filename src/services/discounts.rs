//! Coupon arithmetic. Whether a coupon may be used at all is a separate
//! question answered by [`is_usable`]; [`discount`] never re-checks it.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::entities::coupon;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Discount granted by `coupon` on `subtotal`: `subtotal * percent / 100`,
/// capped at `max_discount`, never negative, truncated to cents.
pub fn discount(subtotal: Decimal, coupon: &coupon::Model) -> Decimal {
    let Some(percent) = coupon.discount_percent else {
        return Decimal::ZERO;
    };
    if subtotal <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let percent = percent.clamp(Decimal::ZERO, HUNDRED);
    let mut amount = (subtotal * percent / HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::ToZero);

    if let Some(max) = coupon.max_discount {
        amount = amount.min(max);
    }
    amount.max(Decimal::ZERO)
}

/// A coupon is usable when it is not soft-deleted and has not expired.
pub fn is_usable(coupon: &coupon::Model, now: DateTime<Utc>) -> bool {
    coupon.deleted_at.is_none() && coupon.expired_at.map_or(true, |expiry| expiry > now)
}

/// `subtotal - discount + shipping`, floored at zero.
pub fn order_total(subtotal: Decimal, discount: Decimal, shipping: Decimal) -> Decimal {
    (subtotal - discount + shipping).max(Decimal::ZERO)
}
