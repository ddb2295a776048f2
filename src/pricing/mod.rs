//! Delivery charge and order totals.
//!
//! All money is `Decimal`; the only float in here is the incoming distance,
//! converted once before the per-km rate is applied.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;

use crate::config::PricingConfig;
use crate::error::AppError;
use crate::models::coupon::Coupon;
use crate::models::order::{LineItem, OrderCharges};

const MONEY_DP: u32 = 2;

/// `ceil(distance_km * rate_per_km) + base_fare`
pub fn delivery_charge(
    distance_km: f64,
    rate_per_km: Decimal,
    base_fare: Decimal,
) -> Result<Decimal, AppError> {
    if !distance_km.is_finite() || distance_km < 0.0 {
        return Err(AppError::InvalidCoordinate(format!(
            "distance {distance_km} is not a finite non-negative number"
        )));
    }

    let distance = Decimal::from_f64(distance_km).ok_or_else(|| {
        AppError::InvalidCoordinate(format!("distance {distance_km} is not representable"))
    })?;

    let variable = distance
        .checked_mul(rate_per_km)
        .ok_or_else(|| AppError::Internal("delivery charge overflow".to_string()))?
        .ceil();

    variable
        .checked_add(base_fare)
        .ok_or_else(|| AppError::Internal("delivery charge overflow".to_string()))
}

pub fn validate_line_item(item: &LineItem) -> Result<(), AppError> {
    if item.quantity < 1 {
        return Err(AppError::InvalidLineItem(format!(
            "quantity {} for {} must be at least 1",
            item.quantity, item.medicine_id
        )));
    }
    if item.unit_price.is_sign_negative() {
        return Err(AppError::InvalidLineItem(format!(
            "unit price {} for {} must not be negative",
            item.unit_price, item.medicine_id
        )));
    }
    Ok(())
}

/// Σ unit_price × quantity, validating every item.
pub fn subtotal(items: &[LineItem]) -> Result<Decimal, AppError> {
    if items.is_empty() {
        return Err(AppError::InvalidLineItem("order has no items".to_string()));
    }

    items.iter().try_fold(Decimal::ZERO, |acc, item| {
        validate_line_item(item)?;
        item.unit_price
            .checked_mul(Decimal::from(item.quantity))
            .and_then(|line| acc.checked_add(line))
            .ok_or_else(|| {
                AppError::InvalidLineItem(format!(
                    "line total for {} overflows",
                    item.medicine_id
                ))
            })
    })
}

/// Percentage discount on the subtotal, rounded to paise/cents.
pub fn coupon_discount(
    subtotal: Decimal,
    coupon: &Coupon,
    now: DateTime<Utc>,
) -> Result<Decimal, AppError> {
    if !coupon.is_valid_at(now) {
        return Err(AppError::BadRequest(format!("coupon {} has expired", coupon.code)));
    }

    let discount = (subtotal * coupon.discount_percentage / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero);

    Ok(discount.min(subtotal))
}

/// `subtotal + platform_fee + delivery_charge - discount`, never below zero.
pub fn compute_charges(
    subtotal: Decimal,
    delivery_charge: Decimal,
    platform_fee: Decimal,
    discount: Decimal,
) -> OrderCharges {
    let total = (subtotal + platform_fee + delivery_charge - discount).max(Decimal::ZERO);

    OrderCharges {
        subtotal,
        delivery_charge,
        platform_fee,
        discount,
        total,
    }
}

/// Re-totals `charges` after a delivery charge becomes known.
pub fn with_delivery_charge(charges: &OrderCharges, delivery_charge: Decimal) -> OrderCharges {
    compute_charges(
        charges.subtotal,
        delivery_charge,
        charges.platform_fee,
        charges.discount,
    )
}

/// Prices a fresh order (no rider yet, so no delivery charge).
pub fn price_order(
    items: &[LineItem],
    coupon: Option<&Coupon>,
    config: &PricingConfig,
    now: DateTime<Utc>,
) -> Result<OrderCharges, AppError> {
    let subtotal = subtotal(items)?;
    let discount = match coupon {
        Some(coupon) => coupon_discount(subtotal, coupon, now)?,
        None => Decimal::ZERO,
    };

    Ok(compute_charges(subtotal, Decimal::ZERO, config.platform_fee, discount))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;

    fn item(quantity: i64, unit_price: Decimal) -> LineItem {
        LineItem {
            medicine_id: Uuid::new_v4(),
            name: "Paracetamol 500mg".to_string(),
            quantity,
            unit_price,
        }
    }

    fn coupon(pct: Decimal, expires_in: Option<Duration>) -> Coupon {
        let now = Utc::now();
        Coupon {
            code: "WELCOME".to_string(),
            discount_percentage: pct,
            expires_at: expires_in.map(|d| now + d),
            created_at: now,
        }
    }

    #[test]
    fn delivery_charge_rounds_distance_part_up() {
        // 2.9 km * 5 = 14.5 -> 15, + 30 base
        let charge = delivery_charge(2.9, dec!(5), dec!(30)).unwrap();
        assert_eq!(charge, dec!(45));
    }

    #[test]
    fn zero_distance_costs_only_the_base_fare() {
        assert_eq!(delivery_charge(0.0, dec!(5), dec!(30)).unwrap(), dec!(30));
    }

    #[test]
    fn delivery_charge_rejects_nan() {
        assert!(matches!(
            delivery_charge(f64::NAN, dec!(5), dec!(30)),
            Err(AppError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn subtotal_sums_price_times_quantity() {
        let items = vec![item(2, dec!(120.50)), item(1, dec!(259))];
        assert_eq!(subtotal(&items).unwrap(), dec!(500.00));
    }

    #[test]
    fn negative_quantity_and_price_are_rejected() {
        assert!(matches!(
            subtotal(&[item(-1, dec!(10))]),
            Err(AppError::InvalidLineItem(_))
        ));
        assert!(matches!(
            subtotal(&[item(0, dec!(10))]),
            Err(AppError::InvalidLineItem(_))
        ));
        assert!(matches!(
            subtotal(&[item(1, dec!(-0.01))]),
            Err(AppError::InvalidLineItem(_))
        ));
    }

    #[test]
    fn total_has_no_rounding_drift() {
        let charges = compute_charges(dec!(500), dec!(45), dec!(10), Decimal::ZERO);
        assert_eq!(charges.total, dec!(555));
    }

    #[test]
    fn re_totalling_keeps_discount() {
        let base = compute_charges(dec!(500), Decimal::ZERO, dec!(10), dec!(50));
        let updated = with_delivery_charge(&base, dec!(45));
        assert_eq!(updated.total, dec!(505));
        assert_eq!(updated.discount, dec!(50));
    }

    #[test]
    fn expired_coupon_is_refused() {
        let expired = coupon(dec!(10), Some(Duration::hours(-1)));
        assert!(coupon_discount(dec!(500), &expired, Utc::now()).is_err());
    }

    #[test]
    fn coupon_discount_is_a_rounded_percentage() {
        let c = coupon(dec!(12.5), None);
        assert_eq!(coupon_discount(dec!(99.99), &c, Utc::now()).unwrap(), dec!(12.50));
    }

    #[test]
    fn discount_never_drives_total_negative() {
        let charges = compute_charges(dec!(10), Decimal::ZERO, Decimal::ZERO, dec!(25));
        assert_eq!(charges.total, Decimal::ZERO);
    }

    #[test]
    fn price_order_applies_platform_fee_and_coupon() {
        let config = PricingConfig::default();
        let c = coupon(dec!(10), Some(Duration::days(1)));
        let charges = price_order(&[item(5, dec!(100))], Some(&c), &config, Utc::now()).unwrap();
        assert_eq!(charges.subtotal, dec!(500));
        assert_eq!(charges.discount, dec!(50.00));
        assert_eq!(charges.total, dec!(460));
    }
}
