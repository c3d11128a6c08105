use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Pricing knobs for buyer checkout. All amounts in paise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutRules {
    pub free_shipping_threshold: i64,
    pub shipping_fee: i64,
    /// Value of one redeemed reward point.
    pub paise_per_point: i64,
    /// Order value that earns one reward point on delivery.
    pub paise_per_earned_point: i64,
}

impl Default for CheckoutRules {
    fn default() -> Self {
        Self {
            free_shipping_threshold: 49_900,
            shipping_fee: 4_900,
            paise_per_point: 100,
            paise_per_earned_point: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutLine {
    pub variant_id: i32,
    pub unit_price: i64,
    pub quantity: i32,
    pub stock: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderTotals {
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub points_redeemed: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("only {available} left in stock for variant {variant_id}")]
    InsufficientStock { variant_id: i32, available: i32 },
    #[error("cannot redeem {requested} points, balance is {balance}")]
    NotEnoughPoints { requested: i64, balance: i64 },
    #[error("invalid quantity {quantity} for variant {variant_id}")]
    InvalidQuantity { variant_id: i32, quantity: i32 },
    #[error("order amount overflow")]
    Overflow,
}

pub fn price_order(
    lines: &[CheckoutLine],
    points_balance: i64,
    points_requested: i64,
    rules: &CheckoutRules,
) -> Result<OrderTotals, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut subtotal: i64 = 0;
    for line in lines {
        if line.quantity <= 0 {
            return Err(CheckoutError::InvalidQuantity {
                variant_id: line.variant_id,
                quantity: line.quantity,
            });
        }
        if line.quantity > line.stock {
            return Err(CheckoutError::InsufficientStock {
                variant_id: line.variant_id,
                available: line.stock.max(0),
            });
        }
        let line_total = line
            .unit_price
            .checked_mul(i64::from(line.quantity))
            .ok_or(CheckoutError::Overflow)?;
        subtotal = subtotal
            .checked_add(line_total)
            .ok_or(CheckoutError::Overflow)?;
    }

    if points_requested > points_balance {
        return Err(CheckoutError::NotEnoughPoints {
            requested: points_requested,
            balance: points_balance,
        });
    }

    // Points cover at most the subtotal; shipping is always paid.
    let max_points = subtotal / rules.paise_per_point.max(1);
    let points_redeemed = points_requested.clamp(0, max_points);
    let discount = points_redeemed * rules.paise_per_point;

    let shipping_fee = if subtotal >= rules.free_shipping_threshold {
        0
    } else {
        rules.shipping_fee
    };

    Ok(OrderTotals {
        subtotal,
        shipping_fee,
        discount,
        total: subtotal - discount + shipping_fee,
        points_redeemed,
    })
}

pub fn points_earned(order_total: i64, rules: &CheckoutRules) -> i64 {
    if order_total <= 0 {
        return 0;
    }
    order_total / rules.paise_per_earned_point.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(variant_id: i32, unit_price: i64, quantity: i32, stock: i32) -> CheckoutLine {
        CheckoutLine {
            variant_id,
            unit_price,
            quantity,
            stock,
        }
    }

    #[test]
    fn charges_shipping_below_threshold() {
        let totals =
            price_order(&[line(1, 19_900, 1, 5)], 0, 0, &CheckoutRules::default()).unwrap();
        assert_eq!(totals.subtotal, 19_900);
        assert_eq!(totals.shipping_fee, 4_900);
        assert_eq!(totals.total, 24_800);
    }

    #[test]
    fn free_shipping_at_threshold() {
        let totals = price_order(
            &[line(1, 24_950, 2, 5)],
            0,
            0,
            &CheckoutRules::default(),
        )
        .unwrap();
        assert_eq!(totals.subtotal, 49_900);
        assert_eq!(totals.shipping_fee, 0);
    }

    #[test]
    fn redeems_points_up_to_subtotal() {
        let totals =
            price_order(&[line(1, 1_000, 1, 1)], 500, 500, &CheckoutRules::default()).unwrap();
        assert_eq!(totals.points_redeemed, 10);
        assert_eq!(totals.discount, 1_000);
        assert_eq!(totals.total, 4_900);
    }

    #[test]
    fn refuses_points_beyond_balance() {
        assert_eq!(
            price_order(&[line(1, 1_000, 1, 1)], 5, 6, &CheckoutRules::default()),
            Err(CheckoutError::NotEnoughPoints {
                requested: 6,
                balance: 5
            })
        );
    }

    #[test]
    fn reports_short_stock() {
        assert_eq!(
            price_order(&[line(7, 1_000, 4, 3)], 0, 0, &CheckoutRules::default()),
            Err(CheckoutError::InsufficientStock {
                variant_id: 7,
                available: 3
            })
        );
    }

    #[test]
    fn empty_cart_cannot_check_out() {
        assert_eq!(
            price_order(&[], 0, 0, &CheckoutRules::default()),
            Err(CheckoutError::EmptyCart)
        );
    }

    #[test]
    fn earns_one_point_per_hundred_rupees() {
        let rules = CheckoutRules::default();
        assert_eq!(points_earned(9_999, &rules), 0);
        assert_eq!(points_earned(25_000, &rules), 2);
        assert_eq!(points_earned(-5, &rules), 0);
    }
}
