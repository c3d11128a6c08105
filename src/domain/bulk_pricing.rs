//! Pricing of distributor bulk orders.
//!
//! A product opts into bulk ordering through its [`BulkItemConfig`]. Lines are
//! ordered either by the piece or by the set, where a set is a fixed number of
//! pieces.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::{TransitionError, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BulkOrderType {
    Piece,
    Set,
}

impl BulkOrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Piece => "piece",
            Self::Set => "set",
        }
    }
}

impl fmt::Display for BulkOrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkOrderType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "piece" => Ok(Self::Piece),
            "set" => Ok(Self::Set),
            other => Err(UnknownVariant::new("bulk order type", other)),
        }
    }
}

/// Lifecycle of a bulk order. Confirmation charges the distributor's ledger,
/// so a confirmed order can no longer be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BulkOrderStatus {
    Pending,
    Confirmed,
    Dispatched,
    Delivered,
    Cancelled,
}

impl BulkOrderStatus {
    pub const ALL: [BulkOrderStatus; 5] = [
        Self::Pending,
        Self::Confirmed,
        Self::Dispatched,
        Self::Delivered,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Dispatched => "dispatched",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: BulkOrderStatus) -> bool {
        use BulkOrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed | Cancelled) | (Confirmed, Dispatched) | (Dispatched, Delivered)
        )
    }

    pub fn transition(self, next: BulkOrderStatus) -> Result<BulkOrderStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::new("bulk order", self.as_str(), next.as_str()))
        }
    }

    /// Moving into this status appends the ledger order entry.
    pub fn charges_ledger(next: BulkOrderStatus) -> bool {
        next == Self::Confirmed
    }
}

impl fmt::Display for BulkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkOrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("bulk order status", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkItemConfig {
    pub allow_pieces: bool,
    pub allow_sets: bool,
    pub pieces_per_set: i32,
    pub piece_price: i64,
    pub set_price: Option<i64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BulkPricingError {
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),
    #[error("product cannot be ordered by the {0}")]
    OrderTypeNotAllowed(BulkOrderType),
    #[error("pieces per set must be at least 1, got {0}")]
    InvalidSetSize(i32),
    #[error("bulk order has no lines")]
    Empty,
    #[error("bulk order amount overflow")]
    Overflow,
}

impl BulkItemConfig {
    pub fn validate(&self) -> Result<(), BulkPricingError> {
        if self.pieces_per_set < 1 {
            return Err(BulkPricingError::InvalidSetSize(self.pieces_per_set));
        }
        Ok(())
    }

    pub fn allows(&self, order_type: BulkOrderType) -> bool {
        match order_type {
            BulkOrderType::Piece => self.allow_pieces,
            BulkOrderType::Set => self.allow_sets,
        }
    }

    pub fn unit_price(&self, order_type: BulkOrderType) -> Result<i64, BulkPricingError> {
        match order_type {
            BulkOrderType::Piece => Ok(self.piece_price),
            BulkOrderType::Set => match self.set_price {
                Some(price) => Ok(price),
                None => self
                    .piece_price
                    .checked_mul(i64::from(self.pieces_per_set))
                    .ok_or(BulkPricingError::Overflow),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub order_type: BulkOrderType,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
    /// Quantity expressed in pieces.
    pub pieces: i64,
}

pub fn price_line(
    config: &BulkItemConfig,
    order_type: BulkOrderType,
    quantity: i32,
) -> Result<PricedLine, BulkPricingError> {
    config.validate()?;
    if quantity <= 0 {
        return Err(BulkPricingError::InvalidQuantity(quantity));
    }
    if !config.allows(order_type) {
        return Err(BulkPricingError::OrderTypeNotAllowed(order_type));
    }

    let unit_price = config.unit_price(order_type)?;
    let total_price = unit_price
        .checked_mul(i64::from(quantity))
        .ok_or(BulkPricingError::Overflow)?;
    let pieces = match order_type {
        BulkOrderType::Piece => i64::from(quantity),
        BulkOrderType::Set => i64::from(quantity) * i64::from(config.pieces_per_set),
    };

    Ok(PricedLine {
        order_type,
        quantity,
        unit_price,
        total_price,
        pieces,
    })
}

pub fn order_total(lines: &[PricedLine]) -> Result<i64, BulkPricingError> {
    if lines.is_empty() {
        return Err(BulkPricingError::Empty);
    }
    lines.iter().try_fold(0i64, |acc, line| {
        acc.checked_add(line.total_price)
            .ok_or(BulkPricingError::Overflow)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BulkItemConfig {
        BulkItemConfig {
            allow_pieces: true,
            allow_sets: true,
            pieces_per_set: 12,
            piece_price: 4_500,
            set_price: None,
        }
    }

    #[test]
    fn prices_pieces_at_piece_price() {
        let line = price_line(&config(), BulkOrderType::Piece, 5).unwrap();
        assert_eq!(line.unit_price, 4_500);
        assert_eq!(line.total_price, 22_500);
        assert_eq!(line.pieces, 5);
    }

    #[test]
    fn derives_set_price_from_pieces_per_set() {
        let line = price_line(&config(), BulkOrderType::Set, 2).unwrap();
        assert_eq!(line.unit_price, 54_000);
        assert_eq!(line.total_price, 108_000);
        assert_eq!(line.pieces, 24);
    }

    #[test]
    fn explicit_set_price_wins() {
        let config = BulkItemConfig {
            set_price: Some(50_000),
            ..config()
        };
        let line = price_line(&config, BulkOrderType::Set, 3).unwrap();
        assert_eq!(line.total_price, 150_000);
    }

    #[test]
    fn rejects_disallowed_order_type() {
        let config = BulkItemConfig {
            allow_pieces: false,
            ..config()
        };
        assert_eq!(
            price_line(&config, BulkOrderType::Piece, 1),
            Err(BulkPricingError::OrderTypeNotAllowed(BulkOrderType::Piece))
        );
    }

    #[test]
    fn rejects_bad_quantities_and_set_sizes() {
        assert_eq!(
            price_line(&config(), BulkOrderType::Piece, 0),
            Err(BulkPricingError::InvalidQuantity(0))
        );
        let config = BulkItemConfig {
            pieces_per_set: 0,
            ..config()
        };
        assert_eq!(
            price_line(&config, BulkOrderType::Set, 1),
            Err(BulkPricingError::InvalidSetSize(0))
        );
    }

    #[test]
    fn totals_lines() {
        let lines = [
            price_line(&config(), BulkOrderType::Piece, 5).unwrap(),
            price_line(&config(), BulkOrderType::Set, 2).unwrap(),
        ];
        assert_eq!(order_total(&lines).unwrap(), 130_500);
        assert_eq!(order_total(&[]), Err(BulkPricingError::Empty));
    }

    #[test]
    fn bulk_order_cannot_be_cancelled_after_confirmation() {
        assert!(BulkOrderStatus::Pending.can_transition_to(BulkOrderStatus::Cancelled));
        assert!(
            BulkOrderStatus::Confirmed
                .transition(BulkOrderStatus::Cancelled)
                .is_err()
        );
        assert!(BulkOrderStatus::charges_ledger(BulkOrderStatus::Confirmed));
        assert_eq!(
            "dispatched".parse::<BulkOrderStatus>().unwrap(),
            BulkOrderStatus::Dispatched
        );
    }
}
