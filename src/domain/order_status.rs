use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::TransitionError;

/// Lifecycle of a buyer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        Self::Pending,
        Self::Confirmed,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
        )
    }

    pub fn transition(self, next: OrderStatus) -> Result<OrderStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::new("order", self.as_str(), next.as_str()))
        }
    }

    /// Buyers may cancel until the order starts being packed.
    pub fn buyer_may_cancel(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// Sellers only drive fulfilment; confirmation and delivery belong to
    /// payments and admins.
    pub fn seller_may_set(next: OrderStatus) -> bool {
        matches!(next, Self::Processing | Self::Shipped)
    }

    /// Moving into `next` returns reserved stock to the variants.
    pub fn releases_stock(next: OrderStatus) -> bool {
        next == Self::Cancelled
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = super::UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| super::UnknownVariant::new("order status", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_to_delivered() {
        let status = OrderStatus::Pending
            .transition(OrderStatus::Confirmed)
            .and_then(|s| s.transition(OrderStatus::Processing))
            .and_then(|s| s.transition(OrderStatus::Shipped))
            .and_then(|s| s.transition(OrderStatus::Delivered))
            .unwrap();

        assert_eq!(status, OrderStatus::Delivered);
        assert!(status.is_terminal());
    }

    #[test]
    fn rejects_skipping_fulfilment() {
        let err = OrderStatus::Confirmed
            .transition(OrderStatus::Delivered)
            .unwrap_err();
        assert_eq!(err.to_string(), "illegal order transition: confirmed -> delivered");
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for next in OrderStatus::ALL {
            assert!(!OrderStatus::Delivered.can_transition_to(next));
            assert!(!OrderStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn same_status_is_not_a_transition() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn shipped_orders_cannot_be_cancelled() {
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Shipped.buyer_may_cancel());
        assert!(OrderStatus::Confirmed.buyer_may_cancel());
    }

    #[test]
    fn sellers_are_limited_to_fulfilment_steps() {
        assert!(OrderStatus::seller_may_set(OrderStatus::Processing));
        assert!(OrderStatus::seller_may_set(OrderStatus::Shipped));
        assert!(!OrderStatus::seller_may_set(OrderStatus::Delivered));
        assert!(!OrderStatus::seller_may_set(OrderStatus::Cancelled));
    }

    #[test]
    fn parses_database_strings() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("PAID".parse::<OrderStatus>().is_err());
    }
}
