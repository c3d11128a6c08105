use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{TransitionError, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReturnRequestType {
    Return,
    Refund,
    Replacement,
}

impl ReturnRequestType {
    pub const ALL: [ReturnRequestType; 3] = [Self::Return, Self::Refund, Self::Replacement];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Return => "return",
            Self::Refund => "refund",
            Self::Replacement => "replacement",
        }
    }

    /// Whether the buyer has to ship the item back before anything else happens.
    pub fn requires_item_back(&self) -> bool {
        matches!(self, Self::Return | Self::Replacement)
    }

    pub fn pays_out(&self) -> bool {
        matches!(self, Self::Return | Self::Refund)
    }
}

impl fmt::Display for ReturnRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnRequestType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("return request type", s))
    }
}

/// Lifecycle of a return, refund or replacement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Approved,
    ItemInTransit,
    ItemReceived,
    RefundInitiated,
    RefundProcessed,
    Completed,
    Rejected,
    Cancelled,
}

impl ReturnStatus {
    pub const ALL: [ReturnStatus; 9] = [
        Self::Pending,
        Self::Approved,
        Self::ItemInTransit,
        Self::ItemReceived,
        Self::RefundInitiated,
        Self::RefundProcessed,
        Self::Completed,
        Self::Rejected,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::ItemInTransit => "item_in_transit",
            Self::ItemReceived => "item_received",
            Self::RefundInitiated => "refund_initiated",
            Self::RefundProcessed => "refund_processed",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }

    /// An open request blocks another request for the same order.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    pub fn buyer_may_cancel(&self) -> bool {
        *self == Self::Pending
    }

    pub fn can_transition_to(&self, next: ReturnStatus, kind: ReturnRequestType) -> bool {
        use ReturnStatus::*;
        match (self, next) {
            (Pending, Approved | Rejected | Cancelled) => true,
            (Approved, ItemInTransit) => kind.requires_item_back(),
            (Approved, RefundInitiated) => kind == ReturnRequestType::Refund,
            (Approved, Cancelled) => true,
            (ItemInTransit, ItemReceived) => true,
            (ItemReceived, RefundInitiated) => kind == ReturnRequestType::Return,
            (ItemReceived, Completed) => kind == ReturnRequestType::Replacement,
            (RefundInitiated, RefundProcessed) => true,
            (RefundProcessed, Completed) => true,
            _ => false,
        }
    }

    pub fn transition(
        self,
        next: ReturnStatus,
        kind: ReturnRequestType,
    ) -> Result<ReturnStatus, TransitionError> {
        if self.can_transition_to(next, kind) {
            Ok(next)
        } else {
            Err(TransitionError::new(
                "return",
                self.as_str(),
                next.as_str(),
            ))
        }
    }

    /// Statuses an admin can pick next, used to populate the admin dropdown.
    pub fn next_options(&self, kind: ReturnRequestType) -> Vec<ReturnStatus> {
        Self::ALL
            .into_iter()
            .filter(|next| self.can_transition_to(*next, kind))
            .collect()
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("return status", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReturnRequestType as Kind;
    use ReturnStatus::*;

    fn walk(kind: Kind, path: &[ReturnStatus]) -> Result<ReturnStatus, TransitionError> {
        path.iter()
            .try_fold(Pending, |current, next| current.transition(*next, kind))
    }

    #[test]
    fn return_goes_through_pickup_and_refund() {
        let end = walk(
            Kind::Return,
            &[Approved, ItemInTransit, ItemReceived, RefundInitiated, RefundProcessed, Completed],
        )
        .unwrap();
        assert_eq!(end, Completed);
    }

    #[test]
    fn refund_skips_the_pickup() {
        let end = walk(Kind::Refund, &[Approved, RefundInitiated, RefundProcessed]).unwrap();
        assert_eq!(end, RefundProcessed);
        assert!(walk(Kind::Refund, &[Approved, ItemInTransit]).is_err());
    }

    #[test]
    fn replacement_completes_after_receipt_without_refund() {
        let end = walk(
            Kind::Replacement,
            &[Approved, ItemInTransit, ItemReceived, Completed],
        )
        .unwrap();
        assert_eq!(end, Completed);
        assert!(
            walk(Kind::Replacement, &[Approved, ItemInTransit, ItemReceived, RefundInitiated])
                .is_err()
        );
    }

    #[test]
    fn admin_cannot_jump_from_pending_to_refund() {
        let err = Pending.transition(RefundProcessed, Kind::Return).unwrap_err();
        assert_eq!(
            err.to_string(),
            "illegal return transition: pending -> refund_processed"
        );
    }

    #[test]
    fn terminal_requests_are_closed() {
        for status in [Completed, Rejected, Cancelled] {
            assert!(!status.is_open());
            for kind in Kind::ALL {
                assert!(status.next_options(kind).is_empty());
            }
        }
        assert!(RefundProcessed.is_open());
    }

    #[test]
    fn only_pending_requests_can_be_withdrawn() {
        assert!(Pending.buyer_may_cancel());
        assert!(!Approved.buyer_may_cancel());
    }

    #[test]
    fn next_options_follow_the_request_type() {
        assert_eq!(
            Approved.next_options(Kind::Refund),
            vec![RefundInitiated, Cancelled]
        );
        assert_eq!(
            Approved.next_options(Kind::Return),
            vec![ItemInTransit, Cancelled]
        );
    }

    #[test]
    fn round_trips_database_strings() {
        assert_eq!("item_in_transit".parse::<ReturnStatus>().unwrap(), ItemInTransit);
        assert_eq!("replacement".parse::<Kind>().unwrap(), Kind::Replacement);
        assert!("exchange".parse::<Kind>().is_err());
    }
}
