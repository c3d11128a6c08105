//! Distributor ledger arithmetic.
//!
//! Amounts are paise. Order entries increase what the distributor owes,
//! payment entries decrease it, so `current_balance = total_ordered - total_paid`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    Order,
    Payment,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Payment => "payment",
        }
    }
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerEntryType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(Self::Order),
            "payment" => Ok(Self::Payment),
            other => Err(UnknownVariant::new("ledger entry type", other)),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger amount must be positive, got {0}")]
    NonPositiveAmount(i64),
    #[error("ledger balance overflow")]
    Overflow,
    #[error("credit limit of {limit} paise exceeded: balance would be {balance}")]
    CreditLimitExceeded { limit: i64, balance: i64 },
}

/// The signed amount stored on the entry.
pub fn signed_amount(entry_type: LedgerEntryType, amount: i64) -> Result<i64, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    Ok(match entry_type {
        LedgerEntryType::Order => amount,
        LedgerEntryType::Payment => -amount,
    })
}

/// `balance_after` for a new entry appended after `previous`.
pub fn next_balance(
    previous: i64,
    entry_type: LedgerEntryType,
    amount: i64,
) -> Result<i64, LedgerError> {
    previous
        .checked_add(signed_amount(entry_type, amount)?)
        .ok_or(LedgerError::Overflow)
}

/// A non-positive limit means the distributor has no credit cap.
pub fn check_credit_limit(credit_limit: i64, balance_after: i64) -> Result<(), LedgerError> {
    if credit_limit > 0 && balance_after > credit_limit {
        return Err(LedgerError::CreditLimitExceeded {
            limit: credit_limit,
            balance: balance_after,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct LedgerSummary {
    pub total_ordered: i64,
    pub total_paid: i64,
    pub current_balance: i64,
    pub entry_count: i64,
}

impl LedgerSummary {
    /// Folds signed entry amounts into totals.
    pub fn from_amounts<I>(amounts: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let mut summary = amounts
            .into_iter()
            .fold(Self::default(), |mut acc, amount| {
                if amount >= 0 {
                    acc.total_ordered += amount;
                } else {
                    acc.total_paid += -amount;
                }
                acc.entry_count += 1;
                acc
            });
        summary.current_balance = summary.total_ordered - summary.total_paid;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_decreases_balance_by_amount() {
        let after_order = next_balance(0, LedgerEntryType::Order, 50_000).unwrap();
        let after_payment = next_balance(after_order, LedgerEntryType::Payment, 20_000).unwrap();

        assert_eq!(after_order, 50_000);
        assert_eq!(after_payment, 30_000);
    }

    #[test]
    fn overpayment_leaves_a_credit() {
        assert_eq!(
            next_balance(10_000, LedgerEntryType::Payment, 15_000).unwrap(),
            -5_000
        );
    }

    #[test]
    fn rejects_zero_and_negative_amounts() {
        assert_eq!(
            signed_amount(LedgerEntryType::Payment, 0),
            Err(LedgerError::NonPositiveAmount(0))
        );
        assert_eq!(
            next_balance(0, LedgerEntryType::Order, -1),
            Err(LedgerError::NonPositiveAmount(-1))
        );
    }

    #[test]
    fn detects_overflow() {
        assert_eq!(
            next_balance(i64::MAX, LedgerEntryType::Order, 1),
            Err(LedgerError::Overflow)
        );
    }

    #[test]
    fn summary_matches_running_balance() {
        let entries = [
            (LedgerEntryType::Order, 120_000),
            (LedgerEntryType::Payment, 50_000),
            (LedgerEntryType::Order, 30_000),
            (LedgerEntryType::Payment, 25_000),
        ];

        let mut balance = 0;
        let mut signed = Vec::new();
        for (kind, amount) in entries {
            balance = next_balance(balance, kind, amount).unwrap();
            signed.push(signed_amount(kind, amount).unwrap());
        }

        let summary = LedgerSummary::from_amounts(signed);
        assert_eq!(summary.total_ordered, 150_000);
        assert_eq!(summary.total_paid, 75_000);
        assert_eq!(summary.current_balance, balance);
        assert_eq!(summary.entry_count, 4);
    }

    #[test]
    fn credit_limit_only_applies_when_set() {
        assert!(check_credit_limit(0, 1_000_000).is_ok());
        assert!(check_credit_limit(100_000, 100_000).is_ok());
        assert_eq!(
            check_credit_limit(100_000, 100_001),
            Err(LedgerError::CreditLimitExceeded {
                limit: 100_000,
                balance: 100_001
            })
        );
    }
}
