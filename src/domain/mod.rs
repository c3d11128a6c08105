//! Business rules that do not touch the database.

pub mod bulk_pricing;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod ledger;
pub mod order_status;
pub mod return_status;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("illegal {entity} transition: {from} -> {to}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

impl TransitionError {
    pub fn new(entity: &'static str, from: &'static str, to: &'static str) -> Self {
        Self { entity, from, to }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
