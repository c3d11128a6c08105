//! Domain events written to the outbox and consumed asynchronously.

use serde::{Deserialize, Serialize};

pub const ORDER_PLACED: &str = "order.placed";
pub const ORDER_STATUS_CHANGED: &str = "order.status_changed";
pub const PAYMENT_CAPTURED: &str = "payment.captured";
pub const RETURN_REQUESTED: &str = "return.requested";
pub const RETURN_STATUS_CHANGED: &str = "return.status_changed";
pub const LEDGER_ENTRY_RECORDED: &str = "ledger.entry_recorded";
pub const BULK_ORDER_STATUS_CHANGED: &str = "bulk_order.status_changed";
pub const POINTS_CREDITED: &str = "rewards.points_credited";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderPlacedEvent {
    pub order_id: i32,
    pub order_number: String,
    pub buyer_id: i32,
    pub seller_ids: Vec<i32>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderStatusChangedEvent {
    pub order_id: i32,
    pub order_number: String,
    pub buyer_id: i32,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentCapturedEvent {
    pub order_id: i32,
    pub order_number: String,
    pub buyer_id: i32,
    pub amount: i64,
    pub provider_payment_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnRequestedEvent {
    pub return_id: i32,
    pub order_id: i32,
    pub buyer_id: i32,
    pub request_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnStatusChangedEvent {
    pub return_id: i32,
    pub order_id: i32,
    pub buyer_id: i32,
    pub request_type: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntryRecordedEvent {
    pub entry_id: i32,
    pub distributor_id: i32,
    pub distributor_user_id: i32,
    pub entry_type: String,
    pub amount: i64,
    pub balance_after: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BulkOrderStatusChangedEvent {
    pub bulk_order_id: i32,
    pub order_number: String,
    pub distributor_user_id: i32,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointsCreditedEvent {
    pub user_id: i32,
    pub order_id: i32,
    pub points: i64,
    pub balance_after: i64,
}
