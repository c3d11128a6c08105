use anyhow::{Context, Result};
use diesel_async::RunQueryDsl;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::{
    events::{
        self, BulkOrderStatusChangedEvent, LedgerEntryRecordedEvent, OrderPlacedEvent,
        OrderStatusChangedEvent, PaymentCapturedEvent, PointsCreditedEvent, ReturnRequestedEvent,
        ReturnStatusChangedEvent,
    },
    models::CreateNotificationEntity,
    platform::app_state::AppState,
    schema::notifications,
};

pub const KIND_ORDER: &str = "order";
pub const KIND_PAYMENT: &str = "payment";
pub const KIND_RETURN: &str = "return";
pub const KIND_LEDGER: &str = "ledger";
pub const KIND_BULK_ORDER: &str = "bulk_order";
pub const KIND_REWARD: &str = "reward";

/// Routing keys the notification consumer subscribes to.
pub const ROUTING_KEYS: &[&str] = &[
    events::ORDER_PLACED,
    events::ORDER_STATUS_CHANGED,
    events::PAYMENT_CAPTURED,
    events::RETURN_REQUESTED,
    events::RETURN_STATUS_CHANGED,
    events::LEDGER_ENTRY_RECORDED,
    events::BULK_ORDER_STATUS_CHANGED,
    events::POINTS_CREDITED,
];

fn parse<T: DeserializeOwned>(event_type: &str, payload: &str) -> Result<T> {
    serde_json::from_str(payload).with_context(|| format!("Malformed {} payload", event_type))
}

fn rupees(paise: i64) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let paise = paise.unsigned_abs();
    format!("{}₹{}.{:02}", sign, paise / 100, paise % 100)
}

fn humanize(status: &str) -> String {
    status.replace('_', " ")
}

fn notification(
    user_id: i32,
    kind: &str,
    title: impl Into<String>,
    message: impl Into<String>,
    link: Option<String>,
) -> CreateNotificationEntity {
    CreateNotificationEntity {
        user_id,
        kind: kind.into(),
        title: title.into(),
        message: message.into(),
        link,
    }
}

/// Maps a domain event to the notifications it produces. Unknown event types
/// produce none.
pub fn notifications_for(event_type: &str, payload: &str) -> Result<Vec<CreateNotificationEntity>> {
    let rows = match event_type {
        events::ORDER_PLACED => {
            let event: OrderPlacedEvent = parse(event_type, payload)?;
            let mut rows = vec![notification(
                event.buyer_id,
                KIND_ORDER,
                "Order placed",
                format!(
                    "Your order {} for {} has been placed.",
                    event.order_number,
                    rupees(event.total)
                ),
                Some(format!("/orders/{}", event.order_id)),
            )];
            rows.extend(event.seller_ids.iter().map(|seller_id| {
                notification(
                    *seller_id,
                    KIND_ORDER,
                    "New order",
                    format!("Order {} includes your products.", event.order_number),
                    Some("/seller/orders".into()),
                )
            }));
            rows
        }
        events::ORDER_STATUS_CHANGED => {
            let event: OrderStatusChangedEvent = parse(event_type, payload)?;
            vec![notification(
                event.buyer_id,
                KIND_ORDER,
                format!("Order {}", humanize(&event.to)),
                format!("Order {} is now {}.", event.order_number, humanize(&event.to)),
                Some(format!("/orders/{}", event.order_id)),
            )]
        }
        events::PAYMENT_CAPTURED => {
            let event: PaymentCapturedEvent = parse(event_type, payload)?;
            vec![notification(
                event.buyer_id,
                KIND_PAYMENT,
                "Payment received",
                format!(
                    "We received {} for order {}.",
                    rupees(event.amount),
                    event.order_number
                ),
                Some(format!("/orders/{}", event.order_id)),
            )]
        }
        events::RETURN_REQUESTED => {
            let event: ReturnRequestedEvent = parse(event_type, payload)?;
            vec![notification(
                event.buyer_id,
                KIND_RETURN,
                "Request received",
                format!(
                    "Your {} request #{} is awaiting review.",
                    event.request_type, event.return_id
                ),
                Some(format!("/returns/{}", event.return_id)),
            )]
        }
        events::RETURN_STATUS_CHANGED => {
            let event: ReturnStatusChangedEvent = parse(event_type, payload)?;
            vec![notification(
                event.buyer_id,
                KIND_RETURN,
                format!("Request {}", humanize(&event.to)),
                format!(
                    "Your {} request #{} moved from {} to {}.",
                    event.request_type,
                    event.return_id,
                    humanize(&event.from),
                    humanize(&event.to)
                ),
                Some(format!("/returns/{}", event.return_id)),
            )]
        }
        events::LEDGER_ENTRY_RECORDED => {
            let event: LedgerEntryRecordedEvent = parse(event_type, payload)?;
            let title = if event.entry_type == "payment" {
                "Payment recorded"
            } else {
                "Order charged"
            };
            vec![notification(
                event.distributor_user_id,
                KIND_LEDGER,
                title,
                format!(
                    "{} {} recorded. Outstanding balance: {}.",
                    event.entry_type,
                    rupees(event.amount),
                    rupees(event.balance_after)
                ),
                Some("/distributor/ledger".into()),
            )]
        }
        events::BULK_ORDER_STATUS_CHANGED => {
            let event: BulkOrderStatusChangedEvent = parse(event_type, payload)?;
            vec![notification(
                event.distributor_user_id,
                KIND_BULK_ORDER,
                format!("Bulk order {}", humanize(&event.to)),
                format!(
                    "Bulk order {} is now {}.",
                    event.order_number,
                    humanize(&event.to)
                ),
                Some(format!("/distributor/bulk-orders/{}", event.bulk_order_id)),
            )]
        }
        events::POINTS_CREDITED => {
            let event: PointsCreditedEvent = parse(event_type, payload)?;
            vec![notification(
                event.user_id,
                KIND_REWARD,
                "Points earned",
                format!(
                    "{} points added for order #{}. Balance: {}.",
                    event.points, event.order_id, event.balance_after
                ),
                Some("/rewards".into()),
            )]
        }
        other => {
            debug!(event_type = other, "No notifications for event");
            Vec::new()
        }
    };

    Ok(rows)
}

/// Persists the notifications for one event.
pub async fn handle_event(state: &AppState, event_type: &str, payload: &str) -> Result<usize> {
    let rows = notifications_for(event_type, payload)?;
    if rows.is_empty() {
        return Ok(0);
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let inserted = diesel::insert_into(notifications::table)
        .values(&rows)
        .execute(conn)
        .await
        .context("Failed to insert notifications")?;

    info!(event_type, inserted, "Stored notifications");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_placed_notifies_buyer_and_each_seller() {
        let payload = json!({
            "order_id": 7,
            "order_number": "ORD1A2B3C4D",
            "buyer_id": 10,
            "seller_ids": [20, 21],
            "total": 129_950
        })
        .to_string();

        let rows = notifications_for(events::ORDER_PLACED, &payload).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].user_id, 10);
        assert!(rows[0].message.contains("₹1299.50"));
        assert_eq!(
            rows.iter().skip(1).map(|r| r.user_id).collect::<Vec<_>>(),
            vec![20, 21]
        );
    }

    #[test]
    fn return_status_change_targets_buyer() {
        let payload = json!({
            "return_id": 3,
            "order_id": 7,
            "buyer_id": 10,
            "request_type": "refund",
            "from": "approved",
            "to": "refund_initiated"
        })
        .to_string();

        let rows = notifications_for(events::RETURN_STATUS_CHANGED, &payload).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, KIND_RETURN);
        assert_eq!(rows[0].title, "Request refund initiated");
        assert_eq!(rows[0].link.as_deref(), Some("/returns/3"));
    }

    #[test]
    fn ledger_payment_reports_balance() {
        let payload = json!({
            "entry_id": 1,
            "distributor_id": 2,
            "distributor_user_id": 30,
            "entry_type": "payment",
            "amount": 50_000,
            "balance_after": 25_000
        })
        .to_string();

        let rows = notifications_for(events::LEDGER_ENTRY_RECORDED, &payload).unwrap();
        assert_eq!(rows[0].user_id, 30);
        assert_eq!(rows[0].title, "Payment recorded");
        assert!(rows[0].message.ends_with("₹250.00."));
    }

    #[test]
    fn unknown_events_are_ignored() {
        assert!(notifications_for("inventory.synced", "{}").unwrap().is_empty());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(notifications_for(events::PAYMENT_CAPTURED, "{\"order_id\":1}").is_err());
    }

    #[test]
    fn formats_negative_rupees() {
        assert_eq!(rupees(-5), "-₹0.05");
    }
}
