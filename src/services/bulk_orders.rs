use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::info;

use crate::{
    domain::{bulk_pricing::BulkOrderStatus, ledger::LedgerEntryType},
    events::{self, BulkOrderStatusChangedEvent},
    models::{BulkOrderEntity, DistributorEntity},
    platform::{app_error::AppError, outbox},
    schema::{bulk_orders, distributors},
    services::ledger::{self, NewLedgerEntry},
};

pub async fn distributor_for_user(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> Result<DistributorEntity, AppError> {
    distributors::table
        .filter(distributors::user_id.eq(user_id))
        .select(DistributorEntity::as_select())
        .first(conn)
        .await
        .optional()
        .context("Failed to get distributor")?
        .ok_or_else(|| {
            AppError::ForbiddenResource("no distributor profile for this account".into())
        })
}

/// Moves a bulk order to `next`. Confirmation charges the order total to the
/// distributor's ledger, subject to the credit limit.
pub async fn change_status(
    conn: &mut AsyncPgConnection,
    order: &BulkOrderEntity,
    next: BulkOrderStatus,
) -> Result<BulkOrderEntity, AppError> {
    let current: BulkOrderStatus = order.status.parse()?;
    current.transition(next)?;

    if BulkOrderStatus::charges_ledger(next) {
        ledger::append_entry(
            conn,
            order.distributor_id,
            NewLedgerEntry {
                entry_type: LedgerEntryType::Order,
                amount: order.total_amount,
                payment_method: None,
                reference: Some(order.order_number.clone()),
                note: Some(format!("Bulk order {}", order.order_number)),
            },
        )
        .await?;
    }

    let updated: BulkOrderEntity = diesel::update(bulk_orders::table.find(order.id))
        .filter(bulk_orders::status.eq(current.as_str()))
        .set((
            bulk_orders::status.eq(next.as_str()),
            bulk_orders::updated_at.eq(diesel::dsl::now),
        ))
        .returning(BulkOrderEntity::as_returning())
        .get_result(conn)
        .await
        .optional()
        .context("Failed to update bulk order status")?
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "bulk order {} was modified concurrently",
                order.order_number
            ))
        })?;

    let distributor_user_id: i32 = distributors::table
        .find(order.distributor_id)
        .select(distributors::user_id)
        .first(conn)
        .await
        .context("Failed to get distributor")?;

    outbox::publish(
        conn,
        events::BULK_ORDER_STATUS_CHANGED.into(),
        BulkOrderStatusChangedEvent {
            bulk_order_id: order.id,
            order_number: order.order_number.clone(),
            distributor_user_id,
            from: current.as_str().into(),
            to: next.as_str().into(),
        },
    )
    .await?;

    info!(bulk_order_id = order.id, from = %current, to = %next, "Bulk order status changed");
    Ok(updated)
}
