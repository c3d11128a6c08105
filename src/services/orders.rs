use std::collections::HashMap;

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::info;

use crate::{
    domain::{
        checkout::{self, CheckoutRules},
        order_status::OrderStatus,
    },
    events::{self, OrderStatusChangedEvent, PointsCreditedEvent},
    models::{OrderEntity, OrderItemEntity},
    platform::{app_error::AppError, outbox},
    schema::{order_items, orders, payments, product_variants},
    services::rewards,
};

pub const PAYMENT_PENDING: &str = "pending";
pub const PAYMENT_PAID: &str = "paid";
pub const PAYMENT_FAILED: &str = "failed";
pub const PAYMENT_REFUND_PENDING: &str = "refund_pending";

pub async fn load_items(
    conn: &mut AsyncPgConnection,
    order_ids: &[i32],
) -> Result<HashMap<i32, Vec<OrderItemEntity>>, AppError> {
    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(order_ids))
        .order_by(order_items::id.asc())
        .select(OrderItemEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let mut grouped: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        grouped.entry(item.order_id).or_default().push(item);
    }
    Ok(grouped)
}

async fn restock(conn: &mut AsyncPgConnection, order_id: i32) -> Result<(), AppError> {
    let items: Vec<(i32, i32)> = order_items::table
        .filter(order_items::order_id.eq(order_id))
        .select((order_items::variant_id, order_items::quantity))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    for (variant_id, quantity) in items {
        diesel::update(product_variants::table.find(variant_id))
            .set((
                product_variants::stock.eq(product_variants::stock + quantity),
                product_variants::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .await
            .context("Failed to restock variant")?;
    }
    Ok(())
}

/// Moves `order` to `next`, applying the side effects of the new status:
/// cancellation restocks and returns redeemed points, delivery credits
/// earned points.
///
/// The update is conditional on the status the caller read, so a concurrent
/// change surfaces as a conflict.
pub async fn change_status(
    conn: &mut AsyncPgConnection,
    order: &OrderEntity,
    next: OrderStatus,
    rules: &CheckoutRules,
) -> Result<OrderEntity, AppError> {
    let current: OrderStatus = order.status.parse()?;
    current.transition(next)?;

    let updated: OrderEntity = diesel::update(orders::table.find(order.id))
        .filter(orders::status.eq(current.as_str()))
        .set((
            orders::status.eq(next.as_str()),
            orders::updated_at.eq(diesel::dsl::now),
        ))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await
        .optional()
        .context("Failed to update order status")?
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "order {} was modified concurrently",
                order.order_number
            ))
        })?;

    if OrderStatus::releases_stock(next) {
        restock(conn, order.id).await?;

        if order.points_redeemed > 0 {
            rewards::append(
                conn,
                order.buyer_id,
                order.points_redeemed,
                rewards::REASON_REDEMPTION_REVERSED,
                Some(order.id),
            )
            .await?;
        }

        diesel::update(payments::table)
            .filter(payments::order_id.eq(order.id))
            .filter(payments::status.eq(PAYMENT_PAID))
            .set((
                payments::status.eq(PAYMENT_REFUND_PENDING),
                payments::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .await
            .context("Failed to flag payment for refund")?;
    }

    if next == OrderStatus::Delivered {
        let points = checkout::points_earned(order.total, rules);
        if points > 0 {
            let credited = rewards::append(
                conn,
                order.buyer_id,
                points,
                rewards::REASON_ORDER_DELIVERED,
                Some(order.id),
            )
            .await?;

            outbox::publish(
                conn,
                events::POINTS_CREDITED.into(),
                PointsCreditedEvent {
                    user_id: order.buyer_id,
                    order_id: order.id,
                    points,
                    balance_after: credited.balance_after,
                },
            )
            .await?;
        }
    }

    outbox::publish(
        conn,
        events::ORDER_STATUS_CHANGED.into(),
        OrderStatusChangedEvent {
            order_id: order.id,
            order_number: order.order_number.clone(),
            buyer_id: order.buyer_id,
            from: current.as_str().into(),
            to: next.as_str().into(),
        },
    )
    .await?;

    info!(order_id = order.id, from = %current, to = %next, "Order status changed");
    Ok(updated)
}
