use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::info;

use crate::{
    domain::return_status::{ReturnRequestType, ReturnStatus},
    events::{self, ReturnStatusChangedEvent},
    models::{CreateReturnStatusHistoryEntity, ReturnRequestEntity},
    platform::{app_error::AppError, outbox},
    schema::{orders, return_requests, return_status_history},
};

#[derive(Debug, Default)]
pub struct TransitionDetails {
    pub note: Option<String>,
    pub refund_amount: Option<i64>,
}

/// Statuses that no longer block a new request for the same order.
pub fn closed_statuses() -> Vec<&'static str> {
    ReturnStatus::ALL
        .into_iter()
        .filter(|status| !status.is_open())
        .map(|status| status.as_str())
        .collect()
}

/// Whether a request in `status` has committed money back to the buyer.
pub fn holds_refund(status: ReturnStatus) -> bool {
    matches!(
        status,
        ReturnStatus::RefundInitiated | ReturnStatus::RefundProcessed | ReturnStatus::Completed
    )
}

/// Refund for one request. Earlier refunds on the same order count against
/// `order_total`, and a missing amount means everything still refundable.
pub fn resolve_refund(
    requested: Option<i64>,
    order_total: i64,
    already_refunded: i64,
) -> Result<i64, AppError> {
    let remaining = order_total.saturating_sub(already_refunded);
    if remaining <= 0 {
        return Err(AppError::Conflict(
            "order has already been fully refunded".into(),
        ));
    }

    match requested {
        Some(amount) if amount <= 0 || amount > remaining => Err(AppError::BadRequest(format!(
            "refund amount must be between 1 and {}",
            remaining
        ))),
        Some(amount) => Ok(amount),
        None => Ok(remaining),
    }
}

/// Sum refunded or being refunded on `order_id` by requests other than `excluding`.
pub async fn refunded_so_far(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    excluding: Option<i32>,
) -> Result<i64, AppError> {
    let holding: Vec<&'static str> = ReturnStatus::ALL
        .into_iter()
        .filter(|status| holds_refund(*status))
        .map(|status| status.as_str())
        .collect();

    let mut query = return_requests::table
        .filter(return_requests::order_id.eq(order_id))
        .filter(return_requests::status.eq_any(holding))
        .select(return_requests::refund_amount)
        .into_boxed();
    if let Some(id) = excluding {
        query = query.filter(return_requests::id.ne(id));
    }

    let amounts: Vec<Option<i64>> = query
        .get_results(conn)
        .await
        .context("Failed to get earlier refunds")?;

    Ok(amounts.into_iter().flatten().sum())
}

/// Applies a guarded transition and records it in the status history.
pub async fn transition(
    conn: &mut AsyncPgConnection,
    request: &ReturnRequestEntity,
    next: ReturnStatus,
    actor_id: i32,
    details: TransitionDetails,
) -> Result<ReturnRequestEntity, AppError> {
    let kind: ReturnRequestType = request.request_type.parse()?;
    let current: ReturnStatus = request.status.parse()?;
    current.transition(next, kind)?;

    let mut refund_amount = details.refund_amount.or(request.refund_amount);
    if next == ReturnStatus::RefundInitiated || details.refund_amount.is_some() {
        let order_total: i64 = orders::table
            .find(request.order_id)
            .select(orders::total)
            .first(conn)
            .await
            .context("Failed to get order total")?;
        let already_refunded = refunded_so_far(conn, request.order_id, Some(request.id)).await?;

        refund_amount = Some(resolve_refund(refund_amount, order_total, already_refunded)?);
    }

    let updated: ReturnRequestEntity = diesel::update(return_requests::table.find(request.id))
        .filter(return_requests::status.eq(current.as_str()))
        .set((
            return_requests::status.eq(next.as_str()),
            return_requests::admin_note.eq(details.note.clone().or(request.admin_note.clone())),
            return_requests::refund_amount.eq(refund_amount),
            return_requests::updated_at.eq(diesel::dsl::now),
        ))
        .returning(ReturnRequestEntity::as_returning())
        .get_result(conn)
        .await
        .optional()
        .context("Failed to update return request")?
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "return request {} was modified concurrently",
                request.id
            ))
        })?;

    diesel::insert_into(return_status_history::table)
        .values(CreateReturnStatusHistoryEntity {
            return_id: request.id,
            from_status: current.as_str().into(),
            to_status: next.as_str().into(),
            actor_id,
            note: details.note,
        })
        .execute(conn)
        .await
        .context("Failed to record return history")?;

    outbox::publish(
        conn,
        events::RETURN_STATUS_CHANGED.into(),
        ReturnStatusChangedEvent {
            return_id: request.id,
            order_id: request.order_id,
            buyer_id: request.buyer_id,
            request_type: kind.as_str().into(),
            from: current.as_str().into(),
            to: next.as_str().into(),
        },
    )
    .await?;

    info!(
        return_id = request.id,
        from = %current,
        to = %next,
        actor_id,
        "Return request transitioned"
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_statuses_are_the_terminal_ones() {
        let closed = closed_statuses();
        assert_eq!(closed.len(), 3);
        assert!(closed.contains(&"completed"));
        assert!(closed.contains(&"rejected"));
        assert!(closed.contains(&"cancelled"));
        assert!(!closed.contains(&"refund_processed"));
    }

    #[test]
    fn refunds_are_capped_across_requests() {
        assert_eq!(resolve_refund(None, 50_000, 0).unwrap(), 50_000);
        assert_eq!(resolve_refund(None, 50_000, 20_000).unwrap(), 30_000);
        assert_eq!(resolve_refund(Some(30_000), 50_000, 20_000).unwrap(), 30_000);

        let over = resolve_refund(Some(30_001), 50_000, 20_000).unwrap_err();
        assert!(matches!(over, AppError::BadRequest(_)));
        assert!(matches!(
            resolve_refund(Some(0), 50_000, 0),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn fully_refunded_order_cannot_be_refunded_again() {
        assert!(matches!(
            resolve_refund(None, 50_000, 50_000),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            resolve_refund(Some(1), 50_000, 50_000),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn only_refund_stages_hold_money() {
        assert!(holds_refund(ReturnStatus::RefundInitiated));
        assert!(holds_refund(ReturnStatus::Completed));
        assert!(!holds_refund(ReturnStatus::Approved));
        assert!(!holds_refund(ReturnStatus::Rejected));
    }
}
