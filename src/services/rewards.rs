use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper, sql_types::BigInt};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{
    models::{CreateRewardTransactionEntity, RewardTransactionEntity},
    platform::app_error::AppError,
    schema::reward_transactions,
};

pub const REASON_ORDER_DELIVERED: &str = "order_delivered";
pub const REASON_REDEEMED: &str = "redeemed";
pub const REASON_REDEMPTION_REVERSED: &str = "redemption_reversed";

// Namespace for advisory locks on reward accounts.
const LOCK_NAMESPACE: i64 = 0x5245_5744 << 32;

/// Serializes reward writes for `user_id` until the transaction ends.
pub async fn lock_account(conn: &mut AsyncPgConnection, user_id: i32) -> Result<(), AppError> {
    diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
        .bind::<BigInt, _>(LOCK_NAMESPACE | i64::from(user_id))
        .execute(conn)
        .await
        .context("Failed to lock reward account")?;
    Ok(())
}

pub async fn balance(conn: &mut AsyncPgConnection, user_id: i32) -> Result<i64, AppError> {
    let balance = reward_transactions::table
        .filter(reward_transactions::user_id.eq(user_id))
        .order_by(reward_transactions::id.desc())
        .select(reward_transactions::balance_after)
        .first::<i64>(conn)
        .await
        .optional()
        .context("Failed to read reward balance")?;

    Ok(balance.unwrap_or(0))
}

/// Appends a signed points movement. The balance never goes negative.
pub async fn append(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    points: i64,
    reason: &str,
    order_id: Option<i32>,
) -> Result<RewardTransactionEntity, AppError> {
    lock_account(conn, user_id).await?;
    let previous = balance(conn, user_id).await?;
    let balance_after = previous
        .checked_add(points)
        .filter(|balance| *balance >= 0)
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "cannot apply {} points to a balance of {}",
                points, previous
            ))
        })?;

    let transaction = diesel::insert_into(reward_transactions::table)
        .values(CreateRewardTransactionEntity {
            user_id,
            points,
            balance_after,
            reason: reason.into(),
            order_id,
        })
        .returning(RewardTransactionEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to append reward transaction")?;

    Ok(transaction)
}
