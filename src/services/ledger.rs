use std::collections::HashMap;

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::info;

use crate::{
    domain::ledger::{self, LedgerEntryType, LedgerSummary},
    events::{self, LedgerEntryRecordedEvent},
    models::{CreateLedgerEntryEntity, DistributorEntity, LedgerEntryEntity},
    platform::{app_error::AppError, outbox},
    schema::{distributor_ledger, distributors},
};

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub entry_type: LedgerEntryType,
    /// Unsigned paise; the sign comes from `entry_type`.
    pub amount: i64,
    pub payment_method: Option<String>,
    pub reference: Option<String>,
    pub note: Option<String>,
}

pub async fn current_balance(
    conn: &mut AsyncPgConnection,
    distributor_id: i32,
) -> Result<i64, AppError> {
    let balance = distributor_ledger::table
        .filter(distributor_ledger::distributor_id.eq(distributor_id))
        .order_by(distributor_ledger::id.desc())
        .select(distributor_ledger::balance_after)
        .first::<i64>(conn)
        .await
        .optional()
        .context("Failed to read ledger balance")?;

    Ok(balance.unwrap_or(0))
}

/// Appends an entry. The distributor row stays locked until the caller's
/// transaction ends, so concurrent appends for one distributor serialize.
pub async fn append_entry(
    conn: &mut AsyncPgConnection,
    distributor_id: i32,
    entry: NewLedgerEntry,
) -> Result<LedgerEntryEntity, AppError> {
    let distributor: DistributorEntity = distributors::table
        .find(distributor_id)
        .for_update()
        .select(DistributorEntity::as_select())
        .get_result(conn)
        .await?;

    let previous = current_balance(conn, distributor.id).await?;
    let balance_after = ledger::next_balance(previous, entry.entry_type, entry.amount)?;
    if entry.entry_type == LedgerEntryType::Order {
        ledger::check_credit_limit(distributor.credit_limit, balance_after)?;
    }

    let recorded: LedgerEntryEntity = diesel::insert_into(distributor_ledger::table)
        .values(CreateLedgerEntryEntity {
            distributor_id: distributor.id,
            entry_type: entry.entry_type.as_str().into(),
            amount: ledger::signed_amount(entry.entry_type, entry.amount)?,
            balance_after,
            payment_method: entry.payment_method,
            reference: entry.reference,
            note: entry.note,
        })
        .returning(LedgerEntryEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to append ledger entry")?;

    outbox::publish(
        conn,
        events::LEDGER_ENTRY_RECORDED.into(),
        LedgerEntryRecordedEvent {
            entry_id: recorded.id,
            distributor_id: distributor.id,
            distributor_user_id: distributor.user_id,
            entry_type: recorded.entry_type.clone(),
            amount: entry.amount,
            balance_after,
        },
    )
    .await?;

    info!(
        distributor_id = distributor.id,
        entry_type = %entry.entry_type,
        amount = entry.amount,
        balance_after,
        "Ledger entry appended"
    );
    Ok(recorded)
}

pub async fn summary(
    conn: &mut AsyncPgConnection,
    distributor_id: i32,
) -> Result<LedgerSummary, AppError> {
    let amounts: Vec<i64> = distributor_ledger::table
        .filter(distributor_ledger::distributor_id.eq(distributor_id))
        .select(distributor_ledger::amount)
        .load(conn)
        .await
        .context("Failed to load ledger amounts")?;

    Ok(LedgerSummary::from_amounts(amounts))
}

/// Summaries for many distributors in one query.
pub async fn summaries(
    conn: &mut AsyncPgConnection,
    distributor_ids: &[i32],
) -> Result<HashMap<i32, LedgerSummary>, AppError> {
    let rows: Vec<(i32, i64)> = distributor_ledger::table
        .filter(distributor_ledger::distributor_id.eq_any(distributor_ids))
        .select((distributor_ledger::distributor_id, distributor_ledger::amount))
        .load(conn)
        .await
        .context("Failed to load ledger amounts")?;

    let mut grouped: HashMap<i32, Vec<i64>> = HashMap::new();
    for (distributor_id, amount) in rows {
        grouped.entry(distributor_id).or_default().push(amount);
    }

    Ok(distributor_ids
        .iter()
        .map(|id| {
            let amounts = grouped.remove(id).unwrap_or_default();
            (*id, LedgerSummary::from_amounts(amounts))
        })
        .collect())
}
