use anyhow::Context;
use axum::{
    Extension,
    extract::{Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    domain::ledger::LedgerSummary,
    models::{DistributorEntity, LedgerEntryEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::CurrentUser,
        pagination::{Page, Pagination},
    },
    schema::distributor_ledger,
    services::{bulk_orders::distributor_for_user, ledger},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_me))
        .routes(utoipa_axum::routes!(get_my_ledger))
}

#[derive(Serialize, ToSchema, Debug)]
pub struct DistributorWithSummary {
    pub distributor: DistributorEntity,
    pub summary: LedgerSummary,
    /// Credit still available, `None` when the distributor has no limit.
    pub available_credit: Option<i64>,
}

impl DistributorWithSummary {
    pub fn new(distributor: DistributorEntity, summary: LedgerSummary) -> Self {
        let available_credit = (distributor.credit_limit > 0)
            .then(|| (distributor.credit_limit - summary.current_balance).max(0));
        Self {
            distributor,
            summary,
            available_credit,
        }
    }
}

/// Profile of the authenticated distributor with ledger totals.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Distributor"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get profile successfully", body = StdResponse<DistributorWithSummary, String>),
        (status = 403, description = "Account has no distributor profile")
    )
)]
async fn get_me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let distributor = distributor_for_user(conn, user.id).await?;
    let summary = ledger::summary(conn, distributor.id).await?;

    Ok(StdResponse {
        data: Some(DistributorWithSummary::new(distributor, summary)),
        message: Some("Get profile successfully"),
    })
}

/// Ledger entries of the authenticated distributor, newest first.
#[utoipa::path(
    get,
    path = "/ledger",
    tags = ["Distributor"],
    security(("bearerAuth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "List ledger entries", body = StdResponse<Page<LedgerEntryEntity>, String>)
    )
)]
async fn get_my_ledger(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let distributor = distributor_for_user(conn, user.id).await?;
    let page = ledger_page(conn, distributor.id, &pagination).await?;

    Ok(StdResponse {
        data: Some(page),
        message: Some("Get ledger successfully"),
    })
}

pub(crate) async fn ledger_page(
    conn: &mut AsyncPgConnection,
    distributor_id: i32,
    pagination: &Pagination,
) -> Result<Page<LedgerEntryEntity>, AppError> {
    let total: i64 = distributor_ledger::table
        .filter(distributor_ledger::distributor_id.eq(distributor_id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count ledger entries")?;

    let entries: Vec<LedgerEntryEntity> = distributor_ledger::table
        .filter(distributor_ledger::distributor_id.eq(distributor_id))
        .order_by(distributor_ledger::id.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(LedgerEntryEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get ledger entries")?;

    Ok(Page::new(entries, total, pagination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn distributor(credit_limit: i64) -> DistributorEntity {
        DistributorEntity {
            id: 1,
            user_id: 2,
            business_name: "Sharma Traders".into(),
            phone: None,
            credit_limit,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn available_credit_tracks_balance() {
        let summary = LedgerSummary::from_amounts([80_000, -30_000]);
        let view = DistributorWithSummary::new(distributor(100_000), summary);
        assert_eq!(view.summary.current_balance, 50_000);
        assert_eq!(view.available_credit, Some(50_000));

        let uncapped = DistributorWithSummary::new(distributor(0), summary);
        assert_eq!(uncapped.available_credit, None);
    }
}
