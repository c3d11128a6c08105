use anyhow::Context;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    domain::ledger::LedgerEntryType,
    models::{CreateDistributorEntity, DistributorEntity, LedgerEntryEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        pagination::{Page, Pagination},
    },
    routes::distributors::profile::{DistributorWithSummary, ledger_page},
    schema::distributors,
    services::ledger::{self, NewLedgerEntry},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/distributors",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_distributor))
            .routes(utoipa_axum::routes!(get_distributors))
            .routes(utoipa_axum::routes!(get_distributor_ledger))
            .routes(utoipa_axum::routes!(record_payment)),
    )
}

/// Register a distributor profile for an existing user account.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    request_body = CreateDistributorEntity,
    responses(
        (status = 200, description = "Created distributor successfully", body = StdResponse<DistributorEntity, String>),
        (status = 400, description = "Negative credit limit"),
        (status = 409, description = "User already has a distributor profile")
    )
)]
async fn create_distributor(
    State(state): State<AppState>,
    Json(body): Json<CreateDistributorEntity>,
) -> Result<impl IntoResponse, AppError> {
    if body.credit_limit < 0 {
        return Err(AppError::BadRequest("credit limit cannot be negative".into()));
    }
    if body.business_name.trim().is_empty() {
        return Err(AppError::BadRequest("business name is required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let distributor: DistributorEntity = diesel::insert_into(distributors::table)
        .values(&body)
        .returning(DistributorEntity::as_returning())
        .get_result(conn)
        .await?;

    info!(distributor_id = distributor.id, user_id = distributor.user_id, "Distributor created");

    Ok(StdResponse {
        data: Some(distributor),
        message: Some("Created distributor successfully"),
    })
}

/// All distributors with their ledger totals.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "List distributors", body = StdResponse<Page<DistributorWithSummary>, String>)
    )
)]
async fn get_distributors(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let total: i64 = distributors::table
        .count()
        .get_result(conn)
        .await
        .context("Failed to count distributors")?;

    let rows: Vec<DistributorEntity> = distributors::table
        .order_by(distributors::business_name.asc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(DistributorEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get distributors")?;

    let ids: Vec<i32> = rows.iter().map(|distributor| distributor.id).collect();
    let mut summaries = ledger::summaries(conn, &ids).await?;

    let page = Page::new(rows, total, &pagination).map(|distributor| {
        let summary = summaries.remove(&distributor.id).unwrap_or_default();
        DistributorWithSummary::new(distributor, summary)
    });

    Ok(StdResponse {
        data: Some(page),
        message: Some("Get distributors successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/{id}/ledger",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Distributor ID"),
        Pagination
    ),
    responses(
        (status = 200, description = "List ledger entries", body = StdResponse<Page<LedgerEntryEntity>, String>),
        (status = 404, description = "Distributor not found")
    )
)]
async fn get_distributor_ledger(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let distributor: DistributorEntity = distributors::table
        .find(id)
        .select(DistributorEntity::as_select())
        .get_result(conn)
        .await?;
    let page = ledger_page(conn, distributor.id, &pagination).await?;

    Ok(StdResponse {
        data: Some(page),
        message: Some("Get ledger successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct RecordPaymentReq {
    /// Paise received from the distributor.
    pub amount: i64,
    pub payment_method: String,
    pub reference: Option<String>,
    pub note: Option<String>,
}

impl From<RecordPaymentReq> for NewLedgerEntry {
    fn from(req: RecordPaymentReq) -> Self {
        Self {
            entry_type: LedgerEntryType::Payment,
            amount: req.amount,
            payment_method: Some(req.payment_method),
            reference: req.reference,
            note: req.note,
        }
    }
}

/// Record money received from a distributor. Overpayment leaves a credit.
#[utoipa::path(
    post,
    path = "/{id}/payments",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Distributor ID")
    ),
    request_body = RecordPaymentReq,
    responses(
        (status = 200, description = "Recorded payment successfully", body = StdResponse<LedgerEntryEntity, String>),
        (status = 400, description = "Amount is not positive"),
        (status = 404, description = "Distributor not found")
    )
)]
async fn record_payment(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Json(body): Json<RecordPaymentReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.payment_method.trim().is_empty() {
        return Err(AppError::BadRequest("payment method is required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let entry = conn
        .transaction(move |conn| {
            Box::pin(async move { ledger::append_entry(conn, id, body.into()).await })
        })
        .await?;

    Ok(StdResponse {
        data: Some(entry),
        message: Some("Recorded payment successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_request_becomes_payment_entry() {
        let entry: NewLedgerEntry = RecordPaymentReq {
            amount: 25_000,
            payment_method: "upi".into(),
            reference: Some("UTR123".into()),
            note: None,
        }
        .into();

        assert_eq!(entry.entry_type, LedgerEntryType::Payment);
        assert_eq!(entry.amount, 25_000);
        assert_eq!(entry.payment_method.as_deref(), Some("upi"));
    }
}
