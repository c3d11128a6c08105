use anyhow::Context;
use axum::{
    Extension,
    extract::{Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    models::RewardTransactionEntity,
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, CurrentUser},
        pagination::{Page, Pagination},
    },
    schema::reward_transactions,
    services::rewards,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/buyer/rewards",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_rewards))
            .route_layer(axum::middleware::from_fn(middleware::buyers_authorization)),
    )
}

#[derive(Serialize, ToSchema, Debug)]
pub struct RewardsRes {
    pub balance: i64,
    /// Value of the balance in paise when redeemed at checkout.
    pub balance_value: i64,
    pub transactions: Page<RewardTransactionEntity>,
}

/// Points balance and history of the authenticated buyer.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Rewards"],
    security(("bearerAuth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "Get rewards successfully", body = StdResponse<RewardsRes, String>)
    )
)]
async fn get_rewards(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let paise_per_point = state.config.storefront.checkout.paise_per_point;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let balance = rewards::balance(conn, user.id).await?;

    let total: i64 = reward_transactions::table
        .filter(reward_transactions::user_id.eq(user.id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count reward transactions")?;

    let transactions: Vec<RewardTransactionEntity> = reward_transactions::table
        .filter(reward_transactions::user_id.eq(user.id))
        .order_by(reward_transactions::id.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(RewardTransactionEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get reward transactions")?;

    Ok(StdResponse {
        data: Some(RewardsRes {
            balance,
            balance_value: balance.saturating_mul(paise_per_point),
            transactions: Page::new(transactions, total, &pagination),
        }),
        message: Some("Get rewards successfully"),
    })
}
