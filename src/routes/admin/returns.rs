use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    domain::return_status::{ReturnRequestType, ReturnStatus},
    models::{ReturnRequestEntity, ReturnStatusHistoryEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::CurrentUser,
        pagination::{Page, Pagination},
    },
    routes::buyers::returns::load_history,
    schema::return_requests,
    services::returns::{self as return_service, TransitionDetails},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/returns",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_returns))
            .routes(utoipa_axum::routes!(get_return))
            .routes(utoipa_axum::routes!(update_return_status)),
    )
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReturnStatusFilter {
    #[param(inline)]
    pub status: Option<ReturnStatus>,
}

/// Review queue of return, refund and replacement requests.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(ReturnStatusFilter, Pagination),
    responses(
        (status = 200, description = "List return requests", body = StdResponse<Page<ReturnRequestEntity>, String>)
    )
)]
async fn get_returns(
    State(state): State<AppState>,
    Query(filter): Query<ReturnStatusFilter>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let filtered = || {
        let mut query = return_requests::table.into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(return_requests::status.eq(status.as_str()));
        }
        query
    };

    let total: i64 = filtered()
        .count()
        .get_result(conn)
        .await
        .context("Failed to count return requests")?;

    let requests: Vec<ReturnRequestEntity> = filtered()
        .order_by(return_requests::created_at.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(ReturnRequestEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get return requests")?;

    Ok(StdResponse {
        data: Some(Page::new(requests, total, &pagination)),
        message: Some("Get return requests successfully"),
    })
}

#[derive(Serialize, ToSchema, Debug)]
pub struct AdminReturnView {
    pub request: ReturnRequestEntity,
    pub history: Vec<ReturnStatusHistoryEntity>,
    /// Statuses the request can legally move to from here.
    pub next_options: Vec<ReturnStatus>,
}

impl AdminReturnView {
    pub fn new(
        request: ReturnRequestEntity,
        history: Vec<ReturnStatusHistoryEntity>,
    ) -> Result<Self, AppError> {
        let kind: ReturnRequestType = request.request_type.parse()?;
        let status: ReturnStatus = request.status.parse()?;
        Ok(Self {
            next_options: status.next_options(kind),
            request,
            history,
        })
    }
}

#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Return request ID")
    ),
    responses(
        (status = 200, description = "Get return request successfully", body = StdResponse<AdminReturnView, String>),
        (status = 404, description = "Return request not found")
    )
)]
async fn get_return(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let request: ReturnRequestEntity = return_requests::table
        .find(id)
        .select(ReturnRequestEntity::as_select())
        .get_result(conn)
        .await?;
    let history = load_history(conn, request.id).await?;

    Ok(StdResponse {
        data: Some(AdminReturnView::new(request, history)?),
        message: Some("Get return request successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct UpdateReturnStatusReq {
    pub status: ReturnStatus,
    pub note: Option<String>,
    /// Paise. Defaults to the order total when a refund is initiated.
    pub refund_amount: Option<i64>,
}

/// Move a request through its workflow. Every change is kept in the history.
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Return request ID")
    ),
    request_body = UpdateReturnStatusReq,
    responses(
        (status = 200, description = "Updated return request successfully", body = StdResponse<ReturnRequestEntity, String>),
        (status = 400, description = "Invalid refund amount"),
        (status = 404, description = "Return request not found"),
        (status = 409, description = "Illegal status transition")
    )
)]
async fn update_return_status(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<UpdateReturnStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let request: ReturnRequestEntity = return_requests::table
                    .find(id)
                    .for_update()
                    .select(ReturnRequestEntity::as_select())
                    .get_result(conn)
                    .await?;

                return_service::transition(
                    conn,
                    &request,
                    body.status,
                    user.id,
                    TransitionDetails {
                        note: body.note.filter(|note| !note.trim().is_empty()),
                        refund_amount: body.refund_amount,
                    },
                )
                .await
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(updated),
        message: Some("Updated return request successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(request_type: &str, status: &str) -> ReturnRequestEntity {
        ReturnRequestEntity {
            id: 1,
            order_id: 10,
            buyer_id: 5,
            request_type: request_type.into(),
            status: status.into(),
            reason: "Wrong size".into(),
            admin_note: None,
            refund_amount: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn next_options_follow_request_type() {
        let refund = AdminReturnView::new(request("refund", "approved"), vec![]).unwrap();
        assert!(refund.next_options.contains(&ReturnStatus::RefundInitiated));
        assert!(!refund.next_options.contains(&ReturnStatus::ItemInTransit));

        let replacement =
            AdminReturnView::new(request("replacement", "item_received"), vec![]).unwrap();
        assert_eq!(replacement.next_options, vec![ReturnStatus::Completed]);

        let done = AdminReturnView::new(request("return", "completed"), vec![]).unwrap();
        assert!(done.next_options.is_empty());
    }

    #[test]
    fn rejects_unknown_stored_status() {
        assert!(matches!(
            AdminReturnView::new(request("return", "lost"), vec![]),
            Err(AppError::BadRequest(_))
        ));
    }
}
