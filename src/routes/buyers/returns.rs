use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    domain::{
        order_status::OrderStatus,
        return_status::{ReturnRequestType, ReturnStatus},
    },
    events::{self, ReturnRequestedEvent},
    models::{
        CreateReturnRequestEntity, OrderEntity, ReturnRequestEntity, ReturnStatusHistoryEntity,
    },
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, CurrentUser},
        outbox,
        pagination::{Page, Pagination},
    },
    schema::{orders, return_requests, return_status_history},
    services::returns::{self as return_service, TransitionDetails},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/buyer/returns",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_return))
            .routes(utoipa_axum::routes!(get_my_returns))
            .routes(utoipa_axum::routes!(get_return))
            .routes(utoipa_axum::routes!(cancel_return))
            .route_layer(axum::middleware::from_fn(middleware::buyers_authorization)),
    )
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ReturnWithHistory {
    pub request: ReturnRequestEntity,
    pub history: Vec<ReturnStatusHistoryEntity>,
}

pub(crate) async fn load_history(
    conn: &mut AsyncPgConnection,
    return_id: i32,
) -> Result<Vec<ReturnStatusHistoryEntity>, AppError> {
    let history = return_status_history::table
        .filter(return_status_history::return_id.eq(return_id))
        .order_by(return_status_history::id.asc())
        .select(ReturnStatusHistoryEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get return history")?;
    Ok(history)
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateReturnReq {
    pub order_id: i32,
    pub request_type: ReturnRequestType,
    pub reason: String,
}

/// Open a return, refund or replacement request for a delivered order.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Returns"],
    security(("bearerAuth" = [])),
    request_body = CreateReturnReq,
    responses(
        (status = 200, description = "Created return request successfully", body = StdResponse<ReturnRequestEntity, String>),
        (status = 400, description = "Order is not delivered or reason is empty"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "An open request exists or the order is fully refunded")
    )
)]
async fn create_return(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateReturnReq>,
) -> Result<impl IntoResponse, AppError> {
    let reason = body.reason.trim().to_string();
    if reason.is_empty() {
        return Err(AppError::BadRequest("reason is required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let request = conn
        .transaction(move |conn| {
            Box::pin(async move {
                // Locking the order serializes concurrent requests for it.
                let order: OrderEntity = orders::table
                    .find(body.order_id)
                    .filter(orders::buyer_id.eq(user.id))
                    .for_update()
                    .select(OrderEntity::as_select())
                    .get_result(conn)
                    .await?;

                if order.status != OrderStatus::Delivered.as_str() {
                    return Err(AppError::BadRequest(format!(
                        "only delivered orders can be returned, order is {}",
                        order.status
                    )));
                }

                let open: i64 = return_requests::table
                    .filter(return_requests::order_id.eq(order.id))
                    .filter(return_requests::status.ne_all(return_service::closed_statuses()))
                    .count()
                    .get_result(conn)
                    .await
                    .context("Failed to count open return requests")?;
                if open > 0 {
                    return Err(AppError::Conflict(
                        "an open request already exists for this order".into(),
                    ));
                }

                if body.request_type.pays_out() {
                    let refunded = return_service::refunded_so_far(conn, order.id, None).await?;
                    return_service::resolve_refund(None, order.total, refunded)?;
                }

                let request: ReturnRequestEntity = diesel::insert_into(return_requests::table)
                    .values(CreateReturnRequestEntity {
                        order_id: order.id,
                        buyer_id: user.id,
                        request_type: body.request_type.as_str().into(),
                        status: ReturnStatus::Pending.as_str().into(),
                        reason,
                    })
                    .returning(ReturnRequestEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create return request")?;

                outbox::publish(
                    conn,
                    events::RETURN_REQUESTED.into(),
                    ReturnRequestedEvent {
                        return_id: request.id,
                        order_id: order.id,
                        buyer_id: user.id,
                        request_type: request.request_type.clone(),
                    },
                )
                .await?;

                Ok::<ReturnRequestEntity, AppError>(request)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(request),
        message: Some("Created return request successfully"),
    })
}

/// Fetch the authenticated buyer's return requests, newest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Returns"],
    security(("bearerAuth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "List my return requests", body = StdResponse<Page<ReturnRequestEntity>, String>)
    )
)]
async fn get_my_returns(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let total: i64 = return_requests::table
        .filter(return_requests::buyer_id.eq(user.id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count return requests")?;

    let requests: Vec<ReturnRequestEntity> = return_requests::table
        .filter(return_requests::buyer_id.eq(user.id))
        .order_by(return_requests::created_at.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(ReturnRequestEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get return requests")?;

    Ok(StdResponse {
        data: Some(Page::new(requests, total, &pagination)),
        message: Some("Get my return requests successfully"),
    })
}

/// Fetch one of the buyer's return requests with its status history.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Returns"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Return request ID")
    ),
    responses(
        (status = 200, description = "Get return request successfully", body = StdResponse<ReturnWithHistory, String>),
        (status = 404, description = "Return request not found")
    )
)]
async fn get_return(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let request: ReturnRequestEntity = return_requests::table
        .find(id)
        .filter(return_requests::buyer_id.eq(user.id))
        .select(ReturnRequestEntity::as_select())
        .get_result(conn)
        .await?;

    let history = load_history(conn, request.id).await?;

    Ok(StdResponse {
        data: Some(ReturnWithHistory { request, history }),
        message: Some("Get return request successfully"),
    })
}

/// Withdraw a request that has not been reviewed yet.
#[utoipa::path(
    post,
    path = "/{id}/cancel",
    tags = ["Returns"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Return request ID")
    ),
    responses(
        (status = 200, description = "Cancelled return request successfully", body = StdResponse<ReturnRequestEntity, String>),
        (status = 404, description = "Return request not found"),
        (status = 409, description = "Request is already under review")
    )
)]
async fn cancel_return(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cancelled = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let request: ReturnRequestEntity = return_requests::table
                    .find(id)
                    .filter(return_requests::buyer_id.eq(user.id))
                    .select(ReturnRequestEntity::as_select())
                    .get_result(conn)
                    .await?;

                let status: ReturnStatus = request.status.parse()?;
                if !status.buyer_may_cancel() {
                    return Err(AppError::Conflict(format!(
                        "requests that are {} can no longer be cancelled",
                        status
                    )));
                }

                return_service::transition(
                    conn,
                    &request,
                    ReturnStatus::Cancelled,
                    user.id,
                    TransitionDetails::default(),
                )
                .await
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(cancelled),
        message: Some("Cancelled return request successfully"),
    })
}
