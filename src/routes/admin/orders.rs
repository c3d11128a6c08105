use anyhow::Context;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::info;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    models::{OrderEntity, PaymentEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        pagination::{Page, Pagination},
    },
    routes::{
        buyers::orders::{GetOrderRes, OrderWithItems, attach_items},
        sellers::orders::{OrderStatusFilter, UpdateOrderStatusReq},
    },
    schema::{orders, payments},
    services::orders as order_service,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_orders))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(update_order_status)),
    )
}

/// Every order in the marketplace, newest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(OrderStatusFilter, Pagination),
    responses(
        (status = 200, description = "List orders", body = StdResponse<Page<OrderWithItems>, String>)
    )
)]
async fn get_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderStatusFilter>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let filtered = || {
        let mut query = orders::table.into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(orders::status.eq(status.as_str()));
        }
        query
    };

    let total: i64 = filtered()
        .count()
        .get_result(conn)
        .await
        .context("Failed to count orders")?;

    let orders: Vec<OrderEntity> = filtered()
        .order_by(orders::created_at.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(OrderEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get orders")?;

    let orders = attach_items(conn, orders).await?;

    Ok(StdResponse {
        data: Some(Page::new(orders, total, &pagination)),
        message: Some("Get orders successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<GetOrderRes, String>),
        (status = 404, description = "Order not found")
    )
)]
async fn get_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: OrderEntity = orders::table
        .find(id)
        .select(OrderEntity::as_select())
        .get_result(conn)
        .await?;

    let payments: Vec<PaymentEntity> = payments::table
        .filter(payments::order_id.eq(order.id))
        .order_by(payments::created_at.desc())
        .select(PaymentEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get payments")?;

    let mut with_items = attach_items(conn, vec![order]).await?;
    let OrderWithItems { order, items } = with_items.pop().ok_or(AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(GetOrderRes {
            order,
            items,
            payments,
        }),
        message: Some("Get order successfully"),
    })
}

/// Admins may apply any legal transition, including delivery and cancellation.
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID")
    ),
    request_body = UpdateOrderStatusReq,
    responses(
        (status = 200, description = "Updated order status successfully", body = StdResponse<OrderEntity, String>),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Illegal status transition")
    )
)]
async fn update_order_status(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Json(body): Json<UpdateOrderStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    let rules = state.config.storefront.checkout;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order: OrderEntity = orders::table
                    .find(id)
                    .for_update()
                    .select(OrderEntity::as_select())
                    .get_result(conn)
                    .await?;

                order_service::change_status(conn, &order, body.status, &rules).await
            })
        })
        .await?;

    info!(order_id = updated.id, status = %updated.status, "Order status set by admin");

    Ok(StdResponse {
        data: Some(updated),
        message: Some("Updated order status successfully"),
    })
}
