use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    domain::order_status::OrderStatus,
    models::{OrderEntity, OrderItemEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, CurrentUser},
        pagination::{Page, Pagination},
    },
    routes::buyers::orders::OrderWithItems,
    schema::{order_items, orders},
    services::orders as order_service,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/seller/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_seller_orders))
            .routes(utoipa_axum::routes!(update_order_status))
            .route_layer(axum::middleware::from_fn(middleware::sellers_authorization)),
    )
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderStatusFilter {
    #[param(inline)]
    pub status: Option<OrderStatus>,
}

/// Orders containing at least one of the seller's products. Only the
/// seller's own lines are returned.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Seller orders"],
    security(("bearerAuth" = [])),
    params(OrderStatusFilter, Pagination),
    responses(
        (status = 200, description = "List seller orders", body = StdResponse<Page<OrderWithItems>, String>)
    )
)]
async fn get_seller_orders(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<OrderStatusFilter>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let seller_orders = || {
        let mut query = orders::table
            .filter(
                orders::id.eq_any(
                    order_items::table
                        .filter(order_items::seller_id.eq(user.id))
                        .select(order_items::order_id),
                ),
            )
            .into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(orders::status.eq(status.as_str()));
        }
        query
    };

    let total: i64 = seller_orders()
        .count()
        .get_result(conn)
        .await
        .context("Failed to count seller orders")?;

    let orders: Vec<OrderEntity> = seller_orders()
        .order_by(orders::created_at.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(OrderEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get seller orders")?;

    let ids: Vec<i32> = orders.iter().map(|order| order.id).collect();
    let mut items = order_service::load_items(conn, &ids).await?;
    let orders = orders
        .into_iter()
        .map(|order| OrderWithItems {
            items: items
                .remove(&order.id)
                .unwrap_or_default()
                .into_iter()
                .filter(|item| item.seller_id == user.id)
                .collect(),
            order,
        })
        .collect();

    Ok(StdResponse {
        data: Some(Page::new(orders, total, &pagination)),
        message: Some("Get seller orders successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct UpdateOrderStatusReq {
    pub status: OrderStatus,
}

/// Sellers move orders to processing and shipped. Orders that also contain
/// other sellers' products are fulfilled by an admin.
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tags = ["Seller orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID")
    ),
    request_body = UpdateOrderStatusReq,
    responses(
        (status = 200, description = "Updated order status successfully", body = StdResponse<OrderEntity, String>),
        (status = 403, description = "Status not settable by sellers or order is shared"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Illegal status transition")
    )
)]
async fn update_order_status(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<UpdateOrderStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    if !OrderStatus::seller_may_set(body.status) {
        return Err(AppError::ForbiddenResource(format!(
            "sellers cannot mark orders as {}",
            body.status
        )));
    }

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

                let items: Vec<OrderItemEntity> = order_items::table
                    .filter(order_items::order_id.eq(order.id))
                    .select(OrderItemEntity::as_select())
                    .get_results(conn)
                    .await
                    .context("Failed to get order items")?;

                if !items.iter().any(|item| item.seller_id == user.id) {
                    return Err(AppError::NotFound);
                }
                if items.iter().any(|item| item.seller_id != user.id) {
                    return Err(AppError::ForbiddenResource(
                        "order contains products from other sellers".into(),
                    ));
                }

                order_service::change_status(conn, &order, body.status, &rules).await
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(updated),
        message: Some("Updated order status successfully"),
    })
}
