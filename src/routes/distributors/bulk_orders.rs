use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    domain::{
        bulk_pricing::{self, BulkItemConfig, BulkOrderStatus, BulkOrderType, PricedLine},
        ledger,
    },
    models::{
        BulkItemEntity, BulkOrderEntity, BulkOrderItemEntity, CreateBulkOrderEntity,
        CreateBulkOrderItemEntity,
    },
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::CurrentUser,
        pagination::{Page, Pagination},
    },
    schema::{bulk_items, bulk_order_items, bulk_orders, products},
    services::{
        self,
        bulk_orders::{self as bulk_service, distributor_for_user},
        ledger as ledger_service,
    },
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_bulk_items))
        .routes(utoipa_axum::routes!(create_bulk_order))
        .routes(utoipa_axum::routes!(get_my_bulk_orders))
        .routes(utoipa_axum::routes!(get_bulk_order))
        .routes(utoipa_axum::routes!(cancel_bulk_order))
}

impl From<&BulkItemEntity> for BulkItemConfig {
    fn from(item: &BulkItemEntity) -> Self {
        Self {
            allow_pieces: item.allow_pieces,
            allow_sets: item.allow_sets,
            pieces_per_set: item.pieces_per_set,
            piece_price: item.piece_price,
            set_price: item.set_price,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct BulkItemView {
    #[serde(flatten)]
    pub item: BulkItemEntity,
    pub product_name: String,
    /// Price of one set after applying the default.
    pub effective_set_price: Option<i64>,
}

pub(crate) async fn load_bulk_catalog(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<BulkItemView>, AppError> {
    let rows: Vec<(BulkItemEntity, String)> = bulk_items::table
        .inner_join(products::table)
        .filter(products::is_active.eq(true))
        .order_by(products::name.asc())
        .select((BulkItemEntity::as_select(), products::name))
        .get_results(conn)
        .await
        .context("Failed to get bulk items")?;

    Ok(rows
        .into_iter()
        .map(|(item, product_name)| {
            let config = BulkItemConfig::from(&item);
            let effective_set_price = config.unit_price(BulkOrderType::Set).ok();
            BulkItemView {
                item,
                product_name,
                effective_set_price,
            }
        })
        .collect())
}

/// Products open for bulk ordering with their piece and set prices.
#[utoipa::path(
    get,
    path = "/bulk-items",
    tags = ["Distributor"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List bulk items", body = StdResponse<Vec<BulkItemView>, String>)
    )
)]
async fn get_bulk_items(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let items = load_bulk_catalog(conn).await?;

    Ok(StdResponse {
        data: Some(items),
        message: Some("Get bulk items successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug, Clone, Copy)]
pub struct BulkOrderLineReq {
    pub product_id: i32,
    pub order_type: BulkOrderType,
    pub quantity: i32,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateBulkOrderReq {
    pub items: Vec<BulkOrderLineReq>,
    pub note: Option<String>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct BulkOrderWithItems {
    pub order: BulkOrderEntity,
    pub items: Vec<BulkOrderItemEntity>,
}

/// Prices every requested line against its product's bulk configuration.
pub fn price_lines(
    lines: &[BulkOrderLineReq],
    configs: &HashMap<i32, BulkItemConfig>,
) -> Result<(Vec<(i32, PricedLine)>, i64), AppError> {
    let priced = lines
        .iter()
        .map(|line| {
            let config = configs.get(&line.product_id).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "product {} is not available for bulk ordering",
                    line.product_id
                ))
            })?;
            let priced = bulk_pricing::price_line(config, line.order_type, line.quantity)?;
            Ok((line.product_id, priced))
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let only_lines: Vec<PricedLine> = priced.iter().map(|(_, line)| *line).collect();
    let total = bulk_pricing::order_total(&only_lines)?;
    Ok((priced, total))
}

/// Place a bulk order. The ledger is charged when an admin confirms it.
#[utoipa::path(
    post,
    path = "/bulk-orders",
    tags = ["Distributor"],
    security(("bearerAuth" = [])),
    request_body = CreateBulkOrderReq,
    responses(
        (status = 200, description = "Created bulk order successfully", body = StdResponse<BulkOrderWithItems, String>),
        (status = 400, description = "Invalid lines"),
        (status = 409, description = "Order would exceed the credit limit")
    )
)]
async fn create_bulk_order(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateBulkOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let created = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let distributor = distributor_for_user(conn, user.id).await?;

                let product_ids: Vec<i32> = body.items.iter().map(|line| line.product_id).collect();
                let configs: HashMap<i32, BulkItemConfig> = bulk_items::table
                    .inner_join(products::table)
                    .filter(bulk_items::product_id.eq_any(&product_ids))
                    .filter(products::is_active.eq(true))
                    .select(BulkItemEntity::as_select())
                    .get_results(conn)
                    .await
                    .context("Failed to get bulk items")?
                    .iter()
                    .map(|item| (item.product_id, BulkItemConfig::from(item)))
                    .collect();

                let (priced, total) = price_lines(&body.items, &configs)?;

                let balance = ledger_service::current_balance(conn, distributor.id).await?;
                let projected = balance.checked_add(total).ok_or(ledger::LedgerError::Overflow)?;
                ledger::check_credit_limit(distributor.credit_limit, projected)?;

                let order: BulkOrderEntity = diesel::insert_into(bulk_orders::table)
                    .values(CreateBulkOrderEntity {
                        order_number: services::order_number(services::BULK_ORDER_PREFIX),
                        distributor_id: distributor.id,
                        status: BulkOrderStatus::Pending.as_str().into(),
                        total_amount: total,
                        note: body.note,
                    })
                    .returning(BulkOrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create bulk order")?;

                let new_items: Vec<CreateBulkOrderItemEntity> = priced
                    .into_iter()
                    .map(|(product_id, line)| CreateBulkOrderItemEntity {
                        bulk_order_id: order.id,
                        product_id,
                        order_type: line.order_type.as_str().into(),
                        quantity: line.quantity,
                        unit_price: line.unit_price,
                        total_price: line.total_price,
                    })
                    .collect();

                let items: Vec<BulkOrderItemEntity> = diesel::insert_into(bulk_order_items::table)
                    .values(&new_items)
                    .returning(BulkOrderItemEntity::as_returning())
                    .get_results(conn)
                    .await
                    .context("Failed to create bulk order items")?;

                Ok::<BulkOrderWithItems, AppError>(BulkOrderWithItems { order, items })
            })
        })
        .await?;

    info!(
        bulk_order_id = created.order.id,
        total = created.order.total_amount,
        "Bulk order placed"
    );

    Ok(StdResponse {
        data: Some(created),
        message: Some("Created bulk order successfully"),
    })
}

/// Bulk orders of the authenticated distributor, newest first.
#[utoipa::path(
    get,
    path = "/bulk-orders",
    tags = ["Distributor"],
    security(("bearerAuth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "List my bulk orders", body = StdResponse<Page<BulkOrderEntity>, String>)
    )
)]
async fn get_my_bulk_orders(
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

    let total: i64 = bulk_orders::table
        .filter(bulk_orders::distributor_id.eq(distributor.id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count bulk orders")?;

    let orders: Vec<BulkOrderEntity> = bulk_orders::table
        .filter(bulk_orders::distributor_id.eq(distributor.id))
        .order_by(bulk_orders::created_at.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(BulkOrderEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get bulk orders")?;

    Ok(StdResponse {
        data: Some(Page::new(orders, total, &pagination)),
        message: Some("Get my bulk orders successfully"),
    })
}

pub(crate) async fn load_bulk_order_items(
    conn: &mut AsyncPgConnection,
    bulk_order_id: i32,
) -> Result<Vec<BulkOrderItemEntity>, AppError> {
    let items = bulk_order_items::table
        .filter(bulk_order_items::bulk_order_id.eq(bulk_order_id))
        .order_by(bulk_order_items::id.asc())
        .select(BulkOrderItemEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get bulk order items")?;
    Ok(items)
}

/// Fetch one of the distributor's bulk orders with its lines.
#[utoipa::path(
    get,
    path = "/bulk-orders/{id}",
    tags = ["Distributor"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Bulk order ID")
    ),
    responses(
        (status = 200, description = "Get bulk order successfully", body = StdResponse<BulkOrderWithItems, String>),
        (status = 404, description = "Bulk order not found")
    )
)]
async fn get_bulk_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let distributor = distributor_for_user(conn, user.id).await?;
    let order: BulkOrderEntity = bulk_orders::table
        .find(id)
        .filter(bulk_orders::distributor_id.eq(distributor.id))
        .select(BulkOrderEntity::as_select())
        .get_result(conn)
        .await?;
    let items = load_bulk_order_items(conn, order.id).await?;

    Ok(StdResponse {
        data: Some(BulkOrderWithItems { order, items }),
        message: Some("Get bulk order successfully"),
    })
}

/// Cancel a bulk order that has not been confirmed yet.
#[utoipa::path(
    post,
    path = "/bulk-orders/{id}/cancel",
    tags = ["Distributor"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Bulk order ID")
    ),
    responses(
        (status = 200, description = "Cancelled bulk order successfully", body = StdResponse<BulkOrderEntity, String>),
        (status = 404, description = "Bulk order not found"),
        (status = 409, description = "Bulk order is already confirmed")
    )
)]
async fn cancel_bulk_order(
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
                let distributor = distributor_for_user(conn, user.id).await?;
                let order: BulkOrderEntity = bulk_orders::table
                    .find(id)
                    .filter(bulk_orders::distributor_id.eq(distributor.id))
                    .for_update()
                    .select(BulkOrderEntity::as_select())
                    .get_result(conn)
                    .await?;

                bulk_service::change_status(conn, &order, BulkOrderStatus::Cancelled).await
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(cancelled),
        message: Some("Cancelled bulk order successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> HashMap<i32, BulkItemConfig> {
        HashMap::from([(
            7,
            BulkItemConfig {
                allow_pieces: true,
                allow_sets: true,
                pieces_per_set: 10,
                piece_price: 2_000,
                set_price: Some(18_000),
            },
        )])
    }

    #[test]
    fn prices_mixed_piece_and_set_lines() {
        let lines = [
            BulkOrderLineReq {
                product_id: 7,
                order_type: BulkOrderType::Piece,
                quantity: 5,
            },
            BulkOrderLineReq {
                product_id: 7,
                order_type: BulkOrderType::Set,
                quantity: 2,
            },
        ];
        let (priced, total) = price_lines(&lines, &configs()).unwrap();
        assert_eq!(priced.len(), 2);
        assert_eq!(priced[1].1.unit_price, 18_000);
        assert_eq!(total, 10_000 + 36_000);
    }

    #[test]
    fn rejects_products_without_bulk_config() {
        let lines = [BulkOrderLineReq {
            product_id: 99,
            order_type: BulkOrderType::Piece,
            quantity: 1,
        }];
        assert!(matches!(
            price_lines(&lines, &configs()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn rejects_empty_orders() {
        assert!(matches!(
            price_lines(&[], &configs()),
            Err(AppError::BadRequest(_))
        ));
    }
}
