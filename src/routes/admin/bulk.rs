use anyhow::Context;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper, upsert::excluded};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    domain::bulk_pricing::{BulkItemConfig, BulkOrderStatus},
    models::{BulkItemEntity, BulkOrderEntity, UpsertBulkItemEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        pagination::{Page, Pagination},
    },
    routes::distributors::bulk_orders::{
        BulkItemView, BulkOrderWithItems, load_bulk_catalog, load_bulk_order_items,
    },
    schema::{bulk_items, bulk_orders},
    services::bulk_orders as bulk_service,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest(
            "/bulk-items",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_bulk_items))
                .routes(utoipa_axum::routes!(upsert_bulk_item))
                .routes(utoipa_axum::routes!(delete_bulk_item)),
        )
        .nest(
            "/bulk-orders",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_bulk_orders))
                .routes(utoipa_axum::routes!(get_bulk_order))
                .routes(utoipa_axum::routes!(update_bulk_order_status)),
        )
}

#[utoipa::path(
    get,
    path = "/",
    tags = ["Admin"],
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
pub struct UpsertBulkItemReq {
    pub allow_pieces: bool,
    pub allow_sets: bool,
    pub pieces_per_set: i32,
    /// Paise per piece.
    pub piece_price: i64,
    /// Paise per set. Defaults to `piece_price * pieces_per_set`.
    pub set_price: Option<i64>,
}

impl UpsertBulkItemReq {
    pub fn into_entity(self, product_id: i32) -> Result<UpsertBulkItemEntity, AppError> {
        BulkItemConfig {
            allow_pieces: self.allow_pieces,
            allow_sets: self.allow_sets,
            pieces_per_set: self.pieces_per_set,
            piece_price: self.piece_price,
            set_price: self.set_price,
        }
        .validate()?;

        if !self.allow_pieces && !self.allow_sets {
            return Err(AppError::BadRequest(
                "a bulk item must allow pieces, sets or both".into(),
            ));
        }
        if self.piece_price <= 0 || self.set_price.is_some_and(|price| price <= 0) {
            return Err(AppError::BadRequest("bulk prices must be positive".into()));
        }

        Ok(UpsertBulkItemEntity {
            product_id,
            allow_pieces: self.allow_pieces,
            allow_sets: self.allow_sets,
            pieces_per_set: self.pieces_per_set,
            piece_price: self.piece_price,
            set_price: self.set_price,
        })
    }
}

/// Open a product for bulk ordering or change its bulk pricing.
#[utoipa::path(
    put,
    path = "/{product_id}",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("product_id" = i32, Path, description = "Product ID")
    ),
    request_body = UpsertBulkItemReq,
    responses(
        (status = 200, description = "Saved bulk item successfully", body = StdResponse<BulkItemEntity, String>),
        (status = 400, description = "Invalid configuration or unknown product")
    )
)]
async fn upsert_bulk_item(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
    Json(body): Json<UpsertBulkItemReq>,
) -> Result<impl IntoResponse, AppError> {
    let entity = body.into_entity(product_id)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let item: BulkItemEntity = diesel::insert_into(bulk_items::table)
        .values(&entity)
        .on_conflict(bulk_items::product_id)
        .do_update()
        .set((
            bulk_items::allow_pieces.eq(excluded(bulk_items::allow_pieces)),
            bulk_items::allow_sets.eq(excluded(bulk_items::allow_sets)),
            bulk_items::pieces_per_set.eq(excluded(bulk_items::pieces_per_set)),
            bulk_items::piece_price.eq(excluded(bulk_items::piece_price)),
            bulk_items::set_price.eq(excluded(bulk_items::set_price)),
            bulk_items::updated_at.eq(diesel::dsl::now),
        ))
        .returning(BulkItemEntity::as_returning())
        .get_result(conn)
        .await?;

    info!(product_id, "Bulk item saved");

    Ok(StdResponse {
        data: Some(item),
        message: Some("Saved bulk item successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/{product_id}",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("product_id" = i32, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Removed bulk item successfully", body = StdResponse<BulkItemEntity, String>),
        (status = 404, description = "Product is not a bulk item")
    )
)]
async fn delete_bulk_item(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let removed: BulkItemEntity = diesel::delete(bulk_items::table.find(product_id))
        .returning(BulkItemEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(removed),
        message: Some("Removed bulk item successfully"),
    })
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BulkOrderFilter {
    #[param(inline)]
    pub status: Option<BulkOrderStatus>,
    pub distributor_id: Option<i32>,
}

#[utoipa::path(
    get,
    path = "/",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(BulkOrderFilter, Pagination),
    responses(
        (status = 200, description = "List bulk orders", body = StdResponse<Page<BulkOrderEntity>, String>)
    )
)]
async fn get_bulk_orders(
    State(state): State<AppState>,
    Query(filter): Query<BulkOrderFilter>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let filtered = || {
        let mut query = bulk_orders::table.into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(bulk_orders::status.eq(status.as_str()));
        }
        if let Some(distributor_id) = filter.distributor_id {
            query = query.filter(bulk_orders::distributor_id.eq(distributor_id));
        }
        query
    };

    let total: i64 = filtered()
        .count()
        .get_result(conn)
        .await
        .context("Failed to count bulk orders")?;

    let orders: Vec<BulkOrderEntity> = filtered()
        .order_by(bulk_orders::created_at.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(BulkOrderEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get bulk orders")?;

    Ok(StdResponse {
        data: Some(Page::new(orders, total, &pagination)),
        message: Some("Get bulk orders successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Admin"],
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
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: BulkOrderEntity = bulk_orders::table
        .find(id)
        .select(BulkOrderEntity::as_select())
        .get_result(conn)
        .await?;
    let items = load_bulk_order_items(conn, order.id).await?;

    Ok(StdResponse {
        data: Some(BulkOrderWithItems { order, items }),
        message: Some("Get bulk order successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct UpdateBulkOrderStatusReq {
    pub status: BulkOrderStatus,
}

/// Confirming an order charges it to the distributor's ledger.
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Bulk order ID")
    ),
    request_body = UpdateBulkOrderStatusReq,
    responses(
        (status = 200, description = "Updated bulk order successfully", body = StdResponse<BulkOrderEntity, String>),
        (status = 404, description = "Bulk order not found"),
        (status = 409, description = "Illegal transition or credit limit exceeded")
    )
)]
async fn update_bulk_order_status(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Json(body): Json<UpdateBulkOrderStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order: BulkOrderEntity = bulk_orders::table
                    .find(id)
                    .for_update()
                    .select(BulkOrderEntity::as_select())
                    .get_result(conn)
                    .await?;

                bulk_service::change_status(conn, &order, body.status).await
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(updated),
        message: Some("Updated bulk order successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> UpsertBulkItemReq {
        UpsertBulkItemReq {
            allow_pieces: true,
            allow_sets: true,
            pieces_per_set: 6,
            piece_price: 1_500,
            set_price: None,
        }
    }

    #[test]
    fn accepts_valid_configuration() {
        let entity = request().into_entity(3).unwrap();
        assert_eq!(entity.product_id, 3);
        assert_eq!(entity.pieces_per_set, 6);
    }

    #[test]
    fn rejects_invalid_configurations() {
        let no_mode = UpsertBulkItemReq {
            allow_pieces: false,
            allow_sets: false,
            ..request()
        };
        assert!(matches!(no_mode.into_entity(1), Err(AppError::BadRequest(_))));

        let empty_set = UpsertBulkItemReq {
            pieces_per_set: 0,
            ..request()
        };
        assert!(matches!(empty_set.into_entity(1), Err(AppError::BadRequest(_))));

        let free = UpsertBulkItemReq {
            set_price: Some(0),
            ..request()
        };
        assert!(matches!(free.into_entity(1), Err(AppError::BadRequest(_))));
    }
}
