use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    domain::cart,
    models::{CartItemEntity, ProductEntity, VariantEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, CurrentUser},
    },
    schema::{cart_items, product_variants, products},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/buyer/cart",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_cart))
            .routes(utoipa_axum::routes!(clear_cart))
            .routes(utoipa_axum::routes!(add_item))
            .routes(utoipa_axum::routes!(update_item))
            .routes(utoipa_axum::routes!(remove_item))
            .routes(utoipa_axum::routes!(merge_cart))
            .route_layer(axum::middleware::from_fn(middleware::buyers_authorization)),
    )
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct CartLine {
    pub variant_id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub variant_label: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub stock: i32,
    pub line_total: i64,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub item_count: i64,
    pub subtotal: i64,
}

impl CartView {
    pub fn from_rows(rows: Vec<(CartItemEntity, VariantEntity, ProductEntity)>) -> Self {
        let items: Vec<CartLine> = rows
            .into_iter()
            .map(|(item, variant, product)| CartLine {
                variant_id: variant.id,
                product_id: product.id,
                product_name: product.name,
                variant_label: variant.label,
                unit_price: variant.price,
                quantity: item.quantity,
                stock: variant.stock,
                line_total: variant.price * i64::from(item.quantity),
            })
            .collect();

        Self {
            item_count: items.iter().map(|line| i64::from(line.quantity)).sum(),
            subtotal: items.iter().map(|line| line.line_total).sum(),
            items,
        }
    }
}

pub(crate) async fn load_cart(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> Result<CartView, AppError> {
    let rows: Vec<(CartItemEntity, VariantEntity, ProductEntity)> = cart_items::table
        .inner_join(product_variants::table.inner_join(products::table))
        .filter(cart_items::user_id.eq(user_id))
        .order_by(cart_items::created_at.asc())
        .select((
            CartItemEntity::as_select(),
            VariantEntity::as_select(),
            ProductEntity::as_select(),
        ))
        .get_results(conn)
        .await
        .context("Failed to get cart items")?;

    Ok(CartView::from_rows(rows))
}

async fn variant_stock(conn: &mut AsyncPgConnection, variant_id: i32) -> Result<i32, AppError> {
    let stock = product_variants::table
        .inner_join(products::table)
        .filter(product_variants::id.eq(variant_id))
        .filter(products::is_active.eq(true))
        .select(product_variants::stock)
        .first::<i32>(conn)
        .await?;
    Ok(stock)
}

async fn upsert_quantity(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    variant_id: i32,
    quantity: i32,
) -> Result<(), AppError> {
    diesel::insert_into(cart_items::table)
        .values((
            cart_items::user_id.eq(user_id),
            cart_items::variant_id.eq(variant_id),
            cart_items::quantity.eq(quantity),
        ))
        .on_conflict((cart_items::user_id, cart_items::variant_id))
        .do_update()
        .set((
            cart_items::quantity.eq(quantity),
            cart_items::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await
        .context("Failed to upsert cart item")?;
    Ok(())
}

async fn existing_quantity(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    variant_id: i32,
) -> Result<Option<i32>, AppError> {
    let quantity = cart_items::table
        .find((user_id, variant_id))
        .select(cart_items::quantity)
        .first::<i32>(conn)
        .await
        .optional()
        .context("Failed to get cart item")?;
    Ok(quantity)
}

/// Fetch the authenticated buyer's cart.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get cart successfully", body = StdResponse<CartView, String>)
    )
)]
async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = load_cart(conn, user.id).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Get cart successfully"),
    })
}

/// Remove every item from the cart.
#[utoipa::path(
    delete,
    path = "/",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Cleared cart successfully", body = StdResponse<CartView, String>)
    )
)]
async fn clear_cart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    diesel::delete(cart_items::table.filter(cart_items::user_id.eq(user.id)))
        .execute(conn)
        .await
        .context("Failed to clear cart")?;

    Ok(StdResponse {
        data: Some(CartView::from_rows(Vec::new())),
        message: Some("Cleared cart successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct AddCartItemReq {
    pub variant_id: i32,
    pub quantity: i32,
}

/// Add a variant to the cart. Quantities accumulate and are capped at the
/// available stock.
#[utoipa::path(
    post,
    path = "/items",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    request_body = AddCartItemReq,
    responses(
        (status = 200, description = "Added item successfully", body = StdResponse<CartView, String>),
        (status = 404, description = "Variant not found"),
        (status = 409, description = "Variant is out of stock")
    )
)]
async fn add_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<AddCartItemReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let stock = variant_stock(conn, body.variant_id).await?;
                let quantity = match existing_quantity(conn, user.id, body.variant_id).await? {
                    Some(existing) => cart::merge_quantity(existing, body.quantity, stock)?,
                    None => cart::clamp_quantity(body.quantity, stock)?,
                };
                upsert_quantity(conn, user.id, body.variant_id, quantity).await?;

                load_cart(conn, user.id).await
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Added item successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct UpdateCartItemReq {
    pub quantity: i32,
}

/// Set the quantity of a cart line, capped at the available stock.
#[utoipa::path(
    patch,
    path = "/items/{variant_id}",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    params(
        ("variant_id" = i32, Path, description = "Variant ID of the cart line")
    ),
    request_body = UpdateCartItemReq,
    responses(
        (status = 200, description = "Updated item successfully", body = StdResponse<CartView, String>),
        (status = 404, description = "Variant is not in the cart")
    )
)]
async fn update_item(
    Path(variant_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<UpdateCartItemReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = conn
        .transaction(move |conn| {
            Box::pin(async move {
                if existing_quantity(conn, user.id, variant_id).await?.is_none() {
                    return Err(AppError::NotFound);
                }
                let stock = variant_stock(conn, variant_id).await?;
                let quantity = cart::clamp_quantity(body.quantity, stock)?;
                upsert_quantity(conn, user.id, variant_id, quantity).await?;

                load_cart(conn, user.id).await
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Updated item successfully"),
    })
}

/// Remove one line from the cart.
#[utoipa::path(
    delete,
    path = "/items/{variant_id}",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    params(
        ("variant_id" = i32, Path, description = "Variant ID of the cart line")
    ),
    responses(
        (status = 200, description = "Removed item successfully", body = StdResponse<CartView, String>),
        (status = 404, description = "Variant is not in the cart")
    )
)]
async fn remove_item(
    Path(variant_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted = diesel::delete(cart_items::table.find((user.id, variant_id)))
        .execute(conn)
        .await
        .context("Failed to remove cart item")?;
    if deleted == 0 {
        return Err(AppError::NotFound);
    }

    let cart = load_cart(conn, user.id).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Removed item successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct MergeCartReq {
    pub items: Vec<AddCartItemReq>,
}

/// Merge the guest cart kept on the client into the server cart after login.
/// Unknown or sold-out variants are skipped.
#[utoipa::path(
    post,
    path = "/merge",
    tags = ["Cart"],
    security(("bearerAuth" = [])),
    request_body = MergeCartReq,
    responses(
        (status = 200, description = "Merged cart successfully", body = StdResponse<CartView, String>)
    )
)]
async fn merge_cart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<MergeCartReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = conn
        .transaction(move |conn| {
            Box::pin(async move {
                for item in body.items {
                    let stock = match variant_stock(conn, item.variant_id).await {
                        Ok(stock) => stock,
                        Err(AppError::NotFound) => {
                            warn!(
                                variant_id = item.variant_id,
                                "Skipping unknown variant in guest cart"
                            );
                            continue;
                        }
                        Err(err) => return Err(err),
                    };
                    let existing = existing_quantity(conn, user.id, item.variant_id)
                        .await?
                        .unwrap_or(0);

                    match cart::merge_quantity(existing, item.quantity, stock) {
                        Ok(quantity) => {
                            upsert_quantity(conn, user.id, item.variant_id, quantity).await?
                        }
                        Err(err) => {
                            warn!(variant_id = item.variant_id, "Skipping guest cart line: {}", err)
                        }
                    }
                }

                load_cart(conn, user.id).await
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Merged cart successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(
        variant_id: i32,
        price: i64,
        quantity: i32,
    ) -> (CartItemEntity, VariantEntity, ProductEntity) {
        let now = Utc::now();
        (
            CartItemEntity {
                user_id: 1,
                variant_id,
                quantity,
                created_at: now,
                updated_at: now,
            },
            VariantEntity {
                id: variant_id,
                product_id: 100 + variant_id,
                sku: format!("SKU-{variant_id}"),
                label: "M".into(),
                price,
                stock: 10,
                created_at: now,
                updated_at: now,
            },
            ProductEntity {
                id: 100 + variant_id,
                seller_id: 9,
                category_id: None,
                name: "Kurta".into(),
                description: String::new(),
                brand: None,
                mrp: price * 2,
                price,
                is_active: true,
                created_at: now,
                updated_at: now,
            },
        )
    }

    #[test]
    fn totals_cart_lines() {
        let view = CartView::from_rows(vec![row(1, 49_900, 2), row(2, 10_000, 1)]);
        assert_eq!(view.items.len(), 2);
        assert_eq!(view.items[0].line_total, 99_800);
        assert_eq!(view.item_count, 3);
        assert_eq!(view.subtotal, 109_800);
    }
}
