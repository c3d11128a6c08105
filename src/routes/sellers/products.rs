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
    models::{
        CreateProductEntity, CreateVariantEntity, ProductEntity, UpdateProductEntity,
        VariantEntity,
    },
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, CurrentUser},
        pagination::{Page, Pagination},
    },
    schema::{product_variants, products},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/seller",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_my_products))
            .routes(utoipa_axum::routes!(create_product))
            .routes(utoipa_axum::routes!(update_product))
            .routes(utoipa_axum::routes!(create_variant))
            .routes(utoipa_axum::routes!(update_stock))
            .routes(utoipa_axum::routes!(get_low_stock))
            .route_layer(axum::middleware::from_fn(middleware::sellers_authorization)),
    )
}

fn check_prices(mrp: i64, price: i64) -> Result<(), AppError> {
    if price <= 0 || mrp <= 0 {
        return Err(AppError::BadRequest("prices must be positive".into()));
    }
    if price > mrp {
        return Err(AppError::BadRequest(
            "price cannot be above the MRP".into(),
        ));
    }
    Ok(())
}

/// Absolute stock level or a relative adjustment. Exactly one must be set.
#[derive(Deserialize, ToSchema, Debug, Default, Clone, Copy)]
pub struct StockChange {
    pub stock: Option<i32>,
    pub delta: Option<i32>,
}

impl StockChange {
    pub fn apply(&self, current: i32) -> Result<i32, AppError> {
        let next = match (self.stock, self.delta) {
            (Some(stock), None) => Some(stock),
            (None, Some(delta)) => current.checked_add(delta),
            _ => {
                return Err(AppError::BadRequest(
                    "provide either stock or delta".into(),
                ));
            }
        };
        next.filter(|stock| *stock >= 0)
            .ok_or_else(|| AppError::BadRequest("stock cannot go below zero".into()))
    }
}

async fn owned_product(
    conn: &mut AsyncPgConnection,
    product_id: i32,
    seller_id: i32,
) -> Result<ProductEntity, AppError> {
    let product = products::table
        .find(product_id)
        .filter(products::seller_id.eq(seller_id))
        .select(ProductEntity::as_select())
        .get_result(conn)
        .await?;
    Ok(product)
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ProductWithVariants {
    pub product: ProductEntity,
    pub variants: Vec<VariantEntity>,
}

/// Fetch the authenticated seller's products, including inactive ones.
#[utoipa::path(
    get,
    path = "/products",
    tags = ["Seller inventory"],
    security(("bearerAuth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "List my products", body = StdResponse<Page<ProductWithVariants>, String>)
    )
)]
async fn get_my_products(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let total: i64 = products::table
        .filter(products::seller_id.eq(user.id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count products")?;

    let products: Vec<ProductEntity> = products::table
        .filter(products::seller_id.eq(user.id))
        .order_by(products::updated_at.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(ProductEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get products")?;

    let ids: Vec<i32> = products.iter().map(|product| product.id).collect();
    let variants: Vec<VariantEntity> = product_variants::table
        .filter(product_variants::product_id.eq_any(&ids))
        .order_by(product_variants::id.asc())
        .select(VariantEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get variants")?;

    let page = Page::new(products, total, &pagination).map(|product| ProductWithVariants {
        variants: variants
            .iter()
            .filter(|variant| variant.product_id == product.id)
            .cloned()
            .collect(),
        product,
    });

    Ok(StdResponse {
        data: Some(page),
        message: Some("Get my products successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct CreateVariantReq {
    pub sku: String,
    pub label: String,
    pub price: i64,
    #[serde(default)]
    pub stock: i32,
}

impl CreateVariantReq {
    fn into_entity(self, product_id: i32) -> Result<CreateVariantEntity, AppError> {
        if self.price <= 0 || self.stock < 0 {
            return Err(AppError::BadRequest(
                "variant price must be positive and stock non-negative".into(),
            ));
        }
        Ok(CreateVariantEntity {
            product_id,
            sku: self.sku,
            label: self.label,
            price: self.price,
            stock: self.stock,
        })
    }
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateProductReq {
    pub category_id: Option<i32>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub brand: Option<String>,
    pub mrp: i64,
    pub price: i64,
    #[serde(default)]
    pub variants: Vec<CreateVariantReq>,
}

/// List a new product together with its first variants.
#[utoipa::path(
    post,
    path = "/products",
    tags = ["Seller inventory"],
    security(("bearerAuth" = [])),
    request_body = CreateProductReq,
    responses(
        (status = 200, description = "Created product successfully", body = StdResponse<ProductWithVariants, String>),
        (status = 400, description = "Invalid prices or variants"),
        (status = 409, description = "SKU already exists")
    )
)]
async fn create_product(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateProductReq>,
) -> Result<impl IntoResponse, AppError> {
    check_prices(body.mrp, body.price)?;
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let created = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let product: ProductEntity = diesel::insert_into(products::table)
                    .values(CreateProductEntity {
                        seller_id: user.id,
                        category_id: body.category_id,
                        name: body.name.trim().to_string(),
                        description: body.description,
                        brand: body.brand,
                        mrp: body.mrp,
                        price: body.price,
                    })
                    .returning(ProductEntity::as_returning())
                    .get_result(conn)
                    .await?;

                let new_variants = body
                    .variants
                    .into_iter()
                    .map(|variant| variant.into_entity(product.id))
                    .collect::<Result<Vec<_>, _>>()?;

                let variants: Vec<VariantEntity> = if new_variants.is_empty() {
                    Vec::new()
                } else {
                    diesel::insert_into(product_variants::table)
                        .values(&new_variants)
                        .returning(VariantEntity::as_returning())
                        .get_results(conn)
                        .await?
                };

                Ok::<ProductWithVariants, AppError>(ProductWithVariants { product, variants })
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(created),
        message: Some("Created product successfully"),
    })
}

/// Edit a product owned by the authenticated seller.
#[utoipa::path(
    patch,
    path = "/products/{id}",
    tags = ["Seller inventory"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID to update")
    ),
    request_body = UpdateProductEntity,
    responses(
        (status = 200, description = "Updated product successfully", body = StdResponse<ProductEntity, String>),
        (status = 404, description = "Product not found")
    )
)]
async fn update_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<UpdateProductEntity>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product = owned_product(conn, id, user.id).await?;
    check_prices(
        body.mrp.unwrap_or(product.mrp),
        body.price.unwrap_or(product.price),
    )?;

    let updated: ProductEntity = diesel::update(products::table.find(product.id))
        .set((&body, products::updated_at.eq(diesel::dsl::now)))
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(updated),
        message: Some("Updated product successfully"),
    })
}

/// Add a variant (size, colour, pack) to a product.
#[utoipa::path(
    post,
    path = "/products/{id}/variants",
    tags = ["Seller inventory"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Product ID")
    ),
    request_body = CreateVariantReq,
    responses(
        (status = 200, description = "Created variant successfully", body = StdResponse<VariantEntity, String>),
        (status = 404, description = "Product not found"),
        (status = 409, description = "SKU already exists")
    )
)]
async fn create_variant(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateVariantReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product = owned_product(conn, id, user.id).await?;
    let variant: VariantEntity = diesel::insert_into(product_variants::table)
        .values(body.into_entity(product.id)?)
        .returning(VariantEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(variant),
        message: Some("Created variant successfully"),
    })
}

/// Set or adjust the stock of a variant.
#[utoipa::path(
    patch,
    path = "/variants/{id}/stock",
    tags = ["Seller inventory"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Variant ID")
    ),
    request_body = StockChange,
    responses(
        (status = 200, description = "Updated stock successfully", body = StdResponse<VariantEntity, String>),
        (status = 400, description = "Stock would go negative"),
        (status = 404, description = "Variant not found")
    )
)]
async fn update_stock(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<StockChange>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let variant = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let variant: VariantEntity = product_variants::table
                    .find(id)
                    .filter(
                        product_variants::product_id.eq_any(
                            products::table
                                .filter(products::seller_id.eq(user.id))
                                .select(products::id),
                        ),
                    )
                    .for_update()
                    .select(VariantEntity::as_select())
                    .get_result(conn)
                    .await?;

                let stock = body.apply(variant.stock)?;

                let updated: VariantEntity =
                    diesel::update(product_variants::table.find(variant.id))
                        .set((
                            product_variants::stock.eq(stock),
                            product_variants::updated_at.eq(diesel::dsl::now),
                        ))
                        .returning(VariantEntity::as_returning())
                        .get_result(conn)
                        .await
                        .context("Failed to update stock")?;

                Ok::<VariantEntity, AppError>(updated)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(variant),
        message: Some("Updated stock successfully"),
    })
}

/// Variants at or below the low-stock threshold.
#[utoipa::path(
    get,
    path = "/inventory/low-stock",
    tags = ["Seller inventory"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List low-stock variants", body = StdResponse<Vec<VariantEntity>, String>)
    )
)]
async fn get_low_stock(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let threshold = state.config.storefront.low_stock_threshold;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let variants: Vec<VariantEntity> = product_variants::table
        .inner_join(products::table)
        .filter(products::seller_id.eq(user.id))
        .filter(product_variants::stock.le(threshold))
        .order_by((product_variants::stock.asc(), product_variants::id.asc()))
        .select(VariantEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get low-stock variants")?;

    Ok(StdResponse {
        data: Some(variants),
        message: Some("Get low-stock variants successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_absolute_and_relative_changes() {
        let absolute = StockChange {
            stock: Some(12),
            delta: None,
        };
        let relative = StockChange {
            stock: None,
            delta: Some(-3),
        };
        assert_eq!(absolute.apply(5).unwrap(), 12);
        assert_eq!(relative.apply(5).unwrap(), 2);
    }

    #[test]
    fn rejects_ambiguous_or_negative_changes() {
        assert!(StockChange::default().apply(5).is_err());
        assert!(
            StockChange {
                stock: Some(1),
                delta: Some(1)
            }
            .apply(5)
            .is_err()
        );
        assert!(
            StockChange {
                stock: None,
                delta: Some(-6)
            }
            .apply(5)
            .is_err()
        );
    }

    #[test]
    fn price_must_not_exceed_mrp() {
        assert!(check_prices(1_000, 900).is_ok());
        assert!(check_prices(1_000, 1_100).is_err());
        assert!(check_prices(0, 0).is_err());
    }
}
