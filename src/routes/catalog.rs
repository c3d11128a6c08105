use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{
    BoolExpressionMethods, ExpressionMethods, NullableExpressionMethods, OptionalExtension, PgTextExpressionMethods, QueryDsl,
    SelectableHelper, dsl::sql, pg::Pg, sql_types::Bool,
};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    domain::catalog::{self, DiscountBand, PriceRange, ProductSort},
    models::{CategoryEntity, ProductEntity, VariantEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        pagination::{Page, Pagination},
    },
    schema::{categories, product_variants, products},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest(
            "/products",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_products))
                .routes(utoipa_axum::routes!(get_product)),
        )
        .nest(
            "/categories",
            OpenApiRouter::new().routes(utoipa_axum::routes!(get_categories)),
        )
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductFilters {
    /// Case-insensitive match on name or brand.
    pub q: Option<String>,
    pub category_id: Option<i32>,
    /// Category slug, alternative to `category_id`.
    pub category: Option<String>,
    pub brand: Option<String>,
    /// Minimum price in rupees.
    pub min_price: Option<i64>,
    /// Maximum price in rupees.
    pub under: Option<i64>,
    /// Discount band such as `20-40` or `60-`.
    pub discount: Option<String>,
    #[param(inline)]
    pub sort: Option<ProductSort>,
}

struct ParsedFilters {
    pattern: Option<String>,
    category_id: Option<i32>,
    category: Option<String>,
    brand: Option<String>,
    price: PriceRange,
    discount: Option<DiscountBand>,
}

impl ProductFilters {
    fn parse(&self) -> Result<ParsedFilters, AppError> {
        Ok(ParsedFilters {
            pattern: self.q.as_deref().and_then(catalog::search_pattern),
            category_id: self.category_id,
            category: self.category.clone(),
            brand: self.brand.clone(),
            price: PriceRange::from_rupees(self.min_price, self.under)?,
            discount: self
                .discount
                .as_deref()
                .map(str::parse::<DiscountBand>)
                .transpose()?,
        })
    }
}

fn discount_condition(band: &DiscountBand) -> String {
    let percent = "(CASE WHEN products.mrp > 0 AND products.price < products.mrp \
                   THEN (products.mrp - products.price) * 100 / products.mrp ELSE 0 END)";
    match band.upper {
        Some(upper) => format!("{percent} >= {} AND {percent} < {}", band.lower, upper),
        None => format!("{percent} >= {}", band.lower),
    }
}

fn filtered_products(filters: &ParsedFilters) -> products::BoxedQuery<'static, Pg> {
    let mut query = products::table
        .filter(products::is_active.eq(true))
        .into_boxed();

    if let Some(pattern) = &filters.pattern {
        query = query.filter(
            products::name
                .ilike(pattern.clone())
                .or(products::brand.ilike(pattern.clone())),
        );
    }
    if let Some(category_id) = filters.category_id {
        query = query.filter(products::category_id.eq(category_id));
    }
    if let Some(slug) = &filters.category {
        query = query.filter(
            products::category_id.eq_any(
                categories::table
                    .filter(categories::slug.eq(slug.clone()))
                    .select(categories::id.nullable()),
            ),
        );
    }
    if let Some(brand) = &filters.brand {
        query = query.filter(products::brand.eq(brand.clone()));
    }
    if let Some(min) = filters.price.min {
        query = query.filter(products::price.ge(min));
    }
    if let Some(max) = filters.price.max {
        query = query.filter(products::price.le(max));
    }
    if let Some(band) = &filters.discount {
        // Bounds are parsed integers, never raw input.
        query = query.filter(sql::<Bool>(&discount_condition(band)));
    }
    query
}

#[derive(Serialize, ToSchema)]
pub struct ProductCard {
    #[serde(flatten)]
    pub product: ProductEntity,
    pub discount_percent: i64,
}

impl From<ProductEntity> for ProductCard {
    fn from(product: ProductEntity) -> Self {
        Self {
            discount_percent: catalog::discount_percent(product.mrp, product.price),
            product,
        }
    }
}

/// Browse active products with search, price, discount and category filters.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Catalog"],
    params(ProductFilters, Pagination),
    responses(
        (status = 200, description = "List products", body = StdResponse<Page<ProductCard>, String>),
        (status = 400, description = "Invalid filter")
    )
)]
async fn get_products(
    State(state): State<AppState>,
    Query(filters): Query<ProductFilters>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let parsed = filters.parse()?;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let total: i64 = filtered_products(&parsed)
        .count()
        .get_result(conn)
        .await
        .context("Failed to count products")?;

    let query = filtered_products(&parsed);
    let query = match filters.sort.unwrap_or_default() {
        ProductSort::Newest => query.order_by(products::created_at.desc()),
        ProductSort::PriceAsc => query.order_by(products::price.asc()),
        ProductSort::PriceDesc => query.order_by(products::price.desc()),
    };
    let items: Vec<ProductEntity> = query
        .then_order_by(products::id.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(ProductEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get products")?;

    let page = Page::new(items, total, &pagination).map(ProductCard::from);
    Ok(StdResponse {
        data: Some(page),
        message: Some("Get products successfully"),
    })
}

#[derive(Serialize, ToSchema)]
pub struct ProductDetailRes {
    pub product: ProductCard,
    pub variants: Vec<VariantEntity>,
    pub category: Option<CategoryEntity>,
}

/// Fetch one active product with its variants.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Catalog"],
    params(
        ("id" = i32, Path, description = "Product ID to fetch")
    ),
    responses(
        (status = 200, description = "Get product successfully", body = StdResponse<ProductDetailRes, String>),
        (status = 404, description = "Product not found")
    )
)]
async fn get_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product: ProductEntity = products::table
        .find(id)
        .filter(products::is_active.eq(true))
        .select(ProductEntity::as_select())
        .get_result(conn)
        .await?;

    let variants: Vec<VariantEntity> = product_variants::table
        .filter(product_variants::product_id.eq(product.id))
        .order_by(product_variants::id.asc())
        .select(VariantEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get variants")?;

    let category = match product.category_id {
        Some(category_id) => categories::table
            .find(category_id)
            .select(CategoryEntity::as_select())
            .first(conn)
            .await
            .optional()
            .context("Failed to get category")?,
        None => None,
    };

    Ok(StdResponse {
        data: Some(ProductDetailRes {
            product: product.into(),
            variants,
            category,
        }),
        message: Some("Get product successfully"),
    })
}

/// List all categories ordered by name.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Catalog"],
    responses(
        (status = 200, description = "List categories", body = StdResponse<Vec<CategoryEntity>, String>)
    )
)]
async fn get_categories(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let categories: Vec<CategoryEntity> = categories::table
        .order_by(categories::name.asc())
        .select(CategoryEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get categories")?;

    Ok(StdResponse {
        data: Some(categories),
        message: Some("Get categories successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_condition_uses_half_open_band() {
        let band: DiscountBand = "20-40".parse().unwrap();
        let condition = discount_condition(&band);
        assert!(condition.contains(">= 20"));
        assert!(condition.contains("< 40"));

        let open: DiscountBand = "60-".parse().unwrap();
        assert!(!discount_condition(&open).contains(" < 60"));
    }

    #[test]
    fn rejects_inverted_price_range() {
        let filters = ProductFilters {
            min_price: Some(500),
            under: Some(100),
            ..Default::default()
        };
        assert!(matches!(filters.parse(), Err(AppError::BadRequest(_))));
    }
}
