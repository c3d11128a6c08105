use anyhow::Context;
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    models::{CategoryEntity, CreateCategoryEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    schema::categories,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/categories",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_category))
            .routes(utoipa_axum::routes!(delete_category)),
    )
}

/// Lowercase ASCII slug with single dashes, e.g. `"Men's Shoes"` -> `"men-s-shoes"`.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateCategoryReq {
    pub name: String,
    /// Derived from `name` when omitted.
    pub slug: Option<String>,
    pub parent_id: Option<i32>,
}

impl CreateCategoryReq {
    pub fn into_entity(self) -> Result<CreateCategoryEntity, AppError> {
        let name = self.name.trim().to_string();
        let slug = slugify(self.slug.as_deref().unwrap_or(&name));
        if name.is_empty() || slug.is_empty() {
            return Err(AppError::BadRequest("category name is required".into()));
        }
        Ok(CreateCategoryEntity {
            name,
            slug,
            parent_id: self.parent_id,
        })
    }
}

#[utoipa::path(
    post,
    path = "/",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    request_body = CreateCategoryReq,
    responses(
        (status = 200, description = "Created category successfully", body = StdResponse<CategoryEntity, String>),
        (status = 400, description = "Missing name or unknown parent"),
        (status = 409, description = "Slug already in use")
    )
)]
async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryReq>,
) -> Result<impl IntoResponse, AppError> {
    let entity = body.into_entity()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let category: CategoryEntity = diesel::insert_into(categories::table)
        .values(&entity)
        .returning(CategoryEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(category),
        message: Some("Created category successfully"),
    })
}

/// Products in a deleted category become uncategorised.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "Deleted category successfully", body = StdResponse<CategoryEntity, String>),
        (status = 404, description = "Category not found")
    )
)]
async fn delete_category(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted: CategoryEntity = diesel::delete(categories::table.find(id))
        .returning(CategoryEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(deleted),
        message: Some("Deleted category successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_collapse_punctuation() {
        assert_eq!(slugify("Men's Shoes"), "men-s-shoes");
        assert_eq!(slugify("  Home & Kitchen "), "home-kitchen");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn explicit_slug_is_normalised() {
        let entity = CreateCategoryReq {
            name: "Kurtas".into(),
            slug: Some("Ethnic Wear".into()),
            parent_id: None,
        }
        .into_entity()
        .unwrap();
        assert_eq!(entity.slug, "ethnic-wear");
        assert_eq!(entity.name, "Kurtas");
    }
}
