use anyhow::Context;
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper, upsert::excluded};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    models::{ContentPageEntity, FooterLinkEntity, UpsertContentPageEntity, UpsertFooterLinkEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    routes::admin::catalog::slugify,
    schema::{content_pages, footer_links},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/content",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_pages))
            .routes(utoipa_axum::routes!(upsert_page))
            .routes(utoipa_axum::routes!(delete_page))
            .routes(utoipa_axum::routes!(create_footer_link))
            .routes(utoipa_axum::routes!(update_footer_link))
            .routes(utoipa_axum::routes!(delete_footer_link)),
    )
}

/// All pages including drafts.
#[utoipa::path(
    get,
    path = "/pages",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List pages", body = StdResponse<Vec<ContentPageEntity>, String>)
    )
)]
async fn get_pages(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let pages: Vec<ContentPageEntity> = content_pages::table
        .order_by(content_pages::slug.asc())
        .select(ContentPageEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get pages")?;

    Ok(StdResponse {
        data: Some(pages),
        message: Some("Get pages successfully"),
    })
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct UpsertPageReq {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub is_published: bool,
}

/// Create or replace the page stored under `slug`.
#[utoipa::path(
    put,
    path = "/pages/{slug}",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("slug" = String, Path, description = "Page slug")
    ),
    request_body = UpsertPageReq,
    responses(
        (status = 200, description = "Saved page successfully", body = StdResponse<ContentPageEntity, String>),
        (status = 400, description = "Missing title or invalid slug")
    )
)]
async fn upsert_page(
    Path(slug): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<UpsertPageReq>,
) -> Result<impl IntoResponse, AppError> {
    let slug = slugify(&slug);
    if slug.is_empty() || body.title.trim().is_empty() {
        return Err(AppError::BadRequest("page slug and title are required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let page: ContentPageEntity = diesel::insert_into(content_pages::table)
        .values(UpsertContentPageEntity {
            slug,
            title: body.title.trim().to_string(),
            body: body.body,
            is_published: body.is_published,
        })
        .on_conflict(content_pages::slug)
        .do_update()
        .set((
            content_pages::title.eq(excluded(content_pages::title)),
            content_pages::body.eq(excluded(content_pages::body)),
            content_pages::is_published.eq(excluded(content_pages::is_published)),
            content_pages::updated_at.eq(diesel::dsl::now),
        ))
        .returning(ContentPageEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to save page")?;

    Ok(StdResponse {
        data: Some(page),
        message: Some("Saved page successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/pages/{slug}",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("slug" = String, Path, description = "Page slug")
    ),
    responses(
        (status = 200, description = "Deleted page successfully", body = StdResponse<ContentPageEntity, String>),
        (status = 404, description = "Page not found")
    )
)]
async fn delete_page(
    Path(slug): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted: ContentPageEntity =
        diesel::delete(content_pages::table.filter(content_pages::slug.eq(slug)))
            .returning(ContentPageEntity::as_returning())
            .get_result(conn)
            .await?;

    Ok(StdResponse {
        data: Some(deleted),
        message: Some("Deleted page successfully"),
    })
}

fn check_link(link: &UpsertFooterLinkEntity) -> Result<(), AppError> {
    if link.section.trim().is_empty() || link.label.trim().is_empty() {
        return Err(AppError::BadRequest("footer link section and label are required".into()));
    }
    let url = link.url.as_str();
    if !(url.starts_with('/') || url.starts_with("https://") || url.starts_with("http://")) {
        return Err(AppError::BadRequest(format!("invalid footer link url: {}", link.url)));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/footer-links",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    request_body = UpsertFooterLinkEntity,
    responses(
        (status = 200, description = "Created footer link successfully", body = StdResponse<FooterLinkEntity, String>),
        (status = 400, description = "Invalid link")
    )
)]
async fn create_footer_link(
    State(state): State<AppState>,
    Json(body): Json<UpsertFooterLinkEntity>,
) -> Result<impl IntoResponse, AppError> {
    check_link(&body)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let link: FooterLinkEntity = diesel::insert_into(footer_links::table)
        .values(&body)
        .returning(FooterLinkEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create footer link")?;

    Ok(StdResponse {
        data: Some(link),
        message: Some("Created footer link successfully"),
    })
}

#[utoipa::path(
    put,
    path = "/footer-links/{id}",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Footer link ID")
    ),
    request_body = UpsertFooterLinkEntity,
    responses(
        (status = 200, description = "Updated footer link successfully", body = StdResponse<FooterLinkEntity, String>),
        (status = 404, description = "Footer link not found")
    )
)]
async fn update_footer_link(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Json(body): Json<UpsertFooterLinkEntity>,
) -> Result<impl IntoResponse, AppError> {
    check_link(&body)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let link: FooterLinkEntity = diesel::update(footer_links::table.find(id))
        .set(&body)
        .returning(FooterLinkEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(link),
        message: Some("Updated footer link successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/footer-links/{id}",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Footer link ID")
    ),
    responses(
        (status = 200, description = "Deleted footer link successfully", body = StdResponse<FooterLinkEntity, String>),
        (status = 404, description = "Footer link not found")
    )
)]
async fn delete_footer_link(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted: FooterLinkEntity = diesel::delete(footer_links::table.find(id))
        .returning(FooterLinkEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(deleted),
        message: Some("Deleted footer link successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str) -> UpsertFooterLinkEntity {
        UpsertFooterLinkEntity {
            section: "Help".into(),
            label: "Returns".into(),
            url: url.into(),
            position: 0,
        }
    }

    #[test]
    fn accepts_relative_and_absolute_urls() {
        assert!(check_link(&link("/pages/returns")).is_ok());
        assert!(check_link(&link("https://example.com/help")).is_ok());
    }

    #[test]
    fn rejects_script_urls() {
        assert!(matches!(
            check_link(&link("javascript:alert(1)")),
            Err(AppError::BadRequest(_))
        ));
    }
}
