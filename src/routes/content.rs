use std::collections::BTreeMap;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    models::{ContentPageEntity, FooterLinkEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    schema::{content_pages, footer_links},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/content",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_page))
            .routes(utoipa_axum::routes!(get_footer)),
    )
}

/// Fetch a published static page such as `about-us` or `privacy-policy`.
#[utoipa::path(
    get,
    path = "/pages/{slug}",
    tags = ["Content"],
    params(
        ("slug" = String, Path, description = "Page slug")
    ),
    responses(
        (status = 200, description = "Get page successfully", body = StdResponse<ContentPageEntity, String>),
        (status = 404, description = "No published page with this slug")
    )
)]
async fn get_page(
    Path(slug): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let page: ContentPageEntity = content_pages::table
        .filter(content_pages::slug.eq(slug))
        .filter(content_pages::is_published.eq(true))
        .select(ContentPageEntity::as_select())
        .first(conn)
        .await?;

    Ok(StdResponse {
        data: Some(page),
        message: Some("Get page successfully"),
    })
}

#[derive(Serialize, ToSchema, Debug)]
pub struct FooterSection {
    pub section: String,
    pub links: Vec<FooterLinkEntity>,
}

/// Groups links by section, keeping each section's links in `position` order.
pub fn group_footer(links: Vec<FooterLinkEntity>) -> Vec<FooterSection> {
    let mut sections: BTreeMap<String, Vec<FooterLinkEntity>> = BTreeMap::new();
    for link in links {
        sections.entry(link.section.clone()).or_default().push(link);
    }

    sections
        .into_iter()
        .map(|(section, mut links)| {
            links.sort_by_key(|link| (link.position, link.id));
            FooterSection { section, links }
        })
        .collect()
}

/// Footer links grouped by section.
#[utoipa::path(
    get,
    path = "/footer",
    tags = ["Content"],
    responses(
        (status = 200, description = "Get footer successfully", body = StdResponse<Vec<FooterSection>, String>)
    )
)]
async fn get_footer(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let links: Vec<FooterLinkEntity> = footer_links::table
        .select(FooterLinkEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get footer links")?;

    Ok(StdResponse {
        data: Some(group_footer(links)),
        message: Some("Get footer successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: i32, section: &str, position: i32) -> FooterLinkEntity {
        FooterLinkEntity {
            id,
            section: section.into(),
            label: format!("link {id}"),
            url: format!("/l/{id}"),
            position,
        }
    }

    #[test]
    fn groups_and_orders_links() {
        let sections = group_footer(vec![
            link(1, "Help", 2),
            link(2, "About", 0),
            link(3, "Help", 1),
        ]);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].section, "About");
        assert_eq!(
            sections[1].links.iter().map(|l| l.id).collect::<Vec<_>>(),
            vec![3, 1]
        );
    }
}
