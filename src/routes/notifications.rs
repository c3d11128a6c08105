use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    models::NotificationEntity,
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, CurrentUser},
        pagination::{Page, Pagination},
    },
    schema::notifications,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/notifications",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_notifications))
            .routes(utoipa_axum::routes!(get_unread_count))
            .routes(utoipa_axum::routes!(mark_read))
            .routes(utoipa_axum::routes!(mark_all_read))
            .routes(utoipa_axum::routes!(delete_notification))
            .route_layer(axum::middleware::from_fn(middleware::authenticated)),
    )
}

#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationFilter {
    #[serde(default)]
    pub unread_only: bool,
}

/// Notifications of the authenticated user, newest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Notifications"],
    security(("bearerAuth" = [])),
    params(NotificationFilter, Pagination),
    responses(
        (status = 200, description = "List notifications", body = StdResponse<Page<NotificationEntity>, String>)
    )
)]
async fn get_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<NotificationFilter>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mine = || {
        let mut query = notifications::table
            .filter(notifications::user_id.eq(user.id))
            .into_boxed();
        if filter.unread_only {
            query = query.filter(notifications::is_read.eq(false));
        }
        query
    };

    let total: i64 = mine()
        .count()
        .get_result(conn)
        .await
        .context("Failed to count notifications")?;

    let items: Vec<NotificationEntity> = mine()
        .order_by(notifications::id.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(NotificationEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get notifications")?;

    Ok(StdResponse {
        data: Some(Page::new(items, total, &pagination)),
        message: Some("Get notifications successfully"),
    })
}

#[derive(Serialize, ToSchema, Debug)]
pub struct UnreadCountRes {
    pub unread: i64,
}

/// Badge count for the notification bell.
#[utoipa::path(
    get,
    path = "/unread-count",
    tags = ["Notifications"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get unread count", body = StdResponse<UnreadCountRes, String>)
    )
)]
async fn get_unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let unread: i64 = notifications::table
        .filter(notifications::user_id.eq(user.id))
        .filter(notifications::is_read.eq(false))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count unread notifications")?;

    Ok(StdResponse {
        data: Some(UnreadCountRes { unread }),
        message: Some("Get unread count successfully"),
    })
}

#[utoipa::path(
    patch,
    path = "/{id}/read",
    tags = ["Notifications"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Marked notification read", body = StdResponse<NotificationEntity, String>),
        (status = 404, description = "Notification not found")
    )
)]
async fn mark_read(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let notification: NotificationEntity = diesel::update(
        notifications::table
            .find(id)
            .filter(notifications::user_id.eq(user.id)),
    )
    .set(notifications::is_read.eq(true))
    .returning(NotificationEntity::as_returning())
    .get_result(conn)
    .await?;

    Ok(StdResponse {
        data: Some(notification),
        message: Some("Marked notification read"),
    })
}

#[derive(Serialize, ToSchema, Debug)]
pub struct MarkAllReadRes {
    pub updated: usize,
}

#[utoipa::path(
    patch,
    path = "/read-all",
    tags = ["Notifications"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Marked all notifications read", body = StdResponse<MarkAllReadRes, String>)
    )
)]
async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated = diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user.id))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(conn)
    .await
    .context("Failed to mark notifications read")?;

    Ok(StdResponse {
        data: Some(MarkAllReadRes { updated }),
        message: Some("Marked all notifications read"),
    })
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Notifications"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Deleted notification", body = StdResponse<NotificationEntity, String>),
        (status = 404, description = "Notification not found")
    )
)]
async fn delete_notification(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted: NotificationEntity = diesel::delete(
        notifications::table
            .find(id)
            .filter(notifications::user_id.eq(user.id)),
    )
    .returning(NotificationEntity::as_returning())
    .get_result(conn)
    .await?;

    Ok(StdResponse {
        data: Some(deleted),
        message: Some("Deleted notification"),
    })
}
