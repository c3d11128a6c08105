//! Back office for admins and co-admins. Everything is nested under `/admin`.

use utoipa_axum::router::OpenApiRouter;

use crate::platform::{app_state::AppState, middleware};

pub mod bulk;
pub mod catalog;
pub mod content;
pub mod distributors;
pub mod orders;
pub mod returns;

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/admin",
        OpenApiRouter::new()
            .merge(orders::routes_with_openapi())
            .merge(returns::routes_with_openapi())
            .merge(distributors::routes_with_openapi())
            .merge(bulk::routes_with_openapi())
            .merge(catalog::routes_with_openapi())
            .merge(content::routes_with_openapi())
            .route_layer(axum::middleware::from_fn(middleware::admins_authorization)),
    )
}
