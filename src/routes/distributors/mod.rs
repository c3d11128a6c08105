//! Routes for wholesale distributors (`role = distributor`), nested under
//! `/distributor`.

use utoipa_axum::router::OpenApiRouter;

use crate::platform::{app_state::AppState, middleware};

pub mod bulk_orders;
pub mod profile;

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/distributor",
        OpenApiRouter::new()
            .merge(profile::routes_with_openapi())
            .merge(bulk_orders::routes_with_openapi())
            .route_layer(axum::middleware::from_fn(
                middleware::distributors_authorization,
            )),
    )
}
