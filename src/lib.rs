pub mod api;
pub mod consumers;
pub mod domain;
pub mod events;
pub mod messaging;
pub mod models;
pub mod platform;
pub mod routes;
pub mod schema;
pub mod services;

use axum::{Router, routing::get};
use utoipa_axum::router::OpenApiRouter;

use crate::platform::{app_state::AppState, swagger};

/// Every HTTP route of the service plus Swagger UI. State and layers are
/// attached later by [`platform::bootstrap::finalize_router`].
pub fn build_router() -> Router<AppState> {
    let api = OpenApiRouter::new()
        .merge(routes::catalog::routes_with_openapi())
        .merge(routes::content::routes_with_openapi())
        .merge(routes::buyers::carts::routes_with_openapi())
        .merge(routes::buyers::orders::routes_with_openapi())
        .merge(routes::buyers::returns::routes_with_openapi())
        .merge(routes::buyers::rewards::routes_with_openapi())
        .merge(routes::payments::routes_with_openapi())
        .merge(routes::sellers::products::routes_with_openapi())
        .merge(routes::sellers::orders::routes_with_openapi())
        .merge(routes::distributors::routes_with_openapi())
        .merge(routes::admin::routes_with_openapi())
        .merge(routes::notifications::routes_with_openapi());

    let (api, mut openapi) = OpenApiRouter::new().nest("/api", api).split_for_parts();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("Storefront Service API")
        .version(env!("CARGO_PKG_VERSION"))
        .build();

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .merge(swagger::create_swagger_ui(openapi))
}

async fn health() -> &'static str {
    "ok"
}
