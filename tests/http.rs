use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use storefront_service::{
    build_router,
    platform::{
        app_state::AppState,
        bootstrap::finalize_router,
        config, db,
        middleware::{Claims, JwtKeys, Role},
    },
};
use tower::ServiceExt;

const JWT_SECRET: &str = "router-test-secret";
const FAR_FUTURE: usize = 4_102_444_800;

fn app() -> Router {
    let config = config::load_from(|name| match name {
        "DATABASE_URL" => Some("postgres://localhost:5432/storefront_test".into()),
        "JWT_SECRET" => Some(JWT_SECRET.into()),
        "RAZORPAY_KEY_SECRET" => Some("rzp_test_secret".into()),
        _ => None,
    })
    .unwrap();

    // Connections are opened lazily, none of these paths reach the database.
    let pool = db::create_pool(&config.database);
    finalize_router(build_router(), AppState::new(pool, config))
}

fn token(role: Role) -> String {
    JwtKeys::from_secret(JWT_SECRET)
        .sign(&Claims {
            sub: 7,
            role,
            exp: FAR_FUTURE,
        })
        .unwrap()
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let response = app().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_bearer_is_unauthorized() {
    let response = app().oneshot(get("/api/buyer/cart", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("Authorization"));
}

#[tokio::test]
async fn garbage_bearer_is_unauthorized() {
    let response = app()
        .oneshot(get("/api/notifications", Some("not-a-jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_role_is_forbidden() {
    let seller = token(Role::Seller);
    let response = app()
        .oneshot(get("/api/buyer/cart", Some(&seller)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let distributor = token(Role::Distributor);
    let response = app()
        .oneshot(get("/api/admin/orders", Some(&distributor)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tampered_payment_signature_is_rejected() {
    let buyer = token(Role::Buyer);
    let payload = serde_json::json!({
        "razorpay_order_id": "order_Nx1",
        "razorpay_payment_id": "pay_Nx1",
        "razorpay_signature": "0000000000000000000000000000000000000000000000000000000000000000",
    });

    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/razorpay/verify")
        .header(header::AUTHORIZATION, format!("Bearer {}", buyer))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "invalid payment signature");
}

#[tokio::test]
async fn openapi_document_lists_route_groups() {
    let response = app()
        .oneshot(get("/api-docs/openapi.json", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let paths = json["paths"].as_object().unwrap();
    for path in [
        "/api/products/{id}",
        "/api/buyer/cart/merge",
        "/api/distributor/bulk-orders/{id}/cancel",
        "/api/admin/bulk-orders/{id}/status",
        "/api/notifications/read-all",
    ] {
        assert!(paths.contains_key(path), "missing {}", path);
    }
}
