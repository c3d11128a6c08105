//! Checkout, returns, payments and ledger against a real database.
//!
//! Run with: cargo test --test db -- --ignored
//!
//! Requires: TEST_DATABASE_URL or PostgreSQL on localhost:5432 with a
//! `storefront_test` database. Migrations run on first use.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use storefront_service::{
    build_router,
    domain::ledger::LedgerEntryType,
    models::{
        CreateDistributorEntity, CreateOrderEntity, CreatePaymentEntity, CreateProductEntity,
        CreateReturnRequestEntity,
    },
    platform::{
        aliases::DbPool,
        app_state::AppState,
        bootstrap::finalize_router,
        config, db,
        middleware::{Claims, JwtKeys, Role},
    },
    schema::{
        cart_items, distributors, orders, payments, product_variants, products, return_requests,
    },
    services::{
        self,
        ledger::{self as ledger_service, NewLedgerEntry},
    },
};
use tokio::sync::OnceCell;
use tower::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
const JWT_SECRET: &str = "db-test-secret";
const RAZORPAY_SECRET: &str = "rzp_db_test_secret";
const FAR_FUTURE: usize = 4_102_444_800;

static MIGRATED: OnceCell<()> = OnceCell::const_new();

fn database_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost:5432/storefront_test".to_string())
}

async fn setup() -> (Router, DbPool) {
    let url = database_url();
    MIGRATED
        .get_or_init(|| async {
            db::run_migrations_blocking(MIGRATIONS, &database_url())
                .await
                .expect("Failed to migrate test database");
        })
        .await;

    let config = config::load_from(|name| match name {
        "DATABASE_URL" => Some(url.clone()),
        "JWT_SECRET" => Some(JWT_SECRET.into()),
        "RAZORPAY_KEY_SECRET" => Some(RAZORPAY_SECRET.into()),
        _ => None,
    })
    .unwrap();

    let pool = db::create_pool(&config.database);
    let app = finalize_router(build_router(), AppState::new(pool.clone(), config));
    (app, pool)
}

/// A user id no other test run has used.
fn fresh_user_id() -> i32 {
    (Uuid::new_v4().as_u128() % 1_000_000_000) as i32 + 1
}

fn token(user_id: i32, role: Role) -> String {
    JwtKeys::from_secret(JWT_SECRET)
        .sign(&Claims {
            sub: user_id,
            role,
            exp: FAR_FUTURE,
        })
        .unwrap()
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: &str,
    body: Value,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Inserts an active product with one variant and returns `(product_id, variant_id)`.
async fn seed_variant(pool: &DbPool, price: i64, stock: i32) -> (i32, i32) {
    let conn = &mut pool.get().await.unwrap();

    let product_id: i32 = diesel::insert_into(products::table)
        .values(CreateProductEntity {
            seller_id: fresh_user_id(),
            category_id: None,
            name: "Cotton Kurta".into(),
            description: String::new(),
            brand: None,
            mrp: price,
            price,
        })
        .returning(products::id)
        .get_result(conn)
        .await
        .unwrap();

    let variant_id: i32 = diesel::insert_into(product_variants::table)
        .values((
            product_variants::product_id.eq(product_id),
            product_variants::sku.eq(format!("SKU-{}", Uuid::new_v4().simple())),
            product_variants::label.eq("M"),
            product_variants::price.eq(price),
            product_variants::stock.eq(stock),
        ))
        .returning(product_variants::id)
        .get_result(conn)
        .await
        .unwrap();

    (product_id, variant_id)
}

async fn stock_of(pool: &DbPool, variant_id: i32) -> i32 {
    let conn = &mut pool.get().await.unwrap();
    product_variants::table
        .find(variant_id)
        .select(product_variants::stock)
        .first(conn)
        .await
        .unwrap()
}

async fn seed_order(pool: &DbPool, buyer_id: i32, status: &str, total: i64) -> i32 {
    let conn = &mut pool.get().await.unwrap();
    diesel::insert_into(orders::table)
        .values(CreateOrderEntity {
            order_number: services::order_number(services::ORDER_PREFIX),
            buyer_id,
            status: status.into(),
            subtotal: total,
            shipping_fee: 0,
            discount: 0,
            total,
            points_redeemed: 0,
            shipping_address: json!({ "city": "Pune" }),
        })
        .returning(orders::id)
        .get_result(conn)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn checkout_decrements_stock_and_cancel_restocks() {
    let (app, pool) = setup().await;
    let buyer = fresh_user_id();
    let bearer = token(buyer, Role::Buyer);
    let (_, variant_id) = seed_variant(&pool, 60_000, 10).await;

    let (status, _) = call(
        &app,
        "POST",
        "/api/buyer/cart/items",
        &bearer,
        json!({ "variant_id": variant_id, "quantity": 3 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, placed) = call(
        &app,
        "POST",
        "/api/buyer/orders",
        &bearer,
        json!({ "shipping_address": { "city": "Pune" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", placed);
    assert_eq!(stock_of(&pool, variant_id).await, 7);

    let order_id = placed["data"]["order"]["id"].as_i64().unwrap();
    let (status, cancelled) = call(
        &app,
        "POST",
        &format!("/api/buyer/orders/{}/cancel", order_id),
        &bearer,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", cancelled);
    assert_eq!(cancelled["data"]["status"], "cancelled");
    assert_eq!(stock_of(&pool, variant_id).await, 10);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn checkout_keeps_lines_of_deactivated_products_in_cart() {
    let (app, pool) = setup().await;
    let buyer = fresh_user_id();
    let bearer = token(buyer, Role::Buyer);
    let (_, kept) = seed_variant(&pool, 40_000, 5).await;
    let (retired_product, retired) = seed_variant(&pool, 40_000, 5).await;

    for variant_id in [kept, retired] {
        let (status, _) = call(
            &app,
            "POST",
            "/api/buyer/cart/items",
            &bearer,
            json!({ "variant_id": variant_id, "quantity": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    {
        let conn = &mut pool.get().await.unwrap();
        diesel::update(products::table.find(retired_product))
            .set(products::is_active.eq(false))
            .execute(conn)
            .await
            .unwrap();
    }

    let (status, placed) = call(
        &app,
        "POST",
        "/api/buyer/orders",
        &bearer,
        json!({ "shipping_address": { "city": "Pune" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", placed);
    assert_eq!(placed["data"]["items"].as_array().unwrap().len(), 1);

    let conn = &mut pool.get().await.unwrap();
    let left: Vec<i32> = cart_items::table
        .filter(cart_items::user_id.eq(buyer))
        .select(cart_items::variant_id)
        .load(conn)
        .await
        .unwrap();
    assert_eq!(left, vec![retired]);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn return_for_unknown_order_is_not_found() {
    let (app, _pool) = setup().await;
    let bearer = token(fresh_user_id(), Role::Buyer);

    let (status, _) = call(
        &app,
        "POST",
        "/api/buyer/returns",
        &bearer,
        json!({ "order_id": i32::MAX, "request_type": "refund", "reason": "damaged" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn completed_refund_blocks_another_refund() {
    let (app, pool) = setup().await;
    let buyer = fresh_user_id();
    let bearer = token(buyer, Role::Buyer);
    let order_id = seed_order(&pool, buyer, "delivered", 40_000).await;

    {
        let conn = &mut pool.get().await.unwrap();
        let request_id: i32 = diesel::insert_into(return_requests::table)
            .values(CreateReturnRequestEntity {
                order_id,
                buyer_id: buyer,
                request_type: "refund".into(),
                status: "completed".into(),
                reason: "damaged".into(),
            })
            .returning(return_requests::id)
            .get_result(conn)
            .await
            .unwrap();
        diesel::update(return_requests::table.find(request_id))
            .set(return_requests::refund_amount.eq(Some(40_000_i64)))
            .execute(conn)
            .await
            .unwrap();
    }

    let (status, body) = call(
        &app,
        "POST",
        "/api/buyer/returns",
        &bearer,
        json!({ "order_id": order_id, "request_type": "refund", "reason": "again" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "order has already been fully refunded");

    // A replacement pays nothing out and is still allowed.
    let (status, _) = call(
        &app,
        "POST",
        "/api/buyer/returns",
        &bearer,
        json!({ "order_id": order_id, "request_type": "replacement", "reason": "wrong size" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn payment_captured_after_cancel_is_flagged_for_refund() {
    let (app, pool) = setup().await;
    let buyer = fresh_user_id();
    let bearer = token(buyer, Role::Buyer);
    let order_id = seed_order(&pool, buyer, "cancelled", 25_000).await;
    let gateway_order_id = format!("order_{}", Uuid::new_v4().simple());

    {
        let conn = &mut pool.get().await.unwrap();
        diesel::insert_into(payments::table)
            .values(CreatePaymentEntity {
                id: Uuid::new_v4(),
                order_id,
                amount: 25_000,
                status: "pending".into(),
                provider: "razorpay".into(),
                provider_order_id: Some(gateway_order_id.clone()),
            })
            .execute(conn)
            .await
            .unwrap();
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(RAZORPAY_SECRET.as_bytes()).unwrap();
    mac.update(format!("{}|pay_late", gateway_order_id).as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let (status, _) = call(
        &app,
        "POST",
        "/api/payments/razorpay/verify",
        &bearer,
        json!({
            "razorpay_order_id": gateway_order_id,
            "razorpay_payment_id": "pay_late",
            "razorpay_signature": signature,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let conn = &mut pool.get().await.unwrap();
    let (payment_status, payment_id): (String, Option<String>) = payments::table
        .filter(payments::order_id.eq(order_id))
        .select((payments::status, payments::provider_payment_id))
        .first(conn)
        .await
        .unwrap();
    assert_eq!(payment_status, "refund_pending");
    assert_eq!(payment_id.as_deref(), Some("pay_late"));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn payment_entry_decreases_balance_by_its_amount() {
    let (_app, pool) = setup().await;
    let conn = &mut pool.get().await.unwrap();

    let distributor_id: i32 = diesel::insert_into(distributors::table)
        .values(CreateDistributorEntity {
            user_id: fresh_user_id(),
            business_name: "Sharma Traders".into(),
            phone: None,
            credit_limit: 100_000,
        })
        .returning(distributors::id)
        .get_result(conn)
        .await
        .unwrap();

    let entry = |entry_type, amount| NewLedgerEntry {
        entry_type,
        amount,
        payment_method: None,
        reference: None,
        note: None,
    };

    ledger_service::append_entry(conn, distributor_id, entry(LedgerEntryType::Order, 30_000))
        .await
        .unwrap();
    let before = ledger_service::current_balance(conn, distributor_id).await.unwrap();

    let payment = ledger_service::append_entry(
        conn,
        distributor_id,
        entry(LedgerEntryType::Payment, 12_000),
    )
    .await
    .unwrap();
    assert_eq!(payment.amount, -12_000);
    assert_eq!(payment.balance_after, before - 12_000);

    let summary = ledger_service::summary(conn, distributor_id).await.unwrap();
    assert_eq!(summary.total_ordered, 30_000);
    assert_eq!(summary.total_paid, 12_000);
    assert_eq!(summary.current_balance, 18_000);
    assert_eq!(summary.entry_count, 2);
}
