use std::collections::BTreeSet;

use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    domain::{
        checkout::{self, CheckoutLine, OrderTotals},
        order_status::OrderStatus,
    },
    events::{self, OrderPlacedEvent},
    models::{
        CartItemEntity, CreateOrderEntity, CreateOrderItemEntity, OrderEntity, OrderItemEntity,
        PaymentEntity, ProductEntity, VariantEntity,
    },
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, CurrentUser},
        outbox,
        pagination::{Page, Pagination},
    },
    schema::{cart_items, order_items, orders, payments, product_variants, products},
    services::{self, orders as order_service, rewards},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/buyer/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_order))
            .routes(utoipa_axum::routes!(get_my_orders))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(cancel_order))
            .route_layer(axum::middleware::from_fn(middleware::buyers_authorization)),
    )
}

#[derive(Serialize, ToSchema, Debug)]
pub struct OrderWithItems {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
}

pub(crate) async fn attach_items(
    conn: &mut AsyncPgConnection,
    orders: Vec<OrderEntity>,
) -> Result<Vec<OrderWithItems>, AppError> {
    let ids: Vec<i32> = orders.iter().map(|order| order.id).collect();
    let mut items = order_service::load_items(conn, &ids).await?;

    Ok(orders
        .into_iter()
        .map(|order| OrderWithItems {
            items: items.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect())
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateOrderReq {
    /// Delivery address as entered at checkout.
    #[schema(value_type = Object)]
    pub shipping_address: Value,
    #[serde(default)]
    pub points_to_redeem: i64,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct CreateOrderRes {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
    pub totals: OrderTotals,
}

/// Place an order for everything in the buyer's cart.
///
/// Runs in one transaction: variant rows are locked, stock is checked and
/// decremented, points are redeemed and the cart is emptied.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    request_body = CreateOrderReq,
    responses(
        (status = 200, description = "Created order successfully", body = StdResponse<CreateOrderRes, String>),
        (status = 400, description = "Empty cart, bad address or not enough points"),
        (status = 409, description = "A cart line exceeds the available stock")
    )
)]
async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    if !body.shipping_address.is_object() {
        return Err(AppError::BadRequest(
            "shipping_address must be an object".into(),
        ));
    }
    if body.points_to_redeem < 0 {
        return Err(AppError::BadRequest(
            "points_to_redeem cannot be negative".into(),
        ));
    }

    let rules = state.config.storefront.checkout;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let created = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let cart: Vec<(CartItemEntity, VariantEntity, ProductEntity)> = cart_items::table
                    .inner_join(product_variants::table.inner_join(products::table))
                    .filter(cart_items::user_id.eq(user.id))
                    .filter(products::is_active.eq(true))
                    .order_by(product_variants::id.asc())
                    .for_update()
                    .select((
                        CartItemEntity::as_select(),
                        VariantEntity::as_select(),
                        ProductEntity::as_select(),
                    ))
                    .get_results(conn)
                    .await
                    .context("Failed to get cart")?;

                let lines: Vec<CheckoutLine> = cart
                    .iter()
                    .map(|(item, variant, _)| CheckoutLine {
                        variant_id: variant.id,
                        unit_price: variant.price,
                        quantity: item.quantity,
                        stock: variant.stock,
                    })
                    .collect();

                rewards::lock_account(conn, user.id).await?;
                let points_balance = rewards::balance(conn, user.id).await?;
                let totals =
                    checkout::price_order(&lines, points_balance, body.points_to_redeem, &rules)?;

                let order: OrderEntity = diesel::insert_into(orders::table)
                    .values(CreateOrderEntity {
                        order_number: services::order_number(services::ORDER_PREFIX),
                        buyer_id: user.id,
                        status: OrderStatus::Pending.as_str().into(),
                        subtotal: totals.subtotal,
                        shipping_fee: totals.shipping_fee,
                        discount: totals.discount,
                        total: totals.total,
                        points_redeemed: totals.points_redeemed,
                        shipping_address: body.shipping_address,
                    })
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create order")?;

                let new_items: Vec<CreateOrderItemEntity> = cart
                    .iter()
                    .map(|(item, variant, product)| CreateOrderItemEntity {
                        order_id: order.id,
                        product_id: product.id,
                        variant_id: variant.id,
                        seller_id: product.seller_id,
                        product_name: format!("{} ({})", product.name, variant.label),
                        unit_price: variant.price,
                        quantity: item.quantity,
                        total_price: variant.price * i64::from(item.quantity),
                    })
                    .collect();

                let items: Vec<OrderItemEntity> = diesel::insert_into(order_items::table)
                    .values(&new_items)
                    .returning(OrderItemEntity::as_returning())
                    .get_results(conn)
                    .await
                    .context("Failed to create order items")?;

                for (item, variant, _) in &cart {
                    diesel::update(product_variants::table.find(variant.id))
                        .set((
                            product_variants::stock.eq(product_variants::stock - item.quantity),
                            product_variants::updated_at.eq(diesel::dsl::now),
                        ))
                        .execute(conn)
                        .await
                        .context("Failed to decrement stock")?;
                }

                if totals.points_redeemed > 0 {
                    rewards::append(
                        conn,
                        user.id,
                        -totals.points_redeemed,
                        rewards::REASON_REDEEMED,
                        Some(order.id),
                    )
                    .await?;
                }

                // Lines of deactivated products stay in the cart.
                let ordered: Vec<i32> = cart.iter().map(|(item, _, _)| item.variant_id).collect();
                diesel::delete(
                    cart_items::table
                        .filter(cart_items::user_id.eq(user.id))
                        .filter(cart_items::variant_id.eq_any(ordered)),
                )
                .execute(conn)
                .await
                .context("Failed to remove ordered lines from cart")?;

                let seller_ids: BTreeSet<i32> = items.iter().map(|item| item.seller_id).collect();
                outbox::publish(
                    conn,
                    events::ORDER_PLACED.into(),
                    OrderPlacedEvent {
                        order_id: order.id,
                        order_number: order.order_number.clone(),
                        buyer_id: user.id,
                        seller_ids: seller_ids.into_iter().collect(),
                        total: order.total,
                    },
                )
                .await?;

                Ok::<CreateOrderRes, AppError>(CreateOrderRes {
                    order,
                    items,
                    totals,
                })
            })
        })
        .await?;

    info!(
        order_id = created.order.id,
        buyer_id = user.id,
        total = created.totals.total,
        "Order placed"
    );

    Ok(StdResponse {
        data: Some(created),
        message: Some("Created order successfully"),
    })
}

/// Fetch the authenticated buyer's orders, newest first.
#[utoipa::path(
    get,
    path = "/my-orders",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "List my orders", body = StdResponse<Page<OrderWithItems>, String>)
    )
)]
async fn get_my_orders(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let total: i64 = orders::table
        .filter(orders::buyer_id.eq(user.id))
        .count()
        .get_result(conn)
        .await
        .context("Failed to count orders")?;

    let orders: Vec<OrderEntity> = orders::table
        .filter(orders::buyer_id.eq(user.id))
        .order_by(orders::created_at.desc())
        .limit(pagination.per_page())
        .offset(pagination.offset())
        .select(OrderEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get my orders")?;

    let orders = attach_items(conn, orders).await?;

    Ok(StdResponse {
        data: Some(Page::new(orders, total, &pagination)),
        message: Some("Get my orders successfully"),
    })
}

#[derive(Serialize, ToSchema, Debug)]
pub struct GetOrderRes {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
    pub payments: Vec<PaymentEntity>,
}

/// Fetch a specific order belonging to the authenticated buyer.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<GetOrderRes, String>),
        (status = 404, description = "Order not found")
    )
)]
async fn get_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: OrderEntity = orders::table
        .find(id)
        .filter(orders::buyer_id.eq(user.id))
        .select(OrderEntity::as_select())
        .get_result(conn)
        .await?;

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .order_by(order_items::id.asc())
        .select(OrderItemEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let payments: Vec<PaymentEntity> = payments::table
        .filter(payments::order_id.eq(order.id))
        .order_by(payments::created_at.desc())
        .select(PaymentEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get payments")?;

    Ok(StdResponse {
        data: Some(GetOrderRes {
            order,
            items,
            payments,
        }),
        message: Some("Get order successfully"),
    })
}

/// Cancel an order that has not started processing. Stock and redeemed
/// points are returned.
#[utoipa::path(
    post,
    path = "/{id}/cancel",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to cancel")
    ),
    responses(
        (status = 200, description = "Cancelled order successfully", body = StdResponse<OrderEntity, String>),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order can no longer be cancelled")
    )
)]
async fn cancel_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let rules = state.config.storefront.checkout;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cancelled = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order: OrderEntity = orders::table
                    .find(id)
                    .filter(orders::buyer_id.eq(user.id))
                    .for_update()
                    .select(OrderEntity::as_select())
                    .get_result(conn)
                    .await?;

                let status: OrderStatus = order.status.parse()?;
                if !status.buyer_may_cancel() {
                    return Err(AppError::Conflict(format!(
                        "orders that are {} can no longer be cancelled",
                        status
                    )));
                }

                order_service::change_status(conn, &order, OrderStatus::Cancelled, &rules).await
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(cancelled),
        message: Some("Cancelled order successfully"),
    })
}
