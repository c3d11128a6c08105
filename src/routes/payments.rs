use anyhow::Context;
use axum::{Extension, Json, extract::State, response::IntoResponse};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    api::razorpay,
    domain::order_status::OrderStatus,
    events::{self, PaymentCapturedEvent},
    models::{CreatePaymentEntity, OrderEntity, PaymentEntity},
    platform::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, CurrentUser},
        outbox,
    },
    schema::{orders, payments},
    services::orders::{
        self as order_service, PAYMENT_PAID, PAYMENT_PENDING, PAYMENT_REFUND_PENDING,
    },
};

pub const PROVIDER_RAZORPAY: &str = "razorpay";

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/payments/razorpay",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_gateway_order))
            .routes(utoipa_axum::routes!(verify_payment))
            .route_layer(axum::middleware::from_fn(middleware::buyers_authorization)),
    )
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateGatewayOrderReq {
    pub order_id: i32,
}

/// Everything the checkout widget needs to open.
#[derive(Serialize, ToSchema, Debug)]
pub struct CreateGatewayOrderRes {
    pub payment: PaymentEntity,
    pub key_id: String,
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
}

/// Create a Razorpay order for a pending order. Repeated calls reuse the
/// pending payment.
#[utoipa::path(
    post,
    path = "/orders",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    request_body = CreateGatewayOrderReq,
    responses(
        (status = 200, description = "Created gateway order successfully", body = StdResponse<CreateGatewayOrderRes, String>),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is not awaiting payment"),
        (status = 502, description = "Razorpay is unreachable")
    )
)]
async fn create_gateway_order(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateGatewayOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: OrderEntity = orders::table
        .find(body.order_id)
        .filter(orders::buyer_id.eq(user.id))
        .select(OrderEntity::as_select())
        .get_result(conn)
        .await?;

    if order.status != OrderStatus::Pending.as_str() {
        return Err(AppError::Conflict(format!(
            "order {} is {} and cannot be paid",
            order.order_number, order.status
        )));
    }

    let razorpay_config = &state.config.razorpay;
    let existing: Option<PaymentEntity> = payments::table
        .filter(payments::order_id.eq(order.id))
        .filter(payments::status.eq(PAYMENT_PENDING))
        .filter(payments::provider.eq(PROVIDER_RAZORPAY))
        .filter(payments::provider_order_id.is_not_null())
        .select(PaymentEntity::as_select())
        .first(conn)
        .await
        .optional()
        .context("Failed to get pending payment")?;

    let payment = match existing {
        Some(payment) => payment,
        None => {
            let gateway_order = razorpay::create_order(
                &state.http_client,
                razorpay_config,
                order.total,
                &order.order_number,
            )
            .await?;

            diesel::insert_into(payments::table)
                .values(CreatePaymentEntity {
                    id: Uuid::new_v4(),
                    order_id: order.id,
                    amount: order.total,
                    status: PAYMENT_PENDING.into(),
                    provider: PROVIDER_RAZORPAY.into(),
                    provider_order_id: Some(gateway_order.id),
                })
                .returning(PaymentEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to create payment")?
        }
    };

    let gateway_order_id = payment.provider_order_id.clone().unwrap_or_default();
    Ok(StdResponse {
        data: Some(CreateGatewayOrderRes {
            amount: payment.amount,
            payment,
            key_id: razorpay_config.key_id.clone(),
            gateway_order_id,
            currency: razorpay_config.currency.clone(),
        }),
        message: Some("Created gateway order successfully"),
    })
}

/// Fields the Razorpay checkout hands back after a successful payment.
#[derive(Deserialize, ToSchema, Debug)]
pub struct VerifyPaymentReq {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct VerifyPaymentRes {
    pub payment: PaymentEntity,
    pub order: OrderEntity,
}

/// Status a captured payment lands in. Money captured for an order the buyer
/// already cancelled is owed back.
pub fn captured_payment_status(order_status: OrderStatus) -> &'static str {
    if order_status == OrderStatus::Cancelled {
        PAYMENT_REFUND_PENDING
    } else {
        PAYMENT_PAID
    }
}

enum Capture {
    Confirmed(PaymentEntity, OrderEntity),
    AfterCancel(PaymentEntity, OrderEntity),
}

/// Verify the checkout signature, mark the payment paid and confirm the order.
#[utoipa::path(
    post,
    path = "/verify",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    request_body = VerifyPaymentReq,
    responses(
        (status = 200, description = "Payment verified successfully", body = StdResponse<VerifyPaymentRes, String>),
        (status = 400, description = "Signature does not match"),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Order can no longer be confirmed")
    )
)]
async fn verify_payment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<VerifyPaymentReq>,
) -> Result<impl IntoResponse, AppError> {
    if !razorpay::verify_payment_signature(
        &state.config.razorpay.key_secret,
        &body.razorpay_order_id,
        &body.razorpay_payment_id,
        &body.razorpay_signature,
    ) {
        warn!(
            gateway_order_id = %body.razorpay_order_id,
            buyer_id = user.id,
            "Rejected payment with invalid signature"
        );
        return Err(AppError::BadRequest("invalid payment signature".into()));
    }

    let rules = state.config.storefront.checkout;
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let capture = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let payment: PaymentEntity = payments::table
                    .filter(payments::provider_order_id.eq(&body.razorpay_order_id))
                    .for_update()
                    .select(PaymentEntity::as_select())
                    .first(conn)
                    .await?;

                let order: OrderEntity = orders::table
                    .find(payment.order_id)
                    .filter(orders::buyer_id.eq(user.id))
                    .for_update()
                    .select(OrderEntity::as_select())
                    .get_result(conn)
                    .await?;

                // The gateway may call back twice for the same payment.
                if payment.status == PAYMENT_PAID
                    && payment.provider_payment_id.as_deref() == Some(&body.razorpay_payment_id)
                {
                    return Ok(Capture::Confirmed(payment, order));
                }
                if payment.status != PAYMENT_PENDING {
                    return Err(AppError::Conflict(format!(
                        "payment is already {}",
                        payment.status
                    )));
                }

                let order_status: OrderStatus = order.status.parse()?;
                let payment: PaymentEntity = diesel::update(payments::table.find(payment.id))
                    .set((
                        payments::status.eq(captured_payment_status(order_status)),
                        payments::provider_payment_id.eq(&body.razorpay_payment_id),
                        payments::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(PaymentEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to update payment status")?;

                if order_status == OrderStatus::Cancelled {
                    return Ok(Capture::AfterCancel(payment, order));
                }

                let order =
                    order_service::change_status(conn, &order, OrderStatus::Confirmed, &rules)
                        .await?;

                outbox::publish(
                    conn,
                    events::PAYMENT_CAPTURED.into(),
                    PaymentCapturedEvent {
                        order_id: order.id,
                        order_number: order.order_number.clone(),
                        buyer_id: order.buyer_id,
                        amount: payment.amount,
                        provider_payment_id: body.razorpay_payment_id.clone(),
                    },
                )
                .await?;

                Ok::<Capture, AppError>(Capture::Confirmed(payment, order))
            })
        })
        .await?;

    let (payment, order) = match capture {
        Capture::Confirmed(payment, order) => (payment, order),
        Capture::AfterCancel(payment, order) => {
            warn!(
                order_id = order.id,
                payment_id = %payment.id,
                "Payment captured for a cancelled order, flagged for refund"
            );
            return Err(AppError::Conflict(
                "order was cancelled, the payment will be refunded".into(),
            ));
        }
    };

    info!(order_id = order.id, payment_id = %payment.id, "Payment captured");

    Ok(StdResponse {
        data: Some(VerifyPaymentRes { payment, order }),
        message: Some("Payment verified successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_on_cancelled_order_is_owed_back() {
        assert_eq!(captured_payment_status(OrderStatus::Pending), PAYMENT_PAID);
        assert_eq!(
            captured_payment_status(OrderStatus::Cancelled),
            PAYMENT_REFUND_PENDING
        );
    }
}
