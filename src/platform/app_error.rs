use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use diesel::result::DatabaseErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    domain::{
        TransitionError, UnknownVariant, bulk_pricing::BulkPricingError, cart::CartError,
        catalog::FilterError, checkout::CheckoutError, ledger::LedgerError,
    },
    platform::aliases::DieselError,
};

/// Error returned by every handler. Rendered as `{ "error": message }`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Resource not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0}")]
    ForbiddenResource(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0} is unreachable")]
    ServiceUnreachable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ForbiddenResource(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Other(err) => {
                tracing::error!("Internal error: {:#}", err);
                "Internal server error".to_string()
            }
            other => {
                tracing::warn!(status = status.as_u16(), "{}", other);
                other.to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<DieselError> for AppError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(format!("already exists: {}", info.message()))
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                Self::BadRequest(format!("unknown reference: {}", info.message()))
            }
            err => Self::Other(err.into()),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        Self::Conflict(err.to_string())
    }
}

impl From<UnknownVariant> for AppError {
    fn from(err: UnknownVariant) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::OutOfStock => Self::Conflict(err.to_string()),
            CartError::InvalidQuantity(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::InsufficientStock { .. } => Self::Conflict(err.to_string()),
            CheckoutError::Overflow => Self::Other(anyhow::anyhow!(err)),
            _ => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::CreditLimitExceeded { .. } => Self::Conflict(err.to_string()),
            LedgerError::Overflow => Self::Other(anyhow::anyhow!(err)),
            LedgerError::NonPositiveAmount(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<BulkPricingError> for AppError {
    fn from(err: BulkPricingError) -> Self {
        match err {
            BulkPricingError::Overflow => Self::Other(anyhow::anyhow!(err)),
            _ => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<FilterError> for AppError {
    fn from(err: FilterError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

/// Envelope for successful responses.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct StdResponse<T, M> {
    pub data: Option<T>,
    pub message: Option<M>,
}

impl<T: Serialize, M: Serialize> IntoResponse for StdResponse<T, M> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_statuses() {
        let conflict: AppError = TransitionError::new("order", "shipped", "cancelled").into();
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let out_of_stock: AppError = CartError::OutOfStock.into();
        assert_eq!(out_of_stock.status_code(), StatusCode::CONFLICT);

        let bad_qty: AppError = CartError::InvalidQuantity(0).into();
        assert_eq!(bad_qty.status_code(), StatusCode::BAD_REQUEST);

        let huge_price: AppError = FilterError::PriceOutOfRange(i64::MAX / 10).into();
        assert_eq!(huge_price.status_code(), StatusCode::BAD_REQUEST);

        let not_found: AppError = DieselError::NotFound.into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn hides_internal_messages() {
        let response = AppError::Other(anyhow::anyhow!("password=hunter2")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
