//! Bearer-token authentication and role gating.
//!
//! Tokens are HS256 JWTs issued by the identity service. The verified user is
//! inserted into the request as an `Extension<CurrentUser>`.

use std::{fmt, sync::Arc};

use axum::{
    Extension,
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::platform::app_error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Seller,
    Distributor,
    Admin,
    CoAdmin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::CoAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Distributor => "distributor",
            Self::Admin => "admin",
            Self::CoAdmin => "co_admin",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,
    pub role: Role,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i32,
    pub role: Role,
}

/// Signing material shared with the middleware through a router extension.
#[derive(Clone)]
pub struct JwtKeys {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Arc<Self> {
        Arc::new(Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn verify(&self, token: &str) -> Result<CurrentUser, AppError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|err| AppError::Unauthorized(format!("invalid token: {}", err)))?;

        Ok(CurrentUser {
            id: data.claims.sub,
            role: data.claims.role,
        })
    }

    /// Issues a token; used by operators and tests, login lives elsewhere.
    pub fn sign(&self, claims: &Claims) -> anyhow::Result<String> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }
}

fn bearer_token(req: &Request) -> Result<&str, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("missing Authorization header".into()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("malformed Authorization header".into()))?;

    header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("expected a Bearer token".into()))
}

async fn authorize(
    keys: &JwtKeys,
    mut req: Request,
    next: Next,
    allowed: impl Fn(Role) -> bool,
) -> Response {
    let user = match bearer_token(&req).and_then(|token| keys.verify(token)) {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    if !allowed(user.role) {
        return AppError::ForbiddenResource(format!(
            "{} accounts cannot access this resource",
            user.role
        ))
        .into_response();
    }

    req.extensions_mut().insert(user);
    next.run(req).await
}

pub async fn authenticated(
    Extension(keys): Extension<Arc<JwtKeys>>,
    req: Request,
    next: Next,
) -> Response {
    authorize(&keys, req, next, |_| true).await
}

pub async fn buyers_authorization(
    Extension(keys): Extension<Arc<JwtKeys>>,
    req: Request,
    next: Next,
) -> Response {
    authorize(&keys, req, next, |role| role == Role::Buyer).await
}

pub async fn sellers_authorization(
    Extension(keys): Extension<Arc<JwtKeys>>,
    req: Request,
    next: Next,
) -> Response {
    authorize(&keys, req, next, |role| role == Role::Seller).await
}

pub async fn distributors_authorization(
    Extension(keys): Extension<Arc<JwtKeys>>,
    req: Request,
    next: Next,
) -> Response {
    authorize(&keys, req, next, |role| role == Role::Distributor).await
}

/// Admins and co-admins share the back office.
pub async fn admins_authorization(
    Extension(keys): Extension<Arc<JwtKeys>>,
    req: Request,
    next: Next,
) -> Response {
    authorize(&keys, req, next, |role| role.is_admin()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role, exp: usize) -> Claims {
        Claims { sub: 42, role, exp }
    }

    #[test]
    fn verifies_tokens_it_signed() {
        let keys = JwtKeys::from_secret("test-secret");
        let token = keys.sign(&claims(Role::CoAdmin, 4_102_444_800)).unwrap();

        let user = keys.verify(&token).unwrap();
        assert_eq!(user, CurrentUser { id: 42, role: Role::CoAdmin });
        assert!(user.role.is_admin());
    }

    #[test]
    fn rejects_foreign_and_expired_tokens() {
        let ours = JwtKeys::from_secret("test-secret");
        let theirs = JwtKeys::from_secret("other-secret");

        let foreign = theirs.sign(&claims(Role::Buyer, 4_102_444_800)).unwrap();
        assert!(matches!(ours.verify(&foreign), Err(AppError::Unauthorized(_))));

        let expired = ours.sign(&claims(Role::Buyer, 1_000)).unwrap();
        assert!(matches!(ours.verify(&expired), Err(AppError::Unauthorized(_))));
    }
}
