//! Typed configuration read from the environment (after `.env` is loaded).

use std::{env, str::FromStr};

use thiserror::Error;

use crate::domain::checkout::CheckoutRules;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub url: String,
    pub exchange: String,
    pub queue: String,
}

#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    pub checkout: CheckoutRules,
    pub low_stock_threshold: i32,
    pub outbox_poll_millis: u64,
    pub outbox_batch_size: i64,
    /// Delivery attempts before an outbox row is parked as `FAILED`.
    pub outbox_max_attempts: i32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub razorpay: RazorpayConfig,
    pub amqp: Option<AmqpConfig>,
    pub storefront: StorefrontConfig,
}

/// Loads the configuration. `DATABASE_URL` and `JWT_SECRET` are required.
pub fn load() -> Result<AppConfig, ConfigError> {
    load_from(|name| env::var(name).ok())
}

/// Same as [`load`] but reads variables through `lookup`, which keeps tests
/// away from the process environment.
pub fn load_from<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));
    let or_default =
        |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

    let defaults = CheckoutRules::default();

    Ok(AppConfig {
        server: ServerConfig {
            host: or_default("HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 8080)?,
        },
        database: DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
        },
        auth: AuthConfig {
            jwt_secret: required("JWT_SECRET")?,
        },
        razorpay: RazorpayConfig {
            key_id: or_default("RAZORPAY_KEY_ID", ""),
            key_secret: or_default("RAZORPAY_KEY_SECRET", ""),
            base_url: or_default("RAZORPAY_BASE_URL", "https://api.razorpay.com/v1"),
            currency: or_default("RAZORPAY_CURRENCY", "INR"),
        },
        amqp: lookup("AMQP_URL").map(|url| AmqpConfig {
            url,
            exchange: or_default("AMQP_EXCHANGE", "storefront.events"),
            queue: or_default("AMQP_QUEUE", "storefront.notifications"),
        }),
        storefront: StorefrontConfig {
            checkout: CheckoutRules {
                free_shipping_threshold: parse(
                    &lookup,
                    "FREE_SHIPPING_THRESHOLD_PAISE",
                    defaults.free_shipping_threshold,
                )?,
                shipping_fee: parse(&lookup, "SHIPPING_FEE_PAISE", defaults.shipping_fee)?,
                paise_per_point: parse(&lookup, "PAISE_PER_POINT", defaults.paise_per_point)?,
                paise_per_earned_point: parse(
                    &lookup,
                    "PAISE_PER_EARNED_POINT",
                    defaults.paise_per_earned_point,
                )?,
            },
            low_stock_threshold: parse(&lookup, "LOW_STOCK_THRESHOLD", 5)?,
            outbox_poll_millis: parse(&lookup, "OUTBOX_POLL_MILLIS", 1_000)?,
            outbox_batch_size: parse(&lookup, "OUTBOX_BATCH_SIZE", 50)?,
            outbox_max_attempts: parse(&lookup, "OUTBOX_MAX_ATTEMPTS", 10)?,
        },
    })
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn requires_database_and_secret() {
        let err = load_from(lookup(&[("JWT_SECRET", "s")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));

        let err = load_from(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn fills_in_defaults() {
        let config = load_from(lookup(&[
            ("DATABASE_URL", "postgres://localhost/storefront"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.razorpay.currency, "INR");
        assert!(config.amqp.is_none());
        assert_eq!(config.storefront.checkout, CheckoutRules::default());
        assert_eq!(config.storefront.outbox_max_attempts, 10);
    }

    #[test]
    fn enables_amqp_when_url_is_present() {
        let config = load_from(lookup(&[
            ("DATABASE_URL", "postgres://localhost/storefront"),
            ("JWT_SECRET", "secret"),
            ("AMQP_URL", "amqp://localhost:5672"),
        ]))
        .unwrap();

        let amqp = config.amqp.unwrap();
        assert_eq!(amqp.exchange, "storefront.events");
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let err = load_from(lookup(&[
            ("DATABASE_URL", "postgres://localhost/storefront"),
            ("JWT_SECRET", "secret"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }
}
