use anyhow::Context;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::platform::{app_error::AppError, config::RazorpayConfig};

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize, Debug)]
struct CreateGatewayOrderReq<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

/// Creates a Razorpay order for `amount` paise; `receipt` is our order number.
pub async fn create_order(
    client: &Client,
    config: &RazorpayConfig,
    amount: i64,
    receipt: &str,
) -> Result<GatewayOrder, AppError> {
    let response = client
        .post(format!("{}/orders", config.base_url.trim_end_matches('/')))
        .basic_auth(&config.key_id, Some(&config.key_secret))
        .json(&CreateGatewayOrderReq {
            amount,
            currency: &config.currency,
            receipt,
        })
        .send()
        .await
        .map_err(|_| AppError::ServiceUnreachable("Razorpay".into()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(
            anyhow::anyhow!("Razorpay rejected order creation ({}): {}", status, body).into(),
        );
    }

    let order = response
        .json()
        .await
        .context("Failed to parse Razorpay order")?;
    Ok(order)
}

/// Checks the checkout signature: HMAC-SHA256 over `order_id|payment_id`
/// keyed with the API secret, hex encoded.
pub fn verify_payment_signature(
    key_secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key_secret.as_bytes()) else {
        return false;
    };
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(gateway_payment_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_genuine_signature() {
        let signature = sign("rzp_secret", "order_Nx1|pay_Qz9");
        assert!(verify_payment_signature("rzp_secret", "order_Nx1", "pay_Qz9", &signature));
    }

    #[test]
    fn rejects_signature_for_another_payment() {
        let signature = sign("rzp_secret", "order_Nx1|pay_Qz9");
        assert!(!verify_payment_signature("rzp_secret", "order_Nx1", "pay_Other", &signature));
        assert!(!verify_payment_signature("wrong_secret", "order_Nx1", "pay_Qz9", &signature));
    }

    #[test]
    fn rejects_non_hex_signature() {
        assert!(!verify_payment_signature("rzp_secret", "order_Nx1", "pay_Qz9", "not-hex"));
    }
}
