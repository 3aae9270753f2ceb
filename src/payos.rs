//! PayOS hosted-checkout gateway adapter.
//!
//! Creates payment links for orders and parses/verifies the asynchronous
//! webhook callbacks. Amounts on the wire are whole VND; the store price
//! is converted with the fixed configured rate. Requests are signed with
//! HMAC-SHA256 over the alphabetically-ordered field string, webhook
//! payloads over the sorted `data` object.

use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::config::PayosConfig;

type HmacSha256 = Hmac<Sha256>;

/// External order codes keep the last six digits of the creation time in
/// epoch milliseconds. Collisions are accepted.
const ORDER_CODE_MODULUS: i64 = 1_000_000;

/// PayOS truncates descriptions past this length.
pub const DESCRIPTION_MAX_CHARS: usize = 25;

#[derive(Debug, Error)]
pub enum PayosError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected request: {0}")]
    Gateway(String),
}

#[derive(Clone)]
pub struct PayosClient {
    config: PayosConfig,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
pub struct PaymentItem {
    pub name: String,
    pub quantity: i32,
    pub price: i64,
}

#[derive(Debug)]
pub struct NewPaymentLink {
    pub order_code: i64,
    pub amount_vnd: i64,
    pub description: String,
    pub items: Vec<PaymentItem>,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentLinkBody<'a> {
    order_code: i64,
    amount: i64,
    description: &'a str,
    items: &'a [PaymentItem],
    return_url: &'a str,
    cancel_url: &'a str,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct PaymentLinkEnvelope {
    code: String,
    desc: String,
    data: Option<PaymentLinkData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkData {
    pub payment_link_id: String,
    pub checkout_url: String,
}

impl PayosClient {
    pub fn new(config: PayosConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }

    pub fn checksum_key(&self) -> &str {
        &self.config.checksum_key
    }

    pub async fn create_payment_link(
        &self,
        link: &NewPaymentLink,
    ) -> Result<PaymentLinkData, PayosError> {
        let signature = sign_payment_request(
            &self.config.checksum_key,
            link.amount_vnd,
            &link.cancel_url,
            &link.description,
            link.order_code,
            &link.return_url,
        );
        let body = PaymentLinkBody {
            order_code: link.order_code,
            amount: link.amount_vnd,
            description: &link.description,
            items: &link.items,
            return_url: &link.return_url,
            cancel_url: &link.cancel_url,
            signature,
        };

        let response = self
            .http
            .post(format!("{}/v2/payment-requests", self.config.api_base))
            .header("x-client-id", self.config.client_id.as_str())
            .header("x-api-key", self.config.api_key.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PayosError::Gateway(format!("http status {status}")));
        }

        let envelope: PaymentLinkEnvelope = response.json().await?;
        if envelope.code != "00" {
            return Err(PayosError::Gateway(format!("{} ({})", envelope.desc, envelope.code)));
        }
        envelope
            .data
            .ok_or_else(|| PayosError::Gateway("response carried no payment link".to_string()))
    }
}

impl std::fmt::Debug for PayosClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayosClient").field("api_base", &self.config.api_base).finish()
    }
}

/// Webhook callback payload. Anything that does not deserialize into this
/// shape is dropped by the handler.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub code: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub success: bool,
    pub data: WebhookData,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    pub order_code: i64,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
}

impl WebhookPayload {
    pub fn succeeded(&self) -> bool {
        self.success && self.code == "00"
    }
}

pub fn order_code_from_millis(millis: i64) -> i64 {
    (millis % ORDER_CODE_MODULUS).abs()
}

/// Converts a store amount to whole VND at the fixed rate. `None` when the
/// result does not fit the wire type.
pub fn to_vnd(amount: Decimal, rate: Decimal) -> Option<i64> {
    amount.checked_mul(rate)?.round().to_i64()
}

/// Truncates to at most `max` characters on a character boundary.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

fn sign_payment_request(
    checksum_key: &str,
    amount: i64,
    cancel_url: &str,
    description: &str,
    order_code: i64,
    return_url: &str,
) -> String {
    let canonical = format!(
        "amount={amount}&cancelUrl={cancel_url}&description={description}&orderCode={order_code}&returnUrl={return_url}"
    );
    hmac_hex(checksum_key, &canonical)
}

/// Verifies a webhook signature: HMAC-SHA256 over the `data` object with
/// keys in sorted order, nulls rendered empty.
pub fn verify_webhook_signature(
    data: &serde_json::Value,
    signature: &str,
    checksum_key: &str,
) -> bool {
    let Some(map) = data.as_object() else {
        return false;
    };
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    let canonical = keys
        .into_iter()
        .map(|key| format!("{key}={}", canonical_value(&map[key.as_str()])))
        .collect::<Vec<_>>()
        .join("&");
    hmac_hex(checksum_key, &canonical) == signature.to_lowercase()
}

fn canonical_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn hmac_hex(key: &str, message: &str) -> String {
    // HMAC-SHA256 accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("hmac key");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_code_keeps_last_six_digits() {
        assert_eq!(order_code_from_millis(1_767_225_600_123), 600_123);
        assert_eq!(order_code_from_millis(42), 42);
    }

    #[test]
    fn test_to_vnd_rounds_to_whole_units() {
        let rate = Decimal::new(25000, 0);
        assert_eq!(to_vnd(Decimal::new(6480, 2), rate), Some(1_620_000));
        assert_eq!(to_vnd(Decimal::new(1, 2), rate), Some(250));
    }

    #[test]
    fn test_to_vnd_overflow_is_none() {
        assert_eq!(to_vnd(Decimal::MAX, Decimal::MAX), None);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("short", 25), "short");
        assert_eq!(truncate_chars("abcdefgh", 3), "abc");
        // multibyte: must cut on a char boundary, not a byte offset
        assert_eq!(truncate_chars("áéíóú", 2), "áé");
    }

    #[test]
    fn test_webhook_signature_round_trip() {
        let data = json!({"orderCode": 600123, "amount": 1620000, "reference": "FT123"});
        let canonical = "amount=1620000&orderCode=600123&reference=FT123";
        let signature = hmac_hex("secret", canonical);
        assert!(verify_webhook_signature(&data, &signature, "secret"));
        assert!(!verify_webhook_signature(&data, &signature, "other-key"));
    }

    #[test]
    fn test_webhook_signature_null_renders_empty() {
        let data = json!({"amount": 5, "reference": null});
        let signature = hmac_hex("secret", "amount=5&reference=");
        assert!(verify_webhook_signature(&data, &signature, "secret"));
    }

    #[test]
    fn test_webhook_signature_rejects_tampered_data() {
        let data = json!({"orderCode": 600123, "amount": 1620000});
        let signature = hmac_hex("secret", "amount=1620000&orderCode=600123");
        let tampered = json!({"orderCode": 600123, "amount": 9999999});
        assert!(verify_webhook_signature(&data, &signature, "secret"));
        assert!(!verify_webhook_signature(&tampered, &signature, "secret"));
    }

    #[test]
    fn test_webhook_signature_non_object_rejected() {
        assert!(!verify_webhook_signature(&json!("data"), "sig", "secret"));
    }

    #[test]
    fn test_payment_request_signature_is_stable() {
        let a = sign_payment_request("key", 1000, "https://x/c", "Order 1", 1, "https://x/r");
        let b = sign_payment_request("key", 1000, "https://x/c", "Order 1", 1, "https://x/r");
        let c = sign_payment_request("key", 1001, "https://x/c", "Order 1", 1, "https://x/r");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_webhook_payload_success_requires_code_00() {
        let paid: WebhookPayload = serde_json::from_value(json!({
            "code": "00", "desc": "success", "success": true,
            "data": {"orderCode": 600123, "amount": 1620000, "reference": "FT1"}
        }))
        .unwrap();
        assert!(paid.succeeded());
        assert_eq!(paid.data.order_code, 600_123);

        let failed: WebhookPayload = serde_json::from_value(json!({
            "code": "01", "desc": "declined", "success": false,
            "data": {"orderCode": 600123}
        }))
        .unwrap();
        assert!(!failed.succeeded());
    }

    #[test]
    fn test_unrecognized_payload_shape_fails_parse() {
        let result: Result<WebhookPayload, _> =
            serde_json::from_value(json!({"hello": "world"}));
        assert!(result.is_err());
    }
}
