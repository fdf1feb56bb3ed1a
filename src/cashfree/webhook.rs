use super::error::CashfreeError;
use super::CashfreeConfig;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Verify a Cashfree webhook signature.
///
/// The gateway signs `"{timestamp}{raw_body}"` with the webhook secret and
/// transmits the HMAC-SHA256 digest base64-encoded in `x-webhook-signature`
/// alongside `x-webhook-timestamp`. Verification runs over the raw request
/// body before any JSON parsing, so re-serialization cannot bypass it.
///
/// # Arguments
///
/// * `raw_body` - The raw request body as received
/// * `signature` - Value of the `x-webhook-signature` header
/// * `timestamp` - Value of the `x-webhook-timestamp` header
/// * `webhook_secret` - The shared webhook secret
/// * `tolerance` - Maximum allowed timestamp skew in seconds (default: 300)
pub fn verify_webhook_signature(
    raw_body: &[u8],
    signature: &str,
    timestamp: &str,
    webhook_secret: &str,
    tolerance: Option<i64>,
) -> Result<(), CashfreeError> {
    let tolerance = tolerance.unwrap_or(300);

    // Reject replays outside the tolerance window.
    let webhook_time = timestamp
        .parse::<i64>()
        .map_err(|_| CashfreeError::WebhookVerificationFailed)?;

    let current_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| CashfreeError::WebhookVerificationFailed)?
        .as_secs() as i64;

    if (current_time - webhook_time).abs() > tolerance {
        return Err(CashfreeError::WebhookVerificationFailed);
    }

    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|_| CashfreeError::WebhookVerificationFailed)?;
    mac.update(timestamp.as_bytes());
    mac.update(raw_body);
    let expected_bytes = mac.finalize().into_bytes();

    let received_bytes = BASE64
        .decode(signature)
        .map_err(|_| CashfreeError::WebhookVerificationFailed)?;

    if received_bytes.len() != expected_bytes.len() {
        return Err(CashfreeError::WebhookVerificationFailed);
    }

    // Constant-time comparison
    let mut result = 0u8;
    for (a, b) in received_bytes.iter().zip(expected_bytes.iter()) {
        result |= a ^ b;
    }

    if result == 0 {
        Ok(())
    } else {
        Err(CashfreeError::WebhookVerificationFailed)
    }
}

impl CashfreeConfig {
    /// Verify a webhook signature using this config's webhook secret.
    pub fn verify_webhook(
        &self,
        raw_body: &[u8],
        signature: &str,
        timestamp: &str,
        tolerance: Option<i64>,
    ) -> Result<(), CashfreeError> {
        verify_webhook_signature(
            raw_body,
            signature,
            timestamp,
            &self.webhook_secret,
            tolerance,
        )
    }
}
