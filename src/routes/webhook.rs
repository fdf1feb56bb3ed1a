use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::cashfree::types::WebhookEnvelope;
use crate::error::{ApiError, ErrorResponse};
use crate::services::confirmation::{self, WebhookOutcome};
use crate::AppState;

/// POST /api/payments/webhook - Gateway payment-status callback.
///
/// Runs unauthenticated by default, so the raw body must pass signature
/// verification before anything else happens. Unexpected internal errors
/// return 500 on purpose: the gateway retries, and the idempotency gate
/// makes the retry safe.
pub async fn receive_gateway_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok());
    let timestamp = headers
        .get("x-webhook-timestamp")
        .and_then(|v| v.to_str().ok());

    let verified = match (signature, timestamp) {
        (Some(signature), Some(timestamp)) => state
            .gateway
            .config()
            .verify_webhook(&body, signature, timestamp, None)
            .is_ok(),
        _ => false,
    };

    if !verified {
        // No detail about which part failed leaves the process.
        tracing::warn!("webhook signature verification failed");
        state
            .metrics
            .webhook_rejected_total
            .with_label_values(&["signature"])
            .inc();
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(
                "signature_error",
                "Webhook signature verification failed",
            )),
        )
            .into_response());
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "malformed webhook payload");
            state
                .metrics
                .webhook_rejected_total
                .with_label_values(&["malformed"])
                .inc();
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("parse_error", "Malformed webhook payload")),
            )
                .into_response());
        }
    };

    let outcome = confirmation::process_gateway_callback(&state, envelope).await?;

    let body = match outcome {
        WebhookOutcome::Processed(result) | WebhookOutcome::Replayed(result) => result,
        WebhookOutcome::Ignored { status } => json!({ "ignored": true, "status": status }),
        WebhookOutcome::UnknownOrder => json!({ "ignored": true, "reason": "unknown_order" }),
    };

    Ok((StatusCode::OK, Json(body)).into_response())
}
