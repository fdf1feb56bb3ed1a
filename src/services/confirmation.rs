//! Webhook confirmation: the PENDING -> {CONFIRMED, FAILED} transition.
//!
//! Signature verification happens in the route layer over the raw body;
//! by the time this service runs, the payload is authenticated. The
//! idempotency gate plus the still-PENDING guard inside the store
//! transaction give at-most-once side effects under gateway retries.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde_json::{json, Value as JsonValue};

use crate::cashfree::types::{GatewayPaymentStatus, WebhookEnvelope};
use crate::email;
use crate::error::ApiError;
use crate::models::IDEMPOTENCY_TTL_SECONDS;
use crate::retry::with_txn_retry;
use crate::store::{StoreError, Transition};
use crate::AppState;

/// Opaque ticket credential issued exactly once, on confirmation.
pub fn generate_qr_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug)]
pub enum WebhookOutcome {
    /// The transition ran (or was a guarded no-op) in this delivery.
    Processed(JsonValue),
    /// A previous delivery already processed this order; stored result
    /// returned unchanged.
    Replayed(JsonValue),
    /// The gateway reported a state we do not recognize as terminal.
    Ignored { status: String },
    /// The order id references no booking we know; retrying cannot help.
    UnknownOrder,
}

pub async fn process_gateway_callback(
    state: &AppState,
    envelope: WebhookEnvelope,
) -> Result<WebhookOutcome, ApiError> {
    let order_id = envelope.data.order.order_id.clone();
    let status = GatewayPaymentStatus::parse(&envelope.data.payment.payment_status);

    if let GatewayPaymentStatus::Unrecognized(raw) = &status {
        tracing::warn!(%order_id, status = %raw, "unrecognized gateway payment status, ignoring");
        state
            .metrics
            .bookings_confirmed_total
            .with_label_values(&["ignored"])
            .inc();
        return Ok(WebhookOutcome::Ignored { status: raw.clone() });
    }

    let idempotency_key = format!("confirm:{order_id}");
    if let Some(stored) = state
        .store
        .idempotency_check(&idempotency_key, IDEMPOTENCY_TTL_SECONDS)
        .await?
    {
        tracing::info!(%order_id, "webhook already processed, returning stored result");
        state
            .metrics
            .bookings_confirmed_total
            .with_label_values(&["replayed"])
            .inc();
        return Ok(WebhookOutcome::Replayed(stored));
    }

    let Some(booking) = state.store.find_booking_by_order(&order_id).await? else {
        tracing::warn!(%order_id, "webhook references unknown order");
        state
            .metrics
            .bookings_confirmed_total
            .with_label_values(&["unknown_order"])
            .inc();
        return Ok(WebhookOutcome::UnknownOrder);
    };

    let transition = match &status {
        GatewayPaymentStatus::Success => {
            let qr_token = generate_qr_token();
            with_txn_retry(
                || state.store.confirm_booking(booking.id, &qr_token),
                "confirm_booking",
            )
            .await?
        }
        GatewayPaymentStatus::Failed => {
            with_txn_retry(|| state.store.fail_booking(booking.id), "fail_booking").await?
        }
        GatewayPaymentStatus::Unrecognized(_) => unreachable!("handled above"),
    };

    let settled = transition.booking();
    let result = json!({
        "bookingId": settled.id,
        "orderId": order_id,
        "bookingStatus": settled.booking_status,
        "paymentStatus": settled.payment_status,
        "qrToken": settled.qr_token,
    });

    // Save before returning so a gateway retry replays this exact result.
    // Losing the race to a concurrent delivery is fine: the still-PENDING
    // guard already made one of the two transitions a no-op.
    match state.store.idempotency_save(&idempotency_key, &result).await {
        Ok(()) => {}
        Err(StoreError::DuplicateKey) => {
            tracing::debug!(%order_id, "concurrent delivery saved the idempotency record first");
        }
        Err(e) => return Err(e.into()),
    }

    match &transition {
        Transition::Applied(b) => {
            let label = match status {
                GatewayPaymentStatus::Success => "confirmed",
                _ => "failed",
            };
            state
                .metrics
                .bookings_confirmed_total
                .with_label_values(&[label])
                .inc();
            tracing::info!(
                booking_id = %b.id,
                %order_id,
                outcome = label,
                "booking transition applied"
            );

            if status == GatewayPaymentStatus::Success {
                email::dispatch_confirmation(
                    state.mailer.clone(),
                    state.store.clone(),
                    b.clone(),
                );
            }
        }
        Transition::AlreadySettled(b) => {
            tracing::info!(
                booking_id = %b.id,
                %order_id,
                status = ?b.booking_status,
                "booking already settled, webhook was a no-op"
            );
        }
    }

    Ok(WebhookOutcome::Processed(result))
}
