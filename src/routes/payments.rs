use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use chrono::Utc;

use crate::auth::require_identity;
use crate::cashfree::generate_order_id;
use crate::error::ApiError;
use crate::models::{
    BookingStatus, CreateSessionRequest, CreateSessionResponse, PaymentSession,
    VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::AppState;

/// POST /api/payments/session - Open a gateway checkout session for a
/// reserved booking.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let identity = require_identity(&headers, &state.identity)?;

    let booking = state
        .store
        .get_booking(request.booking_id)
        .await?
        .ok_or(ApiError::NotFound("booking"))?;

    if booking.user_id != identity.user_id {
        return Err(ApiError::Authorization);
    }
    if booking.booking_status != BookingStatus::Pending {
        return Err(ApiError::Validation(vec![
            "booking is not awaiting payment".to_string(),
        ]));
    }

    // Each attempt gets a fresh order id; the gateway refuses re-used ones.
    let order_id = generate_order_id();
    let return_url = format!(
        "{}/payment/return?orderId={}",
        state.config.public_base_url, order_id
    );
    let notify_url = format!("{}/api/payments/webhook", state.config.public_base_url);

    let order = match state
        .gateway
        .create_order(
            &order_id,
            booking.total_amount,
            &identity.user_id,
            &return_url,
            &notify_url,
        )
        .await
    {
        Ok(order) => {
            state
                .metrics
                .gateway_orders_total
                .with_label_values(&["success"])
                .inc();
            order
        }
        Err(e) => {
            state
                .metrics
                .gateway_orders_total
                .with_label_values(&["error"])
                .inc();
            tracing::warn!(booking_id = %booking.id, error = %e, "gateway order creation failed");
            return Err(e.into());
        }
    };

    state.store.attach_order(booking.id, &order.order_id).await?;
    state
        .store
        .create_session(&PaymentSession {
            payment_session_id: order.payment_session_id.clone(),
            order_id: order.order_id.clone(),
            booking_id: booking.id,
            user_id: identity.user_id.clone(),
            event_id: booking.event_id.clone(),
            amount: booking.total_amount,
            completed_at: None,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!(
        booking_id = %booking.id,
        order_id = %order.order_id,
        "payment session opened"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            payment_session_id: order.payment_session_id,
            order_id: order.order_id,
        }),
    ))
}

/// POST /api/payments/verify - Confirm to the browser that a checkout
/// completed and hand over the ticket QR token.
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    let identity = require_identity(&headers, &state.identity)?;

    let session = state
        .store
        .get_session(&request.payment_session_id)
        .await?
        .ok_or(ApiError::NotFound("payment session"))?;

    if session.user_id != identity.user_id {
        return Err(ApiError::Authorization);
    }

    let booking = state
        .store
        .get_booking(session.booking_id)
        .await?
        .ok_or(ApiError::NotFound("booking"))?;

    match booking.booking_status {
        BookingStatus::Confirmed => {
            let qr_token = booking
                .qr_token
                .clone()
                .ok_or_else(|| ApiError::Internal("confirmed booking missing qr token".into()))?;

            state
                .store
                .complete_session(&session.payment_session_id)
                .await?;

            Ok(Json(VerifyPaymentResponse {
                booking_id: booking.id,
                qr_token,
                event_id: booking.event_id,
            }))
        }
        BookingStatus::Pending => Err(ApiError::Validation(vec![
            "payment is not final yet".to_string(),
        ])),
        _ => Err(ApiError::Validation(vec![
            "payment did not complete, please try again".to_string(),
        ])),
    }
}
