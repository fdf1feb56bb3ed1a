//! Booking reservation: validate, price, hold inventory, persist PENDING.
//!
//! No gateway call happens here; this step only reserves and quotes a
//! price. The checkout session is opened by a separate request.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    Booking, BookingStatus, EventRecord, LineItem, PaymentStatus, ReserveItem, ReserveRequest,
    ReserveResponse, BOOKING_FEE,
};
use crate::retry::with_txn_retry;
use crate::store::BookingStore;

/// Validate every line item, collecting all violations rather than
/// stopping at the first.
pub fn validate_items(event: &EventRecord, items: &[ReserveItem]) -> Vec<String> {
    let mut violations = Vec::new();

    if !items.iter().any(|i| i.quantity > 0) {
        violations.push("at least one ticket is required".to_string());
    }

    for item in items {
        let Some(tt) = event.ticket_type(&item.ticket_type_id) else {
            violations.push(format!("unknown ticket type {}", item.ticket_type_id));
            continue;
        };

        if item.quantity <= 0 {
            violations.push(format!("{}: quantity must be at least 1", tt.name));
            continue;
        }
        if item.quantity > tt.max_per_order {
            violations.push(format!(
                "{}: quantity {} exceeds the per-order limit of {}",
                tt.name, item.quantity, tt.max_per_order
            ));
        }
        if item.quantity > tt.remaining() {
            violations.push(format!(
                "{}: only {} tickets remaining",
                tt.name,
                tt.remaining()
            ));
        }
    }

    violations
}

/// Copy authoritative prices off the event record and compute the
/// subtotal. Assumes `validate_items` passed.
pub fn price_items(event: &EventRecord, items: &[ReserveItem]) -> (Vec<LineItem>, i64) {
    let mut line_items = Vec::with_capacity(items.len());
    let mut subtotal = 0i64;

    for item in items {
        if let Some(tt) = event.ticket_type(&item.ticket_type_id) {
            subtotal += tt.unit_price * i64::from(item.quantity);
            line_items.push(LineItem {
                ticket_type_id: item.ticket_type_id.clone(),
                quantity: item.quantity,
                unit_price: tt.unit_price,
            });
        }
    }

    (line_items, subtotal)
}

pub async fn reserve(
    store: &Arc<dyn BookingStore>,
    user_id: &str,
    request: &ReserveRequest,
) -> Result<ReserveResponse, ApiError> {
    let event = store
        .get_event(&request.event_id)
        .await?
        .ok_or(ApiError::NotFound("event"))?;

    let violations = validate_items(&event, &request.items);
    if !violations.is_empty() {
        return Err(ApiError::Validation(violations));
    }

    let (items, subtotal) = price_items(&event, &request.items);
    let booking = Booking {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        event_id: request.event_id.clone(),
        order_id: None,
        items,
        subtotal,
        booking_fee: BOOKING_FEE,
        total_amount: subtotal + BOOKING_FEE,
        booking_status: BookingStatus::Pending,
        payment_status: PaymentStatus::Pending,
        qr_token: None,
        created_at: Utc::now(),
        expired_at: None,
        confirmation_email_sent_at: None,
    };

    with_txn_retry(|| store.create_reservation(&booking), "create_reservation").await?;

    tracing::info!(
        booking_id = %booking.id,
        user_id = %booking.user_id,
        event_id = %booking.event_id,
        total_amount = booking.total_amount,
        "reservation created"
    );

    Ok(ReserveResponse {
        booking_id: booking.id,
        total_amount: booking.total_amount,
    })
}
