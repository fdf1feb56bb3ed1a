//! Confirmation email dispatch.
//!
//! Fire-and-forget: a failed send is logged and never propagated, so an
//! email outage can never fail a financial confirmation.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::models::Booking;
use crate::store::BookingStore;

#[derive(Clone)]
pub struct Mailer {
    http_client: reqwest::Client,
    api_key: String,
    template_id: String,
}

impl Mailer {
    pub fn new(api_key: String, template_id: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key,
            template_id,
        }
    }

    async fn send_confirmation(&self, booking: &Booking) -> Result<(), String> {
        let payload = json!({
            "templateId": self.template_id,
            "to": [{"id": booking.user_id}],
            "params": {
                "bookingId": booking.id,
                "eventId": booking.event_id,
                "totalAmount": booking.total_amount,
                "qrToken": booking.qr_token,
            }
        });

        let response = self
            .http_client
            .post("https://api.brevo.com/v3/smtp/email")
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("email provider returned {}", response.status()));
        }
        Ok(())
    }
}

/// Spawn the confirmation email for a just-confirmed booking. Errors are
/// logged and swallowed.
pub fn dispatch_confirmation(mailer: Mailer, store: Arc<dyn BookingStore>, booking: Booking) {
    let booking_id: Uuid = booking.id;
    tokio::spawn(async move {
        match mailer.send_confirmation(&booking).await {
            Ok(()) => {
                if let Err(e) = store.mark_email_sent(booking_id).await {
                    tracing::warn!(%booking_id, error = %e, "failed to record email timestamp");
                }
                tracing::info!(%booking_id, "confirmation email dispatched");
            }
            Err(e) => {
                tracing::warn!(%booking_id, error = %e, "confirmation email failed");
            }
        }
    });
}
