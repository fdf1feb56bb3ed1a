//! In-process store backend.
//!
//! Used for local development and the integration test suite, the same way
//! the platform ships an in-memory event bus next to the NATS one. All
//! operations take one lock, so every multi-document mutation is atomic and
//! conflicts never occur naturally here.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BookingStore, StoreError, Transition};
use crate::models::{
    Booking, BookingStatus, EventRecord, IdempotencyRecord, PaymentSession, PaymentStatus,
    IDEMPOTENCY_TTL_SECONDS,
};

#[derive(Default)]
struct Inner {
    events: HashMap<String, EventRecord>,
    bookings: HashMap<Uuid, Booking>,
    order_index: HashMap<String, Uuid>,
    sessions: HashMap<String, PaymentSession>,
    idempotency: HashMap<String, IdempotencyRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn release_inventory(events: &mut HashMap<String, EventRecord>, booking: &Booking) {
    if let Some(event) = events.get_mut(&booking.event_id) {
        for item in &booking.items {
            if let Some(tt) = event
                .ticket_types
                .iter_mut()
                .find(|t| t.ticket_type_id == item.ticket_type_id)
            {
                tt.tickets_sold = (tt.tickets_sold - item.quantity).max(0);
            }
        }
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<EventRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.events.get(event_id).cloned())
    }

    async fn create_reservation(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        let event = inner
            .events
            .get(&booking.event_id)
            .ok_or(StoreError::NotFound)?;

        // Availability re-check under the lock; concurrent reservations for
        // the last seat serialize here.
        for item in &booking.items {
            let tt = event
                .ticket_type(&item.ticket_type_id)
                .ok_or(StoreError::NotFound)?;
            if tt.tickets_sold + item.quantity > tt.total_quantity {
                return Err(StoreError::InsufficientInventory {
                    ticket_type_id: item.ticket_type_id.clone(),
                });
            }
        }

        let event = inner
            .events
            .get_mut(&booking.event_id)
            .ok_or(StoreError::NotFound)?;
        for item in &booking.items {
            if let Some(tt) = event
                .ticket_types
                .iter_mut()
                .find(|t| t.ticket_type_id == item.ticket_type_id)
            {
                tt.tickets_sold += item.quantity;
            }
        }

        inner.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.bookings.get(&id).cloned())
    }

    async fn find_booking_by_order(
        &self,
        order_id: &str,
    ) -> Result<Option<Booking>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .order_index
            .get(order_id)
            .and_then(|id| inner.bookings.get(id))
            .cloned())
    }

    async fn bookings_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError> {
        let inner = self.inner.lock().await;
        let mut bookings: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bookings.truncate(limit.max(0) as usize);
        Ok(bookings)
    }

    async fn attach_order(&self, booking_id: Uuid, order_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let booking = inner
            .bookings
            .get_mut(&booking_id)
            .ok_or(StoreError::NotFound)?;
        booking.order_id = Some(order_id.to_string());
        booking.payment_status = PaymentStatus::Initiated;
        inner.order_index.insert(order_id.to_string(), booking_id);
        Ok(())
    }

    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        qr_token: &str,
    ) -> Result<Transition, StoreError> {
        let mut inner = self.inner.lock().await;
        let booking = inner
            .bookings
            .get_mut(&booking_id)
            .ok_or(StoreError::NotFound)?;

        if booking.booking_status != BookingStatus::Pending {
            return Ok(Transition::AlreadySettled(booking.clone()));
        }

        booking.booking_status = BookingStatus::Confirmed;
        booking.payment_status = PaymentStatus::Success;
        booking.qr_token = Some(qr_token.to_string());
        Ok(Transition::Applied(booking.clone()))
    }

    async fn fail_booking(&self, booking_id: Uuid) -> Result<Transition, StoreError> {
        let mut inner = self.inner.lock().await;
        let booking = inner
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        if booking.booking_status != BookingStatus::Pending {
            return Ok(Transition::AlreadySettled(booking));
        }

        release_inventory(&mut inner.events, &booking);

        let booking = inner
            .bookings
            .get_mut(&booking_id)
            .ok_or(StoreError::NotFound)?;
        booking.booking_status = BookingStatus::Failed;
        booking.payment_status = PaymentStatus::Failed;
        Ok(Transition::Applied(booking.clone()))
    }

    async fn expire_stale(&self, cutoff: DateTime<Utc>, batch: i64) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;

        let mut stale: Vec<(DateTime<Utc>, Uuid)> = inner
            .bookings
            .values()
            .filter(|b| {
                b.booking_status == BookingStatus::Pending
                    && matches!(
                        b.payment_status,
                        PaymentStatus::Pending | PaymentStatus::Initiated
                    )
                    && b.created_at < cutoff
            })
            .map(|b| (b.created_at, b.id))
            .collect();
        stale.sort();
        stale.truncate(batch.max(0) as usize);

        let now = Utc::now();
        let mut expired = 0u64;
        for (_, id) in stale {
            let booking = match inner.bookings.get(&id).cloned() {
                Some(b) => b,
                None => continue,
            };
            release_inventory(&mut inner.events, &booking);
            if let Some(b) = inner.bookings.get_mut(&id) {
                b.booking_status = BookingStatus::Expired;
                b.payment_status = PaymentStatus::Expired;
                b.expired_at = Some(now);
            }
            expired += 1;
        }

        Ok(expired)
    }

    async fn idempotency_check(
        &self,
        key: &str,
        ttl_seconds: i64,
    ) -> Result<Option<JsonValue>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.idempotency.get(key).and_then(|record| {
            if Utc::now() - record.created_at > Duration::seconds(ttl_seconds) {
                None
            } else {
                Some(record.result.clone())
            }
        }))
    }

    async fn idempotency_save(&self, key: &str, result: &JsonValue) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.idempotency.get(key) {
            if Utc::now() - existing.created_at <= Duration::seconds(IDEMPOTENCY_TTL_SECONDS) {
                return Err(StoreError::DuplicateKey);
            }
        }
        inner.idempotency.insert(
            key.to_string(),
            IdempotencyRecord {
                key: key.to_string(),
                result: result.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn create_session(&self, session: &PaymentSession) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.sessions.contains_key(&session.payment_session_id) {
            return Err(StoreError::DuplicateKey);
        }
        inner
            .sessions
            .insert(session.payment_session_id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<PaymentSession>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.sessions.get(id).cloned())
    }

    async fn complete_session(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let session = inner.sessions.get_mut(id).ok_or(StoreError::NotFound)?;
        if session.completed_at.is_none() {
            session.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_email_sent(&self, booking_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let booking = inner
            .bookings
            .get_mut(&booking_id)
            .ok_or(StoreError::NotFound)?;
        booking.confirmation_email_sent_at = Some(Utc::now());
        Ok(())
    }
}

/// Test helper: a MemoryStore with a booking forced back in time, used to
/// exercise the expiry cutoff.
impl MemoryStore {
    pub async fn backdate_booking(&self, booking_id: Uuid, created_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(b) = inner.bookings.get_mut(&booking_id) {
            b.created_at = created_at;
        }
    }

    pub async fn backdate_idempotency(&self, key: &str, created_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(r) = inner.idempotency.get_mut(key) {
            r.created_at = created_at;
        }
    }
}
