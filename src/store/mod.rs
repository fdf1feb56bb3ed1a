//! Persistence layer.
//!
//! The original system keeps bookings in a hosted document database with an
//! optimistic-concurrency transaction primitive. That contract is captured
//! by [`BookingStore`]: every multi-document mutation (reserve, confirm,
//! fail, expire) is atomic inside the backend, and contention surfaces as
//! [`StoreError::Conflict`] for the retry wrapper to handle.
//!
//! Two backends ship, selected by `STORE_BACKEND`: Postgres for production
//! and an in-process store for local development and tests.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Booking, EventRecord, PaymentSession};

#[derive(Error, Debug)]
pub enum StoreError {
    /// Optimistic-concurrency abort. Retryable.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// A conflicting transaction kept aborting past the retry bound.
    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        source: Box<StoreError>,
    },

    /// Create-if-absent insert found a living record.
    #[error("record already exists for this key")]
    DuplicateKey,

    #[error("record not found")]
    NotFound,

    /// Transactional availability re-check failed; the hold was not taken.
    #[error("insufficient inventory for ticket type {ticket_type_id}")]
    InsufficientInventory { ticket_type_id: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the retry wrapper should re-run the transaction.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Outcome of a guarded PENDING transition.
#[derive(Debug)]
pub enum Transition {
    /// The booking was still PENDING and the transition was applied.
    Applied(Booking),
    /// A previous webhook or the reaper got there first; nothing changed.
    AlreadySettled(Booking),
}

impl Transition {
    pub fn booking(&self) -> &Booking {
        match self {
            Transition::Applied(b) | Transition::AlreadySettled(b) => b,
        }
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn upsert_event(&self, event: &EventRecord) -> Result<(), StoreError>;

    async fn get_event(&self, event_id: &str) -> Result<Option<EventRecord>, StoreError>;

    /// Atomically re-check availability for every line item, take the
    /// inventory hold, and persist the PENDING booking.
    async fn create_reservation(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn find_booking_by_order(&self, order_id: &str)
        -> Result<Option<Booking>, StoreError>;

    async fn bookings_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError>;

    /// Record the gateway order id on the booking and mark its payment
    /// INITIATED.
    async fn attach_order(&self, booking_id: Uuid, order_id: &str) -> Result<(), StoreError>;

    /// PENDING -> CONFIRMED/SUCCESS with the given QR token. A no-op
    /// returning `AlreadySettled` if the booking left PENDING concurrently.
    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        qr_token: &str,
    ) -> Result<Transition, StoreError>;

    /// PENDING -> FAILED/FAILED, releasing held inventory (floored at
    /// zero). Same no-op guard as `confirm_booking`.
    async fn fail_booking(&self, booking_id: Uuid) -> Result<Transition, StoreError>;

    /// Expire PENDING bookings created before `cutoff` whose payment is
    /// still PENDING or INITIATED, releasing their inventory. Bounded to
    /// `batch` bookings per call. Returns how many were expired.
    async fn expire_stale(&self, cutoff: DateTime<Utc>, batch: i64) -> Result<u64, StoreError>;

    /// Returns the stored result for `key` if a record exists and is
    /// younger than `ttl_seconds`. Older records are treated as absent.
    async fn idempotency_check(
        &self,
        key: &str,
        ttl_seconds: i64,
    ) -> Result<Option<JsonValue>, StoreError>;

    /// Create-if-absent. Fails with `DuplicateKey` if a living record
    /// exists; an expired record is replaced.
    async fn idempotency_save(&self, key: &str, result: &JsonValue) -> Result<(), StoreError>;

    async fn create_session(&self, session: &PaymentSession) -> Result<(), StoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<PaymentSession>, StoreError>;

    async fn complete_session(&self, id: &str) -> Result<(), StoreError>;

    async fn mark_email_sent(&self, booking_id: Uuid) -> Result<(), StoreError>;
}
