//! Expiry reaper: reclaims inventory held by abandoned checkouts.
//!
//! Invoked by the external scheduler through the cron endpoint, never by
//! users. Idempotent by construction: expired bookings fall out of the
//! scan filter.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::models::{BOOKING_HOLD_MINUTES, EXPIRY_BATCH_SIZE};
use crate::retry::with_txn_retry;
use crate::store::BookingStore;

pub async fn run_expiry(
    store: &Arc<dyn BookingStore>,
    metrics: &Metrics,
) -> Result<u64, ApiError> {
    let cutoff = Utc::now() - Duration::minutes(BOOKING_HOLD_MINUTES);

    let expired = with_txn_retry(
        || store.expire_stale(cutoff, EXPIRY_BATCH_SIZE),
        "expire_stale",
    )
    .await?;

    metrics.bookings_expired_total.inc_by(expired);
    if expired > 0 {
        tracing::info!(expired, %cutoff, "stale reservations reclaimed");
    }

    Ok(expired)
}
