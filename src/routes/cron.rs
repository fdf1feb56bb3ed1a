use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};

use crate::error::ApiError;
use crate::models::ExpireResponse;
use crate::services::expiry;
use crate::AppState;

/// GET /api/cron/expire-bookings - Reclaim stale PENDING reservations.
///
/// Invoked by the external scheduler with the shared cron secret.
pub async fn expire_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ExpireResponse>, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Authentication)?;

    if !constant_time_eq(token.as_bytes(), state.config.cron_secret.as_bytes()) {
        return Err(ApiError::Authentication);
    }

    let expired = expiry::run_expiry(&state.store, &state.metrics).await?;
    Ok(Json(ExpireResponse { expired }))
}

// Length leaks; content does not.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
