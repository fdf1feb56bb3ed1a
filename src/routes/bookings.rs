use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};

use crate::auth::require_identity;
use crate::error::ApiError;
use crate::models::{Booking, MyBookingsRequest, ReserveRequest, ReserveResponse};
use crate::services::reservation;
use crate::AppState;

const MY_BOOKINGS_DEFAULT_LIMIT: i64 = 50;
const MY_BOOKINGS_MAX_LIMIT: i64 = 100;

/// POST /api/bookings/reserve - Hold inventory and create a PENDING booking
pub async fn reserve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<ReserveResponse>), ApiError> {
    let identity = require_identity(&headers, &state.identity)?;

    let response = reservation::reserve(&state.store, &identity.user_id, &request).await?;
    state.metrics.bookings_reserved_total.inc();

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/bookings/my - List the caller's own bookings
///
/// Ownership is enforced from the verified token; a user id in the body
/// would never be trusted.
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<MyBookingsRequest>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let identity = require_identity(&headers, &state.identity)?;

    let limit = request
        .limit
        .unwrap_or(MY_BOOKINGS_DEFAULT_LIMIT)
        .clamp(1, MY_BOOKINGS_MAX_LIMIT);

    let bookings = state
        .store
        .bookings_for_user(&identity.user_id, limit)
        .await?;
    Ok(Json(bookings))
}
