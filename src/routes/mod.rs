pub mod bookings;
pub mod cron;
pub mod health;
pub mod metrics;
pub mod payments;
pub mod webhook;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/bookings/reserve", post(bookings::reserve))
        .route("/api/bookings/my", post(bookings::my_bookings))
        .route("/api/payments/session", post(payments::create_session))
        .route("/api/payments/verify", post(payments::verify_payment))
        .route("/api/payments/webhook", post(webhook::receive_gateway_webhook))
        .route("/api/cron/expire-bookings", get(cron::expire_bookings))
        .route("/health/live", get(health::health_live))
        .route("/health/ready", get(health::health_ready))
        .route("/metrics", get(metrics::metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
