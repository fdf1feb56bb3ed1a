pub mod auth;
pub mod cashfree;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod metrics;
pub mod models;
pub mod retry;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use crate::auth::IdentityVerifier;
use crate::cashfree::CashfreeClient;
use crate::config::Config;
use crate::email::Mailer;
use crate::metrics::Metrics;
use crate::store::BookingStore;

/// Shared state handed to every route handler.
pub struct AppState {
    pub store: Arc<dyn BookingStore>,
    pub config: Config,
    pub gateway: CashfreeClient,
    pub identity: IdentityVerifier,
    pub mailer: Mailer,
    pub metrics: Metrics,
}
