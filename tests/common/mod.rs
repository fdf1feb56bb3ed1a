use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use sha2::Sha256;

use movigoo_bookings_rs::auth::{IdentityClaims, IdentityVerifier};
use movigoo_bookings_rs::cashfree::{CashfreeClient, CashfreeConfig};
use movigoo_bookings_rs::config::{Config, StoreBackend};
use movigoo_bookings_rs::email::Mailer;
use movigoo_bookings_rs::metrics::Metrics;
use movigoo_bookings_rs::models::{EventRecord, TicketInventory};
use movigoo_bookings_rs::routes;
use movigoo_bookings_rs::store::{BookingStore, MemoryStore};
use movigoo_bookings_rs::AppState;

pub const WEBHOOK_SECRET: &str = "cf_test_webhook_secret";
pub const IDENTITY_SECRET: &str = "identity_test_secret";
pub const PROJECT_ID: &str = "movigoo-test";
pub const CRON_SECRET: &str = "cron_test_secret";

pub const EVENT_ID: &str = "ev-standup-night";

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        store_backend: StoreBackend::Memory,
        database_url: None,
        public_base_url: "https://movigoo.test".to_string(),
        cron_secret: CRON_SECRET.to_string(),
        identity_jwt_secret: IDENTITY_SECRET.to_string(),
        identity_project_id: PROJECT_ID.to_string(),
        email_api_key: "test-email-key".to_string(),
        email_template_id: "tpl-confirmation".to_string(),
    }
}

fn test_gateway() -> CashfreeClient {
    CashfreeClient::new(CashfreeConfig {
        app_id: "test-app".to_string(),
        secret_key: "test-secret".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        sandbox: true,
        base_path: "http://127.0.0.1:9".to_string(),
    })
    .expect("gateway client")
}

/// App state backed by a fresh in-memory store. The store handle is
/// returned separately so tests can inspect and backdate records.
pub fn setup_state() -> (Arc<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState {
        store: store.clone() as Arc<dyn BookingStore>,
        config: test_config(),
        gateway: test_gateway(),
        identity: IdentityVerifier::new(IDENTITY_SECRET, PROJECT_ID),
        mailer: Mailer::new("test-email-key".to_string(), "tpl-confirmation".to_string()),
        metrics: Metrics::new(),
    });
    (state, store)
}

pub fn app(state: Arc<AppState>) -> Router {
    routes::app_router(state)
}

/// Seed the standard test event: 10 VIP at 5000 and 100 GA at 500.
pub async fn seed_event(store: &MemoryStore) {
    store
        .upsert_event(&EventRecord {
            id: EVENT_ID.to_string(),
            title: "Standup Night".to_string(),
            ticket_types: vec![
                TicketInventory {
                    ticket_type_id: "vip".to_string(),
                    name: "VIP".to_string(),
                    unit_price: 5000,
                    total_quantity: 10,
                    tickets_sold: 0,
                    max_per_order: 4,
                },
                TicketInventory {
                    ticket_type_id: "ga".to_string(),
                    name: "General".to_string(),
                    unit_price: 500,
                    total_quantity: 100,
                    tickets_sold: 0,
                    max_per_order: 10,
                },
            ],
        })
        .await
        .expect("seed event");
}

/// Mint an identity token the way the external provider would.
pub fn identity_token(user_id: &str) -> String {
    let claims = IdentityClaims {
        sub: user_id.to_string(),
        aud: PROJECT_ID.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(IDENTITY_SECRET.as_bytes()),
    )
    .expect("token")
}

/// Sign a webhook payload the way the gateway does: base64 HMAC-SHA256
/// over `{timestamp}{raw_body}`.
pub fn webhook_signature(payload: &str, timestamp: i64, secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(payload.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

pub fn post_json(uri: &str, token: Option<&str>, body: &serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn signed_webhook(uri: &str, payload: &str, timestamp: i64, secret: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-webhook-timestamp", timestamp.to_string())
        .header("x-webhook-signature", webhook_signature(payload, timestamp, secret))
        .body(Body::from(payload.to_string()))
        .unwrap()
}

/// Read response body as JSON.
pub async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}
