use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Flat booking fee added once per order, in whole rupees.
pub const BOOKING_FEE: i64 = 7;

/// How long a PENDING booking holds its inventory before the reaper
/// reclaims it.
pub const BOOKING_HOLD_MINUTES: i64 = 15;

/// Logical TTL for idempotency records.
pub const IDEMPOTENCY_TTL_SECONDS: i64 = 300;

/// Maximum bookings expired per reaper invocation.
pub const EXPIRY_BATCH_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Expired,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Initiated,
    Success,
    Failed,
    Expired,
}

/// One line of a booking: a ticket type and how many were taken at what
/// price. Prices are copied from the event record at reservation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub ticket_type_id: String,
    pub quantity: i32,
    pub unit_price: i64,
}

/// One purchase attempt. Never deleted; terminal bookings stay as the
/// audit record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub event_id: String,
    pub order_id: Option<String>,
    pub items: Vec<LineItem>,
    pub subtotal: i64,
    pub booking_fee: i64,
    pub total_amount: i64,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub qr_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expired_at: Option<DateTime<Utc>>,
    pub confirmation_email_sent_at: Option<DateTime<Utc>>,
}

/// Inventory for one ticket type of one event.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketInventory {
    pub ticket_type_id: String,
    pub name: String,
    pub unit_price: i64,
    pub total_quantity: i32,
    pub tickets_sold: i32,
    pub max_per_order: i32,
}

impl TicketInventory {
    pub fn remaining(&self) -> i32 {
        (self.total_quantity - self.tickets_sold).max(0)
    }
}

/// An event with its embedded per-ticket-type inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    pub title: String,
    pub ticket_types: Vec<TicketInventory>,
}

impl EventRecord {
    pub fn ticket_type(&self, ticket_type_id: &str) -> Option<&TicketInventory> {
        self.ticket_types
            .iter()
            .find(|t| t.ticket_type_id == ticket_type_id)
    }
}

/// Links a checkout attempt to the gateway session it opened.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub payment_session_id: String,
    pub order_id: String,
    pub booking_id: Uuid,
    pub user_id: String,
    pub event_id: String,
    pub amount: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub key: String,
    pub result: JsonValue,
    pub created_at: DateTime<Utc>,
}

// ---- Request / response DTOs ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub event_id: String,
    pub items: Vec<ReserveItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveItem {
    pub ticket_type_id: String,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveResponse {
    pub booking_id: Uuid,
    pub total_amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub payment_session_id: String,
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub payment_session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub booking_id: Uuid,
    pub qr_token: String,
    pub event_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MyBookingsRequest {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ExpireResponse {
    pub expired: u64,
}
