use serde::{Deserialize, Serialize};

/// Order creation request sent to the Cashfree PG API.
#[derive(Debug, Serialize)]
pub struct CreateOrderRequest {
    pub order_id: String,
    pub order_amount: f64,
    pub order_currency: String,
    pub customer_details: CustomerDetails,
    pub order_meta: OrderMeta,
}

#[derive(Debug, Serialize)]
pub struct CustomerDetails {
    pub customer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderMeta {
    pub return_url: String,
    pub notify_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub payment_session_id: Option<String>,
    pub order_status: Option<String>,
}

/// A successfully opened checkout session.
#[derive(Debug)]
pub struct CreatedOrder {
    pub order_id: String,
    pub payment_session_id: String,
}

/// Webhook envelope posted by the gateway. Unknown fields are ignored; the
/// handler only acts on the order id and the reported payment status.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub order: WebhookOrder,
    pub payment: WebhookPayment,
}

#[derive(Debug, Deserialize)]
pub struct WebhookOrder {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayment {
    pub payment_status: String,
    pub cf_payment_id: Option<serde_json::Value>,
}

/// Payment states the gateway can report, as a closed set. Anything not
/// recognized stays non-terminal: the webhook acknowledges it without
/// touching the booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    Success,
    Failed,
    Unrecognized(String),
}

impl GatewayPaymentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "SUCCESS" => GatewayPaymentStatus::Success,
            // USER_DROPPED is the gateway's "abandoned at the checkout
            // page" terminal state; treated the same as a failure.
            "FAILED" | "USER_DROPPED" => GatewayPaymentStatus::Failed,
            other => GatewayPaymentStatus::Unrecognized(other.to_string()),
        }
    }
}
