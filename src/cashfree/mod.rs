pub mod error;
pub mod types;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use error::CashfreeError;
use types::{CreateOrderRequest, CreateOrderResponse, CreatedOrder, CustomerDetails, OrderMeta};

const ORDER_ID_PREFIX: &str = "MVG";

/// Configuration for the Cashfree PG API client.
#[derive(Debug, Clone)]
pub struct CashfreeConfig {
    pub app_id: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub sandbox: bool,
    pub base_path: String,
}

impl CashfreeConfig {
    /// Load configuration from environment variables. Missing credentials
    /// fail closed.
    pub fn from_env() -> Result<Self, CashfreeError> {
        let app_id = std::env::var("CASHFREE_APP_ID")
            .map_err(|_| CashfreeError::ConfigError("Missing CASHFREE_APP_ID".to_string()))?;
        let secret_key = std::env::var("CASHFREE_SECRET_KEY")
            .map_err(|_| CashfreeError::ConfigError("Missing CASHFREE_SECRET_KEY".to_string()))?;
        let webhook_secret = std::env::var("CASHFREE_WEBHOOK_SECRET").map_err(|_| {
            CashfreeError::ConfigError("Missing CASHFREE_WEBHOOK_SECRET".to_string())
        })?;

        let sandbox = std::env::var("CASHFREE_SANDBOX")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let base_path = if sandbox {
            "https://sandbox.cashfree.com/pg".to_string()
        } else {
            "https://api.cashfree.com/pg".to_string()
        };

        Ok(CashfreeConfig {
            app_id,
            secret_key,
            webhook_secret,
            sandbox,
            base_path,
        })
    }
}

/// Cashfree PG API client.
#[derive(Clone)]
pub struct CashfreeClient {
    config: Arc<CashfreeConfig>,
    http_client: reqwest::Client,
}

impl CashfreeClient {
    pub fn new(config: CashfreeConfig) -> Result<Self, CashfreeError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CashfreeError::HttpError(e.to_string()))?;

        Ok(CashfreeClient {
            config: Arc::new(config),
            http_client,
        })
    }

    pub fn from_env() -> Result<Self, CashfreeError> {
        let config = CashfreeConfig::from_env()?;
        Self::new(config)
    }

    /// Open a hosted checkout session for an order.
    ///
    /// No retries here: a failed session creation surfaces immediately so
    /// the storefront can offer "try again".
    pub async fn create_order(
        &self,
        order_id: &str,
        amount: i64,
        customer_id: &str,
        return_url: &str,
        notify_url: &str,
    ) -> Result<CreatedOrder, CashfreeError> {
        let request = CreateOrderRequest {
            order_id: order_id.to_string(),
            order_amount: amount as f64,
            order_currency: "INR".to_string(),
            customer_details: CustomerDetails {
                customer_id: customer_id.to_string(),
                customer_email: None,
                customer_phone: None,
            },
            order_meta: OrderMeta {
                return_url: return_url.to_string(),
                notify_url: notify_url.to_string(),
            },
        };

        let url = format!("{}/orders", self.config.base_path);
        let response = self
            .http_client
            .post(&url)
            .header("x-client-id", &self.config.app_id)
            .header("x-client-secret", &self.config.secret_key)
            .header("x-api-version", "2023-08-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| CashfreeError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(CashfreeError::ApiError {
                status_code: status.as_u16(),
                message: error_body,
            });
        }

        let order: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| CashfreeError::ParseError(e.to_string()))?;

        let payment_session_id = order.payment_session_id.ok_or(CashfreeError::ApiError {
            status_code: status.as_u16(),
            message: "Gateway response missing payment_session_id".to_string(),
        })?;

        Ok(CreatedOrder {
            order_id: order.order_id,
            payment_session_id,
        })
    }

    pub fn config(&self) -> &CashfreeConfig {
        &self.config
    }
}

/// Generate a gateway order id: `MVG-{timestamp_ms}-{random}`.
pub fn generate_order_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    format!(
        "{}-{}-{}",
        ORDER_ID_PREFIX,
        Utc::now().timestamp_millis(),
        suffix
    )
}
