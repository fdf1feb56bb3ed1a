use thiserror::Error;

#[derive(Error, Debug)]
pub enum CashfreeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Webhook signature verification failed")]
    WebhookVerificationFailed,
}

impl CashfreeError {
    /// Whether this is an upstream 5xx, worth surfacing as retryable.
    pub fn is_server_error(&self) -> bool {
        matches!(self, CashfreeError::ApiError { status_code, .. } if (500..600).contains(status_code))
    }
}
