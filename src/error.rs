use thiserror::Error;

#[derive(Error, Debug)]
pub enum FulfillmentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment verification failed: {0}")]
    Verification(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Notification channel failed: {0}")]
    Channel(String),
}

pub type Result<T> = std::result::Result<T, FulfillmentError>;
