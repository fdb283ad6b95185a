use once_cell::sync::Lazy;
use std::time::Duration;

/// Shared outbound HTTP client. Every call to the payment authority or a
/// webhook channel runs under a bounded timeout.
pub static OUTBOUND: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});
