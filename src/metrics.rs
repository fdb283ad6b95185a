use std::net::SocketAddr;
use tracing::{info, warn};

// Metric names, Prometheus conventions.
pub const BACKEND_FALLBACK_TOTAL: &str = "beatvault_backend_fallback_total";
pub const BACKEND_ERRORS_TOTAL: &str = "beatvault_backend_errors_total";
pub const VERIFICATION_SUCCESS_TOTAL: &str = "beatvault_verification_success_total";
pub const VERIFICATION_FAILURE_TOTAL: &str = "beatvault_verification_failure_total";
pub const TOKENS_ISSUED_TOTAL: &str = "beatvault_tokens_issued_total";
pub const DOWNLOADS_SERVED_TOTAL: &str = "beatvault_downloads_served_total";
pub const SALES_RECORDED_TOTAL: &str = "beatvault_sales_recorded_total";
pub const NOTIFICATIONS_SENT_TOTAL: &str = "beatvault_notifications_sent_total";
pub const NOTIFICATIONS_FAILED_TOTAL: &str = "beatvault_notifications_failed_total";

pub fn init_metrics() {
    let port: u16 = std::env::var("BEATVAULT_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9898);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            info!("Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            warn!("Prometheus exporter install failed (possibly already installed): {}", e);
        }
    }
}
