use crate::error::{FulfillmentError, Result};
use std::env;

/// Runtime configuration, materialized once at startup from the environment.
/// Presence or absence of a setting here decides behavior for the whole
/// process lifetime: backend selection, verification, and the admin surface
/// are never re-probed per request.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Durable backend connection string. Absent means the process runs on the
    /// non-durable in-memory store.
    pub redis_url: Option<String>,
    /// Payment processor credentials. Absent means every verification fails
    /// closed.
    pub paypal: Option<PaypalConfig>,
    /// Shared secret for the admin reporting surface. Absent disables it.
    pub admin_api_key: Option<String>,
    /// Download credential lifetime, in hours.
    pub token_lifetime_hours: i64,
    /// Expected settlement currency for every order.
    pub currency: String,
    /// Path to the catalog TOML file.
    pub catalog_path: String,
    pub webhooks: WebhookConfig,
}

#[derive(Debug, Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub discord_url: Option<String>,
    pub slack_url: Option<String>,
    pub email_relay_url: Option<String>,
    pub sheet_log_url: Option<String>,
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let paypal = match (env_opt("PAYPAL_CLIENT_ID"), env_opt("PAYPAL_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(PaypalConfig {
                client_id,
                client_secret,
                api_base: env_opt("PAYPAL_API_BASE")
                    .unwrap_or_else(|| "https://api-m.paypal.com".to_string()),
            }),
            (None, None) => None,
            _ => {
                return Err(FulfillmentError::Config(
                    "PAYPAL_CLIENT_ID and PAYPAL_CLIENT_SECRET must be set together".to_string(),
                ))
            }
        };

        let token_lifetime_hours = match env_opt("TOKEN_LIFETIME_HOURS") {
            Some(raw) => raw.parse().map_err(|_| {
                FulfillmentError::Config(format!("invalid TOKEN_LIFETIME_HOURS: {raw}"))
            })?,
            None => 48,
        };

        Ok(Self {
            redis_url: env_opt("REDIS_URL"),
            paypal,
            admin_api_key: env_opt("ADMIN_API_KEY"),
            token_lifetime_hours,
            currency: env_opt("STORE_CURRENCY").unwrap_or_else(|| "USD".to_string()),
            catalog_path: env_opt("CATALOG_PATH").unwrap_or_else(|| "catalog.toml".to_string()),
            webhooks: WebhookConfig {
                discord_url: env_opt("DISCORD_WEBHOOK_URL"),
                slack_url: env_opt("SLACK_WEBHOOK_URL"),
                email_relay_url: env_opt("EMAIL_RELAY_WEBHOOK_URL"),
                sheet_log_url: env_opt("SHEET_LOG_WEBHOOK_URL"),
            },
        })
    }
}
