use crate::config::WebhookConfig;
use crate::error::{FulfillmentError, Result};
use crate::money::format_cents;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Payload broadcast to every configured channel after a confirmed purchase.
/// One notification per transaction, not per line item.
#[derive(Debug, Clone)]
pub struct SaleNotification {
    pub transaction_id: String,
    pub items: Vec<NotifiedItem>,
    pub total_cents: i64,
    pub buyer_contact: String,
    pub is_bundle: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifiedItem {
    pub item_id: String,
    pub title: String,
}

#[derive(Debug, Clone)]
struct Channel {
    kind: &'static str,
    url: String,
}

/// Best-effort fan-out to external channels. Channel failures are isolated
/// and logged; nothing here ever reaches the purchase response path.
pub struct Notifier {
    channels: Vec<Channel>,
}

impl Notifier {
    pub fn from_config(webhooks: &WebhookConfig) -> Self {
        let mut channels = Vec::new();
        if let Some(url) = &webhooks.discord_url {
            channels.push(Channel {
                kind: "discord",
                url: url.clone(),
            });
        }
        if let Some(url) = &webhooks.slack_url {
            channels.push(Channel {
                kind: "slack",
                url: url.clone(),
            });
        }
        if let Some(url) = &webhooks.email_relay_url {
            channels.push(Channel {
                kind: "email-relay",
                url: url.clone(),
            });
        }
        if let Some(url) = &webhooks.sheet_log_url {
            channels.push(Channel {
                kind: "sheet-log",
                url: url.clone(),
            });
        }
        if channels.is_empty() {
            info!("no notification channels configured, sale fan-out is a no-op");
        } else {
            info!(channels = channels.len(), "notification fan-out configured");
        }
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Fire-and-forget: spawns one task per channel and returns immediately.
    pub fn dispatch(&self, notification: SaleNotification) {
        if self.channels.is_empty() {
            debug!(transaction_id = %notification.transaction_id, "sale fan-out skipped, no channels");
            return;
        }
        for channel in self.channels.clone() {
            let notification = notification.clone();
            tokio::spawn(async move {
                match send_to_channel(&channel, &notification).await {
                    Ok(()) => {
                        metrics::counter!(crate::metrics::NOTIFICATIONS_SENT_TOTAL).increment(1);
                    }
                    Err(e) => {
                        warn!(
                            channel = channel.kind,
                            transaction_id = %notification.transaction_id,
                            error = %e,
                            "notification channel failed"
                        );
                        metrics::counter!(crate::metrics::NOTIFICATIONS_FAILED_TOTAL).increment(1);
                    }
                }
            });
        }
    }
}

fn summary_line(notification: &SaleNotification) -> String {
    let titles: Vec<&str> = notification
        .items
        .iter()
        .map(|item| item.title.as_str())
        .collect();
    let kind = if notification.is_bundle {
        "bundle sale"
    } else {
        "sale"
    };
    format!(
        "New {}: {} for ${} to {}",
        kind,
        titles.join(", "),
        format_cents(notification.total_cents),
        notification.buyer_contact
    )
}

async fn send_to_channel(channel: &Channel, notification: &SaleNotification) -> Result<()> {
    // Chat channels get a human line; relay channels get the structured sale.
    let body = match channel.kind {
        "discord" => json!({ "content": summary_line(notification) }),
        "slack" => json!({ "text": summary_line(notification) }),
        _ => json!({
            "transaction_id": notification.transaction_id,
            "items": notification.items,
            "total": format_cents(notification.total_cents),
            "buyer": notification.buyer_contact,
            "is_bundle": notification.is_bundle,
        }),
    };

    let resp = crate::http::OUTBOUND
        .post(&channel.url)
        .json(&body)
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(FulfillmentError::Channel(format!(
            "{} webhook returned status {}",
            channel.kind,
            resp.status()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_channels_from_config() {
        let notifier = Notifier::from_config(&WebhookConfig::default());
        assert_eq!(notifier.channel_count(), 0);

        let notifier = Notifier::from_config(&WebhookConfig {
            discord_url: Some("https://discord.example/hook".to_string()),
            slack_url: None,
            email_relay_url: Some("https://relay.example/hook".to_string()),
            sheet_log_url: None,
        });
        assert_eq!(notifier.channel_count(), 2);
    }

    #[test]
    fn summary_line_lists_all_items() {
        let line = summary_line(&SaleNotification {
            transaction_id: "TXN1".to_string(),
            items: vec![
                NotifiedItem {
                    item_id: "beat-a".to_string(),
                    title: "Night Shift".to_string(),
                },
                NotifiedItem {
                    item_id: "beat-b".to_string(),
                    title: "Cold Open".to_string(),
                },
            ],
            total_cents: 7500,
            buyer_contact: "buyer@example.com".to_string(),
            is_bundle: true,
        });
        assert_eq!(
            line,
            "New bundle sale: Night Shift, Cold Open for $75.00 to buyer@example.com"
        );
    }
}
