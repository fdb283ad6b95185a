use crate::backend::KvBackend;
use crate::clock::Clock;
use crate::error::{FulfillmentError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// A time-bounded download credential scoped to one purchased item within one
/// transaction. Redemption is observational: the buyer may re-download until
/// the credential expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadCredential {
    pub credential_id: String,
    pub transaction_id: String,
    pub item_id: String,
    pub buyer_contact: String,
    pub item_title: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub redeemed: bool,
}

/// Deterministic credential id: stable across retried confirmations, safe in a
/// URL path segment, and free of pricing information.
pub fn credential_id(transaction_id: &str, item_id: &str) -> String {
    format!("{transaction_id}-{item_id}")
}

fn credential_key(credential_id: &str) -> String {
    format!("credential:{credential_id}")
}

/// Owns the credential lifecycle end to end. No other component creates,
/// expires, or mutates credentials.
pub struct TokenStore {
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>, lifetime: Duration) -> Self {
        Self {
            backend,
            clock,
            lifetime,
        }
    }

    /// Mint a credential for one purchased item. Re-issuing for the same
    /// `(transaction_id, item_id)` overwrites with a fresh credential, so
    /// client retries are safe. A backend failure degrades to a warning: the
    /// buyer still gets their credential id and the purchase flow continues.
    pub async fn issue(
        &self,
        transaction_id: &str,
        item_id: &str,
        buyer_contact: &str,
        item_title: &str,
    ) -> DownloadCredential {
        let now = self.clock.now_utc();
        let credential = DownloadCredential {
            credential_id: credential_id(transaction_id, item_id),
            transaction_id: transaction_id.to_string(),
            item_id: item_id.to_string(),
            buyer_contact: buyer_contact.to_string(),
            item_title: item_title.to_string(),
            created_at: now,
            expires_at: now + self.lifetime,
            redeemed: false,
        };

        let key = credential_key(&credential.credential_id);
        let ttl = self.lifetime.num_seconds().max(1) as u64;
        match serde_json::to_string(&credential) {
            Ok(json) => {
                if let Err(e) = self.backend.put(&key, &json, Some(ttl)).await {
                    warn!(
                        backend = self.backend.name(),
                        credential_id = %credential.credential_id,
                        error = %e,
                        "failed to persist download credential"
                    );
                    metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
                }
            }
            Err(e) => {
                warn!(credential_id = %credential.credential_id, error = %e, "failed to encode credential");
            }
        }

        metrics::counter!(crate::metrics::TOKENS_ISSUED_TOTAL).increment(1);
        debug!(credential_id = %credential.credential_id, item_id = %item_id, "issued download credential");
        credential
    }

    /// Fetch a credential. Entries past their expiry instant are lazily
    /// deleted and reported as NotFound even when the backend TTL has not yet
    /// physically reaped them.
    pub async fn lookup(&self, credential_id: &str) -> Result<DownloadCredential> {
        let key = credential_key(credential_id);
        let raw = match self.backend.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "credential fetch failed");
                metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
                None
            }
        };
        let Some(raw) = raw else {
            return Err(FulfillmentError::NotFound(format!(
                "credential {credential_id}"
            )));
        };

        let credential: DownloadCredential = match serde_json::from_str(&raw) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(credential_id = %credential_id, error = %e, "corrupt credential entry, dropping");
                let _ = self.backend.delete(&key).await;
                return Err(FulfillmentError::NotFound(format!(
                    "credential {credential_id}"
                )));
            }
        };

        if credential.expires_at <= self.clock.now_utc() {
            debug!(credential_id = %credential_id, "credential expired, lazy delete");
            let _ = self.backend.delete(&key).await;
            return Err(FulfillmentError::NotFound(format!(
                "credential {credential_id}"
            )));
        }

        Ok(credential)
    }

    /// Flag a credential as redeemed, re-persisting with the remaining TTL so
    /// the original expiry instant is never extended.
    pub async fn mark_redeemed(&self, credential_id: &str) -> Result<DownloadCredential> {
        let mut credential = self.lookup(credential_id).await?;
        credential.redeemed = true;

        let remaining = (credential.expires_at - self.clock.now_utc())
            .num_seconds()
            .max(1) as u64;
        match serde_json::to_string(&credential) {
            Ok(json) => {
                if let Err(e) = self
                    .backend
                    .put(&credential_key(credential_id), &json, Some(remaining))
                    .await
                {
                    warn!(
                        backend = self.backend.name(),
                        credential_id = %credential_id,
                        error = %e,
                        "failed to persist redemption flag"
                    );
                    metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
                }
            }
            Err(e) => {
                warn!(credential_id = %credential_id, error = %e, "failed to encode credential");
            }
        }
        Ok(credential)
    }

    /// Authorization gate used before releasing file bytes: a credential
    /// minted for item A never unlocks item B. Absent or expired credentials
    /// never match.
    pub async fn matches(&self, credential_id: &str, item_id: &str) -> bool {
        match self.lookup(credential_id).await {
            Ok(credential) => credential.item_id == item_id,
            Err(_) => false,
        }
    }
}
