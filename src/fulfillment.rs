use crate::catalog::Catalog;
use crate::error::{FulfillmentError, Result};
use crate::ledger::{NewSale, SalesLedger};
use crate::money::parse_amount;
use crate::notify::{NotifiedItem, Notifier, SaleNotification};
use crate::tokens::TokenStore;
use crate::verify::{PaymentVerifier, VerifyRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmPurchaseRequest {
    pub transaction_id: String,
    pub item_id: String,
    pub buyer_email: String,
    #[serde(default)]
    pub is_bundle: bool,
    #[serde(default)]
    pub expected_amount: Option<String>,
    #[serde(default)]
    pub bundle_discount: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    pub item_id: String,
    pub item_title: String,
    pub credential_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub transaction_id: String,
    pub credentials: Vec<IssuedCredential>,
}

/// What a redeemed credential unlocks. The actual file bytes are fetched by a
/// separate delivery layer keyed on `item_id`.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadGrant {
    pub item_id: String,
    pub item_title: String,
    pub buyer_contact: String,
    pub expires_at: DateTime<Utc>,
}

/// Wires the verification gate, token store, ledger, and fan-out into the two
/// purchase-facing operations: confirming a payment and redeeming a
/// credential. Only a passed verification ever reaches the token store.
pub struct FulfillmentService {
    verifier: PaymentVerifier,
    tokens: TokenStore,
    ledger: Arc<SalesLedger>,
    notifier: Notifier,
    catalog: Arc<dyn Catalog>,
}

impl FulfillmentService {
    pub fn new(
        verifier: PaymentVerifier,
        tokens: TokenStore,
        ledger: Arc<SalesLedger>,
        notifier: Notifier,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            verifier,
            tokens,
            ledger,
            notifier,
            catalog,
        }
    }

    pub async fn confirm_purchase(
        &self,
        req: ConfirmPurchaseRequest,
    ) -> Result<PurchaseReceipt> {
        validate(&req)?;

        let verified = self
            .verifier
            .verify(&VerifyRequest {
                transaction_id: req.transaction_id.clone(),
                item_id: req.item_id.clone(),
                expected_amount: req.expected_amount.clone(),
                is_bundle: req.is_bundle,
            })
            .await?;

        // The payment authority's payer address wins over what the client
        // typed into the checkout form.
        let buyer_contact = verified
            .payer_email
            .clone()
            .unwrap_or_else(|| req.buyer_email.clone());

        let bundle_discount_cents = match &req.bundle_discount {
            Some(raw) => parse_amount(raw).map_err(|_| {
                FulfillmentError::Validation(format!("malformed bundle_discount: {raw}"))
            })?,
            None => 0,
        };

        let item_ids = if req.is_bundle {
            verified.item_ids.clone()
        } else {
            vec![req.item_id.clone()]
        };

        let mut credentials = Vec::with_capacity(item_ids.len());
        let mut notified_items = Vec::with_capacity(item_ids.len());
        for item_id in &item_ids {
            let title = self
                .catalog
                .title(item_id)
                .unwrap_or_else(|| item_id.clone());
            // Per-line amount: the catalog price for bundle members, the
            // settled order amount for a single-item purchase. Verification
            // already proved these are consistent.
            let amount_cents = if req.is_bundle {
                self.catalog.price_cents(item_id).unwrap_or(0)
            } else {
                verified.amount_cents
            };

            let credential = self
                .tokens
                .issue(&req.transaction_id, item_id, &buyer_contact, &title)
                .await;

            self.ledger
                .record(NewSale {
                    transaction_id: req.transaction_id.clone(),
                    item_id: item_id.clone(),
                    item_title: title.clone(),
                    buyer_contact: buyer_contact.clone(),
                    amount_cents,
                    is_bundle: req.is_bundle,
                    bundle_discount_cents,
                })
                .await;

            notified_items.push(NotifiedItem {
                item_id: item_id.clone(),
                title: title.clone(),
            });
            credentials.push(IssuedCredential {
                item_id: item_id.clone(),
                item_title: title,
                credential_id: credential.credential_id,
                expires_at: credential.expires_at,
            });
        }

        self.notifier.dispatch(SaleNotification {
            transaction_id: req.transaction_id.clone(),
            items: notified_items,
            total_cents: verified.amount_cents,
            buyer_contact,
            is_bundle: req.is_bundle,
        });

        info!(
            transaction_id = %req.transaction_id,
            credentials = credentials.len(),
            "purchase fulfilled"
        );
        Ok(PurchaseReceipt {
            transaction_id: req.transaction_id,
            credentials,
        })
    }

    /// Redeem a credential for one item. NotFound covers both absent and
    /// expired credentials; a live credential bound to a different item is
    /// Forbidden.
    pub async fn redeem(&self, credential_id: &str, item_id: &str) -> Result<DownloadGrant> {
        let credential = self.tokens.lookup(credential_id).await?;
        if credential.item_id != item_id {
            return Err(FulfillmentError::Forbidden(format!(
                "credential is not valid for item {item_id}"
            )));
        }

        let credential = self.tokens.mark_redeemed(credential_id).await?;
        metrics::counter!(crate::metrics::DOWNLOADS_SERVED_TOTAL).increment(1);
        info!(
            credential_id = %credential.credential_id,
            item_id = %credential.item_id,
            "download credential redeemed"
        );
        Ok(DownloadGrant {
            item_id: credential.item_id,
            item_title: credential.item_title,
            buyer_contact: credential.buyer_contact,
            expires_at: credential.expires_at,
        })
    }
}

fn validate(req: &ConfirmPurchaseRequest) -> Result<()> {
    if req.transaction_id.trim().is_empty() {
        return Err(FulfillmentError::Validation(
            "transaction_id is required".to_string(),
        ));
    }
    if req.item_id.trim().is_empty() {
        return Err(FulfillmentError::Validation("item_id is required".to_string()));
    }
    if req.buyer_email.trim().is_empty() || !req.buyer_email.contains('@') {
        return Err(FulfillmentError::Validation(
            "buyer_email must be a valid email address".to_string(),
        ));
    }
    Ok(())
}
