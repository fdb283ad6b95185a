use crate::catalog::Catalog;
use crate::config::PaypalConfig;
use crate::error::{FulfillmentError, Result};
use crate::money::{format_cents, parse_amount};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// An order as reported by the external payment authority.
#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub transaction_id: String,
    pub status: String,
    /// Decimal amount string as settled, e.g. "90.00".
    pub amount: String,
    pub currency: String,
    /// Comma-separated item ids attached to the order at checkout time.
    pub custom_data: String,
    pub payer_email: Option<String>,
}

/// Port to the external payment authority.
#[async_trait]
pub trait PaymentAuthority: Send + Sync {
    async fn fetch_order(&self, transaction_id: &str) -> Result<PaymentOrder>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    status: Option<String>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
    payer: Option<Payer>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    amount: Option<OrderAmount>,
    custom_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderAmount {
    currency_code: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Payer {
    email_address: Option<String>,
}

/// PayPal REST implementation: client-credentials token exchange followed by
/// an order fetch.
pub struct PaypalAuthority {
    config: PaypalConfig,
}

impl PaypalAuthority {
    pub fn new(config: PaypalConfig) -> Self {
        Self { config }
    }

    async fn access_token(&self) -> Result<String> {
        let resp = crate::http::OUTBOUND
            .post(format!("{}/v1/oauth2/token", self.config.api_base))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(FulfillmentError::Verification(format!(
                "token exchange returned status {}",
                resp.status()
            )));
        }
        let token: TokenResponse = resp.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentAuthority for PaypalAuthority {
    async fn fetch_order(&self, transaction_id: &str) -> Result<PaymentOrder> {
        let token = self.access_token().await?;
        let resp = crate::http::OUTBOUND
            .get(format!(
                "{}/v2/checkout/orders/{}",
                self.config.api_base, transaction_id
            ))
            .bearer_auth(token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(FulfillmentError::Verification(format!(
                "order fetch returned status {}",
                resp.status()
            )));
        }
        let order: OrderResponse = resp.json().await?;

        let unit = order.purchase_units.into_iter().next().ok_or_else(|| {
            FulfillmentError::Verification("order has no purchase units".to_string())
        })?;
        let amount = unit
            .amount
            .ok_or_else(|| FulfillmentError::Verification("order has no amount".to_string()))?;

        Ok(PaymentOrder {
            transaction_id: transaction_id.to_string(),
            status: order.status.unwrap_or_default(),
            amount: amount.value.unwrap_or_default(),
            currency: amount.currency_code.unwrap_or_default(),
            custom_data: unit.custom_id.unwrap_or_default(),
            payer_email: order.payer.and_then(|p| p.email_address),
        })
    }
}

/// Stand-in when no payment processor credentials are configured: every
/// verification fails closed.
pub struct UnconfiguredAuthority;

#[async_trait]
impl PaymentAuthority for UnconfiguredAuthority {
    async fn fetch_order(&self, _transaction_id: &str) -> Result<PaymentOrder> {
        Err(FulfillmentError::Verification(
            "payment authority credentials not configured".to_string(),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub transaction_id: String,
    pub item_id: String,
    /// Amount the client claims was charged, cross-checked when present.
    pub expected_amount: Option<String>,
    pub is_bundle: bool,
}

/// Outcome of a passed verification, carrying what fulfillment needs next.
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub transaction_id: String,
    /// Every item id covered by the order, in checkout order.
    pub item_ids: Vec<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub payer_email: Option<String>,
}

/// The single trust boundary between "a client claims to have paid" and
/// credential minting. One pass, no retries; a failed verification is terminal
/// for the request.
pub struct PaymentVerifier {
    authority: Arc<dyn PaymentAuthority>,
    catalog: Arc<dyn Catalog>,
    currency: String,
}

impl PaymentVerifier {
    pub fn new(
        authority: Arc<dyn PaymentAuthority>,
        catalog: Arc<dyn Catalog>,
        currency: String,
    ) -> Self {
        Self {
            authority,
            catalog,
            currency,
        }
    }

    pub async fn verify(&self, req: &VerifyRequest) -> Result<VerifiedPayment> {
        match self.check(req).await {
            Ok(verified) => {
                info!(
                    transaction_id = %req.transaction_id,
                    amount_cents = verified.amount_cents,
                    items = verified.item_ids.len(),
                    "payment verified"
                );
                metrics::counter!(crate::metrics::VERIFICATION_SUCCESS_TOTAL).increment(1);
                Ok(verified)
            }
            Err(e) => {
                warn!(transaction_id = %req.transaction_id, error = %e, "payment verification failed");
                metrics::counter!(crate::metrics::VERIFICATION_FAILURE_TOTAL).increment(1);
                Err(e)
            }
        }
    }

    async fn check(&self, req: &VerifyRequest) -> Result<VerifiedPayment> {
        // Server-side price first: the client never dictates what an item
        // costs.
        let item_price = self.catalog.price_cents(&req.item_id).ok_or_else(|| {
            FulfillmentError::Verification(format!("unknown catalog item {}", req.item_id))
        })?;

        let order = self
            .authority
            .fetch_order(&req.transaction_id)
            .await
            .map_err(|e| match e {
                FulfillmentError::Verification(_) => e,
                other => FulfillmentError::Verification(format!("order fetch failed: {other}")),
            })?;

        if order.status != "COMPLETED" {
            let status = if order.status.is_empty() {
                "missing"
            } else {
                order.status.as_str()
            };
            return Err(FulfillmentError::Verification(format!(
                "order status is {status}"
            )));
        }

        let item_ids: Vec<String> = order
            .custom_data
            .split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if !item_ids.iter().any(|id| id == &req.item_id) {
            return Err(FulfillmentError::Verification(format!(
                "item {} not present in order",
                req.item_id
            )));
        }

        let order_cents = parse_amount(&order.amount).map_err(|_| {
            FulfillmentError::Verification(format!("unparseable order amount '{}'", order.amount))
        })?;

        let expected_cents = if req.is_bundle {
            let mut sum: i64 = 0;
            for id in &item_ids {
                match self.catalog.price_cents(id) {
                    Some(price) => sum += price,
                    // Unresolvable bundle member: deny rather than undercharge.
                    None => {
                        return Err(FulfillmentError::Verification(format!(
                            "bundle item {id} has no catalog price"
                        )))
                    }
                }
            }
            sum
        } else {
            item_price
        };

        if order_cents != expected_cents {
            return Err(FulfillmentError::Verification(format!(
                "order amount {} does not match expected {}",
                order.amount,
                format_cents(expected_cents)
            )));
        }

        if let Some(claimed) = &req.expected_amount {
            let claimed_cents = parse_amount(claimed).map_err(|_| {
                FulfillmentError::Verification(format!("unparseable claimed amount '{claimed}'"))
            })?;
            if claimed_cents != order_cents {
                return Err(FulfillmentError::Verification(format!(
                    "claimed amount {claimed} does not match order amount {}",
                    order.amount
                )));
            }
        }

        if !order.currency.is_empty() && order.currency != self.currency {
            return Err(FulfillmentError::Verification(format!(
                "unexpected currency {}",
                order.currency
            )));
        }

        Ok(VerifiedPayment {
            transaction_id: req.transaction_id.clone(),
            item_ids,
            amount_cents: order_cents,
            currency: order.currency,
            payer_email: order.payer_email,
        })
    }
}
