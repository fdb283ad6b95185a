use async_trait::async_trait;
use beatvault::backend::MemoryBackend;
use beatvault::catalog::{Catalog, StaticCatalog};
use beatvault::clock::FixedClock;
use beatvault::config::WebhookConfig;
use beatvault::error::{FulfillmentError, Result};
use beatvault::fulfillment::{ConfirmPurchaseRequest, FulfillmentService};
use beatvault::ledger::SalesLedger;
use beatvault::notify::Notifier;
use beatvault::tokens::TokenStore;
use beatvault::verify::{PaymentAuthority, PaymentOrder, PaymentVerifier};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

struct ScriptedAuthority {
    order: PaymentOrder,
}

#[async_trait]
impl PaymentAuthority for ScriptedAuthority {
    async fn fetch_order(&self, _transaction_id: &str) -> Result<PaymentOrder> {
        Ok(self.order.clone())
    }
}

fn catalog() -> Arc<StaticCatalog> {
    Arc::new(StaticCatalog::new(&[
        ("beat-1", "Midnight Drive", 5000),
        ("beat-2", "Cold Open", 4500),
        ("loop-pack-1", "808 Essentials", 2500),
    ]))
}

fn service(order: PaymentOrder) -> (Arc<FixedClock>, FulfillmentService) {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let catalog: Arc<dyn Catalog> = catalog();

    let tokens = TokenStore::new(backend.clone(), clock.clone(), Duration::hours(48));
    let ledger = Arc::new(SalesLedger::new(backend.clone(), clock.clone()));
    let verifier = PaymentVerifier::new(
        Arc::new(ScriptedAuthority { order }),
        catalog.clone(),
        "USD".to_string(),
    );
    let notifier = Notifier::from_config(&WebhookConfig::default());

    let service = FulfillmentService::new(verifier, tokens, ledger, notifier, catalog);
    (clock, service)
}

fn completed_order(amount: &str, custom_data: &str) -> PaymentOrder {
    PaymentOrder {
        transaction_id: "TXN123".to_string(),
        status: "COMPLETED".to_string(),
        amount: amount.to_string(),
        currency: "USD".to_string(),
        custom_data: custom_data.to_string(),
        payer_email: None,
    }
}

fn confirm_request(item_id: &str, is_bundle: bool) -> ConfirmPurchaseRequest {
    ConfirmPurchaseRequest {
        transaction_id: "TXN123".to_string(),
        item_id: item_id.to_string(),
        buyer_email: "buyer@example.com".to_string(),
        is_bundle,
        expected_amount: None,
        bundle_discount: None,
    }
}

#[tokio::test]
async fn single_purchase_end_to_end() {
    let (_, service) = service(completed_order("50.00", "beat-1"));

    let receipt = service
        .confirm_purchase(confirm_request("beat-1", false))
        .await
        .unwrap();
    assert_eq!(receipt.transaction_id, "TXN123");
    assert_eq!(receipt.credentials.len(), 1);
    assert_eq!(receipt.credentials[0].credential_id, "TXN123-beat-1");
    assert_eq!(receipt.credentials[0].item_title, "Midnight Drive");

    let grant = service.redeem("TXN123-beat-1", "beat-1").await.unwrap();
    assert_eq!(grant.item_id, "beat-1");
    assert_eq!(grant.buyer_contact, "buyer@example.com");
}

#[tokio::test]
async fn single_purchase_updates_the_ledger() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let catalog: Arc<dyn Catalog> = catalog();
    let tokens = TokenStore::new(backend.clone(), clock.clone(), Duration::hours(48));
    let ledger = Arc::new(SalesLedger::new(backend.clone(), clock.clone()));
    let verifier = PaymentVerifier::new(
        Arc::new(ScriptedAuthority {
            order: completed_order("50.00", "beat-1"),
        }),
        catalog.clone(),
        "USD".to_string(),
    );
    let service = FulfillmentService::new(
        verifier,
        tokens,
        ledger.clone(),
        Notifier::from_config(&WebhookConfig::default()),
        catalog,
    );

    service
        .confirm_purchase(confirm_request("beat-1", false))
        .await
        .unwrap();

    let stats = ledger.stats().await;
    assert_eq!(stats.total_sale_count, 1);
    assert_eq!(stats.total_revenue_cents, 5000);

    let recent = ledger.recent(10).await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].sale_id, "TXN123-beat-1");
    assert!(!recent[0].is_bundle);
}

#[tokio::test]
async fn bundle_purchase_mints_a_credential_per_item() {
    let (_, service) = service(completed_order("120.00", "beat-1,beat-2,loop-pack-1"));

    let receipt = service
        .confirm_purchase(confirm_request("beat-1", true))
        .await
        .unwrap();
    assert_eq!(receipt.credentials.len(), 3);

    // Each credential unlocks exactly its own item.
    for credential in &receipt.credentials {
        let grant = service
            .redeem(&credential.credential_id, &credential.item_id)
            .await
            .unwrap();
        assert_eq!(grant.item_id, credential.item_id);
    }
    let err = service.redeem("TXN123-beat-1", "beat-2").await.unwrap_err();
    assert!(matches!(err, FulfillmentError::Forbidden(_)));
}

#[tokio::test]
async fn failed_verification_mints_nothing() {
    // Order settled 10.00 short of the catalog price.
    let (_, service) = service(completed_order("40.00", "beat-1"));

    let err = service
        .confirm_purchase(confirm_request("beat-1", false))
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Verification(_)));

    let err = service.redeem("TXN123-beat-1", "beat-1").await.unwrap_err();
    assert!(matches!(err, FulfillmentError::NotFound(_)));
}

#[tokio::test]
async fn validation_rejects_malformed_requests() {
    let (_, service) = service(completed_order("50.00", "beat-1"));

    let mut req = confirm_request("beat-1", false);
    req.transaction_id = "  ".to_string();
    assert!(matches!(
        service.confirm_purchase(req).await.unwrap_err(),
        FulfillmentError::Validation(_)
    ));

    let mut req = confirm_request("beat-1", false);
    req.buyer_email = "not-an-email".to_string();
    assert!(matches!(
        service.confirm_purchase(req).await.unwrap_err(),
        FulfillmentError::Validation(_)
    ));
}

#[tokio::test]
async fn retried_confirmation_is_idempotent() {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let catalog: Arc<dyn Catalog> = catalog();
    let tokens = TokenStore::new(backend.clone(), clock.clone(), Duration::hours(48));
    let ledger = Arc::new(SalesLedger::new(backend.clone(), clock.clone()));
    let verifier = PaymentVerifier::new(
        Arc::new(ScriptedAuthority {
            order: completed_order("50.00", "beat-1"),
        }),
        catalog.clone(),
        "USD".to_string(),
    );
    let service = FulfillmentService::new(
        verifier,
        tokens,
        ledger.clone(),
        Notifier::from_config(&WebhookConfig::default()),
        catalog,
    );

    let first = service
        .confirm_purchase(confirm_request("beat-1", false))
        .await
        .unwrap();
    let second = service
        .confirm_purchase(confirm_request("beat-1", false))
        .await
        .unwrap();

    assert_eq!(
        first.credentials[0].credential_id,
        second.credentials[0].credential_id
    );
    let stats = ledger.stats().await;
    assert_eq!(stats.total_sale_count, 1);
    assert_eq!(stats.total_revenue_cents, 5000);
}

#[tokio::test]
async fn payer_email_from_the_authority_wins() {
    let mut order = completed_order("50.00", "beat-1");
    order.payer_email = Some("payer@paypal.example".to_string());
    let (_, service) = service(order);

    service
        .confirm_purchase(confirm_request("beat-1", false))
        .await
        .unwrap();

    let grant = service.redeem("TXN123-beat-1", "beat-1").await.unwrap();
    assert_eq!(grant.buyer_contact, "payer@paypal.example");
}
