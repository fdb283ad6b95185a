use beatvault::backend::{KvBackend, MemoryBackend};
use beatvault::clock::FixedClock;
use beatvault::ledger::{NewSale, SalesLedger, SALES_INDEX_KEY};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

fn ledger() -> (Arc<MemoryBackend>, Arc<FixedClock>, SalesLedger) {
    let backend = Arc::new(MemoryBackend::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let ledger = SalesLedger::new(backend.clone(), clock.clone());
    (backend, clock, ledger)
}

fn sale(transaction_id: &str, item_id: &str, amount_cents: i64) -> NewSale {
    NewSale {
        transaction_id: transaction_id.to_string(),
        item_id: item_id.to_string(),
        item_title: format!("Title of {item_id}"),
        buyer_contact: "buyer@example.com".to_string(),
        amount_cents,
        is_bundle: false,
        bundle_discount_cents: 0,
    }
}

#[tokio::test]
async fn record_updates_totals_and_recent() {
    let (_, _, ledger) = ledger();

    let record = ledger.record(sale("TXN1", "beat-1", 5000)).await;
    assert_eq!(record.sale_id, "TXN1-beat-1");
    assert_eq!(record.amount(), "50.00");

    let stats = ledger.stats().await;
    assert_eq!(stats.total_sale_count, 1);
    assert_eq!(stats.total_revenue_cents, 5000);
    assert_eq!(stats.total_revenue, "50.00");
    assert_eq!(stats.sale_count_24h, 1);
    assert_eq!(stats.revenue_cents_24h, 5000);
    assert_eq!(stats.top_items.len(), 1);
    assert_eq!(stats.top_items[0].item_id, "beat-1");

    let recent = ledger.recent(10).await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].sale_id, "TXN1-beat-1");
}

#[tokio::test]
async fn duplicate_record_does_not_double_count() {
    let (_, _, ledger) = ledger();

    ledger.record(sale("TXN1", "beat-1", 5000)).await;
    // A retried confirmation lands on the same (transaction, item) pair.
    ledger.record(sale("TXN1", "beat-1", 5000)).await;

    let stats = ledger.stats().await;
    assert_eq!(stats.total_sale_count, 1);
    assert_eq!(stats.total_revenue_cents, 5000);
    assert_eq!(stats.top_items[0].sale_count, 1);
    assert_eq!(ledger.recent(10).await.len(), 1);
}

#[tokio::test]
async fn twenty_four_hour_window_respects_the_boundary() {
    let (_, clock, ledger) = ledger();

    // Old sale, then a second one 61 seconds later.
    ledger.record(sale("TXN-old", "beat-1", 5000)).await;
    clock.advance(Duration::seconds(61));
    ledger.record(sale("TXN-edge", "beat-2", 4500)).await;

    // Jump to where the first sale is 24h1s old and the second exactly
    // 23h59m old.
    clock.advance(Duration::hours(24) - Duration::seconds(60));

    let stats = ledger.stats().await;
    assert_eq!(stats.total_sale_count, 2);
    assert_eq!(stats.sale_count_24h, 1);
    assert_eq!(stats.revenue_cents_24h, 4500);
}

#[tokio::test]
async fn recent_returns_newest_first_up_to_limit() {
    let (_, clock, ledger) = ledger();

    ledger.record(sale("TXN1", "beat-1", 5000)).await;
    clock.advance(Duration::minutes(1));
    ledger.record(sale("TXN2", "beat-2", 4500)).await;
    clock.advance(Duration::minutes(1));
    ledger.record(sale("TXN3", "loop-pack-1", 2500)).await;

    let recent = ledger.recent(2).await;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].sale_id, "TXN3-loop-pack-1");
    assert_eq!(recent[1].sale_id, "TXN2-beat-2");
}

#[tokio::test]
async fn recent_skips_index_entries_without_a_record() {
    let (backend, clock, ledger) = ledger();

    ledger.record(sale("TXN1", "beat-1", 5000)).await;
    // Simulate index/primary skew: the record behind this member has expired.
    backend
        .index_add(
            SALES_INDEX_KEY,
            clock_now_millis(&clock) + 1000.0,
            "TXN-ghost-beat-9",
        )
        .await
        .unwrap();

    let recent = ledger.recent(10).await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].sale_id, "TXN1-beat-1");
}

fn clock_now_millis(clock: &FixedClock) -> f64 {
    use beatvault::clock::Clock;
    clock.now_utc().timestamp_millis() as f64
}

#[tokio::test]
async fn by_item_filters_and_limits() {
    let (_, clock, ledger) = ledger();

    for i in 0..5 {
        ledger.record(sale(&format!("TXN{i}"), "beat-1", 5000)).await;
        clock.advance(Duration::minutes(1));
        ledger
            .record(sale(&format!("TXN{i}"), "loop-pack-1", 2500))
            .await;
        clock.advance(Duration::minutes(1));
    }

    let sales = ledger.by_item("beat-1", 3).await;
    assert_eq!(sales.len(), 3);
    assert!(sales.iter().all(|record| record.item_id == "beat-1"));
    // Newest first.
    assert_eq!(sales[0].transaction_id, "TXN4");
    assert_eq!(sales[2].transaction_id, "TXN2");

    assert!(ledger.by_item("unknown-item", 3).await.is_empty());
}

#[tokio::test]
async fn top_items_rank_by_count_and_truncate_to_ten() {
    let (_, clock, ledger) = ledger();

    // Three sales of the headliner, then one each for eleven other items.
    for suffix in ["a", "b", "c"] {
        ledger
            .record(sale(&format!("TXN-{suffix}"), "item-0", 1000))
            .await;
        clock.advance(Duration::seconds(1));
    }
    for i in 1..=11 {
        ledger
            .record(sale(&format!("TXN{i}"), &format!("item-{i}"), 1000))
            .await;
        clock.advance(Duration::seconds(1));
    }

    let stats = ledger.stats().await;
    assert_eq!(stats.total_sale_count, 14);
    assert_eq!(stats.top_items.len(), 10);
    assert_eq!(stats.top_items[0].item_id, "item-0");
    assert_eq!(stats.top_items[0].sale_count, 3);
    // Ties rank in discovery order behind the headliner.
    assert_eq!(stats.top_items[1].item_id, "item-1");
}
