use crate::backend::KvBackend;
use crate::clock::Clock;
use crate::money::format_cents;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SALES_INDEX_KEY: &str = "sales:index";
pub const AGGREGATE_KEY: &str = "sales:aggregate";

/// Sale records are retained for a year for compliance and analytics, then
/// expire naturally. The aggregate is never decremented when they do.
const SALE_TTL_SECS: u64 = 365 * 24 * 60 * 60;
const TOP_ITEMS_LIMIT: usize = 10;

/// One completed sale line item, 1:1 with its download credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecord {
    pub sale_id: String,
    pub transaction_id: String,
    pub item_id: String,
    pub item_title: String,
    pub buyer_contact: String,
    pub amount_cents: i64,
    pub is_bundle: bool,
    pub bundle_discount_cents: i64,
    pub occurred_at: DateTime<Utc>,
}

impl SaleRecord {
    pub fn amount(&self) -> String {
        format_cents(self.amount_cents)
    }

    pub fn occurred_at_iso(&self) -> String {
        self.occurred_at.to_rfc3339()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopItem {
    pub item_id: String,
    pub item_title: String,
    pub sale_count: u64,
}

/// Lifetime totals plus the best-seller leaderboard. Logically append-only:
/// counts never go down, even after individual records expire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesAggregate {
    pub total_sale_count: u64,
    pub total_revenue_cents: i64,
    pub top_items: Vec<TopItem>,
}

/// Aggregate totals plus trailing-24h counters recomputed at read time from
/// the time index.
#[derive(Debug, Clone, Serialize)]
pub struct SalesStats {
    pub total_sale_count: u64,
    pub total_revenue_cents: i64,
    pub total_revenue: String,
    pub sale_count_24h: u64,
    pub revenue_cents_24h: i64,
    pub revenue_24h: String,
    pub top_items: Vec<TopItem>,
}

#[derive(Debug, Clone)]
pub struct NewSale {
    pub transaction_id: String,
    pub item_id: String,
    pub item_title: String,
    pub buyer_contact: String,
    pub amount_cents: i64,
    pub is_bundle: bool,
    pub bundle_discount_cents: i64,
}

pub fn sale_id(transaction_id: &str, item_id: &str) -> String {
    format!("{transaction_id}-{item_id}")
}

fn sale_key(sale_id: &str) -> String {
    format!("sale:{sale_id}")
}

/// Append-only record of completed sales plus derived aggregates. Recording
/// never fails from the caller's perspective: a confirmed purchase must not
/// appear to fail because analytics persistence did.
pub struct SalesLedger {
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
}

impl SalesLedger {
    pub fn new(backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Ledger one sale line item. The structured log line is written before
    /// any persistence so a sale is never silently lost. The record itself is
    /// a conditional create keyed by `(transaction_id, item_id)`: a retried
    /// confirmation neither duplicates the record nor double-counts the
    /// aggregate.
    pub async fn record(&self, sale: NewSale) -> SaleRecord {
        let occurred_at = self.clock.now_utc();
        let record = SaleRecord {
            sale_id: sale_id(&sale.transaction_id, &sale.item_id),
            transaction_id: sale.transaction_id,
            item_id: sale.item_id,
            item_title: sale.item_title,
            buyer_contact: sale.buyer_contact,
            amount_cents: sale.amount_cents,
            is_bundle: sale.is_bundle,
            bundle_discount_cents: sale.bundle_discount_cents,
            occurred_at,
        };

        info!(
            sale_id = %record.sale_id,
            item_id = %record.item_id,
            item_title = %record.item_title,
            amount = %record.amount(),
            buyer = %record.buyer_contact,
            is_bundle = record.is_bundle,
            "sale recorded"
        );
        metrics::counter!(crate::metrics::SALES_RECORDED_TOTAL).increment(1);

        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!(sale_id = %record.sale_id, error = %e, "failed to encode sale record");
                return record;
            }
        };

        let created = match self
            .backend
            .put_if_absent(&sale_key(&record.sale_id), &json, Some(SALE_TTL_SECS))
            .await
        {
            Ok(created) => created,
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    sale_id = %record.sale_id,
                    error = %e,
                    "failed to persist sale record"
                );
                metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
                return record;
            }
        };
        if !created {
            debug!(sale_id = %record.sale_id, "sale already ledgered, skipping aggregate update");
            return record;
        }

        if let Err(e) = self
            .backend
            .index_add(
                SALES_INDEX_KEY,
                occurred_at.timestamp_millis() as f64,
                &record.sale_id,
            )
            .await
        {
            warn!(sale_id = %record.sale_id, error = %e, "failed to index sale");
            metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
        }

        self.update_aggregate(&record).await;
        record
    }

    async fn update_aggregate(&self, record: &SaleRecord) {
        // Read-modify-write. Retried confirmations never reach this point
        // twice for one sale; a lost update needs two distinct sales landing
        // in the same instant, accepted at this volume.
        let mut aggregate = match self.backend.get(AGGREGATE_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "corrupt sales aggregate, rebuilding from zero");
                SalesAggregate::default()
            }),
            Ok(None) => SalesAggregate::default(),
            Err(e) => {
                warn!(error = %e, "aggregate fetch failed, skipping update");
                metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
                return;
            }
        };

        aggregate.total_sale_count += 1;
        aggregate.total_revenue_cents += record.amount_cents;
        match aggregate
            .top_items
            .iter_mut()
            .find(|item| item.item_id == record.item_id)
        {
            Some(item) => item.sale_count += 1,
            None => aggregate.top_items.push(TopItem {
                item_id: record.item_id.clone(),
                item_title: record.item_title.clone(),
                sale_count: 1,
            }),
        }
        // Stable sort keeps discovery order for tied counts.
        aggregate
            .top_items
            .sort_by(|a, b| b.sale_count.cmp(&a.sale_count));
        aggregate.top_items.truncate(TOP_ITEMS_LIMIT);

        match serde_json::to_string(&aggregate) {
            Ok(json) => {
                if let Err(e) = self.backend.put(AGGREGATE_KEY, &json, None).await {
                    warn!(error = %e, "failed to persist sales aggregate");
                    metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
                }
            }
            Err(e) => warn!(error = %e, "failed to encode sales aggregate"),
        }
    }

    /// Newest sales first, at most `limit`. Index members whose record has
    /// already expired are skipped.
    pub async fn recent(&self, limit: usize) -> Vec<SaleRecord> {
        if limit == 0 {
            return Vec::new();
        }
        let ids = match self
            .backend
            .index_range_by_rank(SALES_INDEX_KEY, 0, limit as isize - 1, true)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "sales index read failed");
                metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
                return Vec::new();
            }
        };
        self.resolve(ids).await
    }

    /// Lifetime totals from the persisted aggregate plus a fresh scan of the
    /// trailing 24 hours.
    pub async fn stats(&self) -> SalesStats {
        let aggregate = match self.backend.get(AGGREGATE_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "corrupt sales aggregate");
                SalesAggregate::default()
            }),
            Ok(None) => SalesAggregate::default(),
            Err(e) => {
                warn!(error = %e, "aggregate fetch failed, reporting zeroes");
                metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
                SalesAggregate::default()
            }
        };

        let now = self.clock.now_utc();
        let window_start = (now - Duration::hours(24)).timestamp_millis() as f64;
        let window_end = now.timestamp_millis() as f64;
        let ids = match self
            .backend
            .index_range_by_score(SALES_INDEX_KEY, window_start, window_end)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "sales index read failed for 24h window");
                metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
                Vec::new()
            }
        };
        let window = self.resolve(ids).await;
        let revenue_cents_24h: i64 = window.iter().map(|r| r.amount_cents).sum();

        SalesStats {
            total_sale_count: aggregate.total_sale_count,
            total_revenue_cents: aggregate.total_revenue_cents,
            total_revenue: format_cents(aggregate.total_revenue_cents),
            sale_count_24h: window.len() as u64,
            revenue_cents_24h,
            revenue_24h: format_cents(revenue_cents_24h),
            top_items: aggregate.top_items,
        }
    }

    /// Newest sales of one item, at most `limit`. Walks the full index newest
    /// first: fine at this ledger's expected volume, revisit past a few
    /// thousand sales.
    pub async fn by_item(&self, item_id: &str, limit: usize) -> Vec<SaleRecord> {
        if limit == 0 {
            return Vec::new();
        }
        let ids = match self
            .backend
            .index_range_by_rank(SALES_INDEX_KEY, 0, -1, true)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "sales index read failed");
                metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
                return Vec::new();
            }
        };

        let mut matches = Vec::new();
        for id in ids {
            if matches.len() == limit {
                break;
            }
            if let Some(record) = self.resolve_one(&id).await {
                if record.item_id == item_id {
                    matches.push(record);
                }
            }
        }
        matches
    }

    async fn resolve(&self, ids: Vec<String>) -> Vec<SaleRecord> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.resolve_one(&id).await {
                records.push(record);
            }
        }
        records
    }

    async fn resolve_one(&self, sale_id: &str) -> Option<SaleRecord> {
        match self.backend.get(&sale_key(sale_id)).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(sale_id = %sale_id, error = %e, "corrupt sale record, skipping");
                    None
                }
            },
            Ok(None) => {
                debug!(sale_id = %sale_id, "indexed sale no longer in primary storage, skipping");
                None
            }
            Err(e) => {
                warn!(sale_id = %sale_id, error = %e, "sale fetch failed");
                metrics::counter!(crate::metrics::BACKEND_ERRORS_TOTAL).increment(1);
                None
            }
        }
    }
}
