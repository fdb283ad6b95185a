use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub mod memory;
pub mod redis;

pub use memory::MemoryBackend;
pub use redis::RedisBackend;

/// Durable key-value store with per-key TTLs plus a sorted-set index
/// primitive. The only cross-request shared state in the system lives behind
/// this trait.
#[async_trait]
pub trait KvBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn put(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()>;

    /// Store only if the key does not exist yet. Returns true when the value
    /// was created by this call.
    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Add a member to a sorted index under the given score, replacing any
    /// previous score for the same member.
    async fn index_add(&self, index: &str, score: f64, member: &str) -> Result<()>;

    /// Members with score in `[min, max]`, ascending.
    async fn index_range_by_score(&self, index: &str, min: f64, max: f64) -> Result<Vec<String>>;

    /// Members by rank. `to` may be negative Redis-style (-1 = last).
    /// `reverse` walks from the highest score down.
    async fn index_range_by_rank(
        &self,
        index: &str,
        from: isize,
        to: isize,
        reverse: bool,
    ) -> Result<Vec<String>>;
}

/// Select the backend once at startup; it is never re-probed per call. A
/// missing or unreachable Redis degrades to the process-local store, which
/// does not survive restarts. Both fallback paths are logged and counted.
pub async fn select_backend(redis_url: Option<&str>) -> Arc<dyn KvBackend> {
    match redis_url {
        Some(url) => match RedisBackend::connect(url).await {
            Ok(backend) => {
                info!("connected to redis backend");
                Arc::new(backend)
            }
            Err(e) => {
                warn!(error = %e, "redis unreachable, falling back to in-memory store");
                metrics::counter!(crate::metrics::BACKEND_FALLBACK_TOTAL).increment(1);
                Arc::new(MemoryBackend::new())
            }
        },
        None => {
            warn!("REDIS_URL not configured, using in-memory store");
            metrics::counter!(crate::metrics::BACKEND_FALLBACK_TOTAL).increment(1);
            Arc::new(MemoryBackend::new())
        }
    }
}
