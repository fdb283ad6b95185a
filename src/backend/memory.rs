use super::KvBackend;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// Process-local fallback store. Mirrors the TTL and index semantics of the
/// durable backend but is scoped to a single process lifetime.
pub struct MemoryBackend {
    values: Arc<Mutex<HashMap<String, StoredValue>>>,
    // Each index is kept sorted by score ascending; members with equal scores
    // stay in insertion order.
    indexes: Arc<Mutex<HashMap<String, Vec<(f64, String)>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(HashMap::new())),
            indexes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn stored(value: &str, ttl_secs: Option<u64>) -> StoredValue {
        StoredValue {
            value: value.to_string(),
            expires_at: ttl_secs.map(|ttl| Utc::now() + Duration::seconds(ttl as i64)),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve Redis-style rank bounds (negative = from the end) into an inclusive
/// slice range, or None when the range selects nothing.
fn clamp_rank_range(len: usize, from: isize, to: isize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let n = len as isize;
    let from = (if from < 0 { n + from } else { from }).max(0);
    let to = (if to < 0 { n + to } else { to }).min(n - 1);
    if from > to {
        return None;
    }
    Some((from as usize, to as usize))
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let mut values = self.values.lock().unwrap();
        values.insert(key.to_string(), Self::stored(value, ttl_secs));
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<bool> {
        let mut values = self.values.lock().unwrap();
        let now = Utc::now();
        if values.get(key).map_or(false, |v| !v.is_expired(now)) {
            return Ok(false);
        }
        values.insert(key.to_string(), Self::stored(value, ttl_secs));
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut values = self.values.lock().unwrap();
        let now = Utc::now();
        if values.get(key).map_or(false, |v| v.is_expired(now)) {
            values.remove(key);
            return Ok(None);
        }
        Ok(values.get(key).map(|v| v.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap();
        values.remove(key);
        Ok(())
    }

    async fn index_add(&self, index: &str, score: f64, member: &str) -> Result<()> {
        let mut indexes = self.indexes.lock().unwrap();
        let entries = indexes.entry(index.to_string()).or_default();
        entries.retain(|(_, m)| m != member);
        entries.push((score, member.to_string()));
        entries.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(())
    }

    async fn index_range_by_score(&self, index: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let indexes = self.indexes.lock().unwrap();
        let members = indexes
            .get(index)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(score, _)| *score >= min && *score <= max)
                    .map(|(_, member)| member.clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(members)
    }

    async fn index_range_by_rank(
        &self,
        index: &str,
        from: isize,
        to: isize,
        reverse: bool,
    ) -> Result<Vec<String>> {
        let indexes = self.indexes.lock().unwrap();
        let Some(entries) = indexes.get(index) else {
            return Ok(Vec::new());
        };
        let mut members: Vec<String> = entries.iter().map(|(_, m)| m.clone()).collect();
        if reverse {
            members.reverse();
        }
        let Some((from, to)) = clamp_rank_range(members.len(), from, to) else {
            return Ok(Vec::new());
        };
        Ok(members[from..=to].to_vec())
    }
}
