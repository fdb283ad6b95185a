//! Redis implementation of the KV backend. TTLs map to EXPIRE/SET EX, the
//! index primitive maps to a sorted set.

use super::KvBackend;
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use futures::lock::Mutex;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::sync::Arc;

pub struct RedisBackend {
    conn: Arc<Mutex<MultiplexedConnection>>,
}

impl RedisBackend {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| FulfillmentError::Backend(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| FulfillmentError::Backend(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn backend_err(e: redis::RedisError) -> FulfillmentError {
    FulfillmentError::Backend(e.to_string())
}

#[async_trait]
impl KvBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let mut conn = self.conn.lock().await;
        match ttl_secs {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await,
            None => conn.set::<_, _, ()>(key, value).await,
        }
        .map_err(backend_err)
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl_secs {
            cmd.arg("EX").arg(ttl);
        }
        // SET NX replies OK on creation and nil when the key already exists.
        let reply: Option<String> = cmd.query_async(&mut *conn).await.map_err(backend_err)?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.lock().await;
        conn.get(key).await.map_err(backend_err)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.del::<_, ()>(key).await.map_err(backend_err)
    }

    async fn index_add(&self, index: &str, score: f64, member: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.zadd::<_, _, _, ()>(index, member, score)
            .await
            .map_err(backend_err)
    }

    async fn index_range_by_score(&self, index: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let mut conn = self.conn.lock().await;
        conn.zrangebyscore(index, min, max).await.map_err(backend_err)
    }

    async fn index_range_by_rank(
        &self,
        index: &str,
        from: isize,
        to: isize,
        reverse: bool,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn.lock().await;
        if reverse {
            conn.zrevrange(index, from, to).await.map_err(backend_err)
        } else {
            conn.zrange(index, from, to).await.map_err(backend_err)
        }
    }
}
