//! Idempotency ledger for side effects of redelivered jobs.
//!
//! A job redelivered after a lease expiry replays its stages. Each externally
//! visible effect claims a key first; a key that is already claimed means the
//! effect already happened and is skipped.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reel_models::JobId;
use tracing::debug;

use crate::error::{QueueError, QueueResult};

/// Key for one side effect: `job_id:stage[:clip]`.
pub fn effect_key(job_id: &JobId, stage: &str, clip: Option<usize>) -> String {
    match clip {
        Some(index) => format!("{}:{}:{}", job_id, stage, index),
        None => format!("{}:{}", job_id, stage),
    }
}

#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Claim `key`. Returns `false` when it was claimed before.
    async fn claim(&self, key: &str) -> QueueResult<bool>;

    /// Release `key` after the guarded effect failed, so a later delivery retries it.
    async fn release(&self, key: &str) -> QueueResult<()>;
}

/// Ledger stored in Redis with `SET NX EX`.
#[derive(Clone)]
pub struct RedisLedger {
    client: redis::Client,
    ttl: Duration,
}

impl RedisLedger {
    /// Keys outlive the longest plausible redelivery window.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            ttl: Self::DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn redis_key(key: &str) -> String {
        format!("reel:effect:{}", key)
    }
}

#[async_trait]
impl IdempotencyLedger for RedisLedger {
    async fn claim(&self, key: &str) -> QueueResult<bool> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::redis_key(key))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        let fresh = reply.is_some();
        if !fresh {
            debug!("Side effect {} already claimed", key);
        }
        Ok(fresh)
    }

    async fn release(&self, key: &str) -> QueueResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        redis::cmd("DEL")
            .arg(Self::redis_key(key))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

/// In-process ledger for tests and single-node runs.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    claimed: Mutex<HashSet<String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.claimed.lock().map(|set| set.contains(key)).unwrap_or(false)
    }
}

#[async_trait]
impl IdempotencyLedger for MemoryLedger {
    async fn claim(&self, key: &str) -> QueueResult<bool> {
        let mut set = self
            .claimed
            .lock()
            .map_err(|_| QueueError::connection_failed("ledger lock poisoned"))?;
        Ok(set.insert(key.to_string()))
    }

    async fn release(&self, key: &str) -> QueueResult<()> {
        let mut set = self
            .claimed
            .lock()
            .map_err(|_| QueueError::connection_failed("ledger lock poisoned"))?;
        set.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_key() {
        let id = JobId::from_string("j1");
        assert_eq!(effect_key(&id, "uploading", Some(2)), "j1:uploading:2");
        assert_eq!(effect_key(&id, "completed", None), "j1:completed");
    }

    #[tokio::test]
    async fn test_memory_ledger_claims_once() {
        let ledger = MemoryLedger::new();
        assert!(ledger.claim("j1:uploading:0").await.unwrap());
        assert!(!ledger.claim("j1:uploading:0").await.unwrap());

        ledger.release("j1:uploading:0").await.unwrap();
        assert!(ledger.claim("j1:uploading:0").await.unwrap());
    }
}
