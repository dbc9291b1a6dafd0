//! Upload rate limiting.
//!
//! Fixed-window counters keyed by (identity, source address), checked
//! before any bytes are written to disk. The counters live behind the
//! [`RateLimitStore`] trait so a multi-instance deployment can swap in a
//! shared backend without touching call sites; the default store is a
//! sharded in-memory map.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use rentiva_core::Identity;

use rentiva_pipeline::audit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Counter store behind the limiter. Implementations must provide atomic
/// check-and-increment semantics per key.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check_and_increment(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> RateLimitDecision;

    /// Drop expired counters to bound memory.
    async fn evict_expired(&self);
}

#[derive(Clone)]
struct RateLimitBucket {
    count: u32,
    reset_at: Instant,
}

impl RateLimitBucket {
    fn new(window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: Instant::now() + window,
        }
    }

    fn check_and_increment(&mut self, limit: u32, window: Duration) -> (bool, u32) {
        let now = Instant::now();

        // Reset if window expired
        if now >= self.reset_at {
            self.count = 0;
            self.reset_at = now + window;
        }

        if self.count < limit {
            self.count += 1;
            let remaining = limit.saturating_sub(self.count);
            (true, remaining)
        } else {
            (false, 0)
        }
    }

    fn reset_in(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }
}

/// Sharded in-memory counter store.
///
/// Keys are hashed across shards to reduce lock contention; each shard
/// evicts expired buckets when it reaches capacity, falling back to
/// oldest-bucket eviction if cleanup is not enough.
pub struct InMemoryRateLimitStore {
    shards: Vec<Arc<Mutex<HashMap<String, RateLimitBucket>>>>,
    shard_count: usize,
    max_buckets: usize,
}

impl InMemoryRateLimitStore {
    /// Create a store with the default shard count (16).
    pub fn new() -> Self {
        Self::with_shards(16)
    }

    pub fn with_shards(shard_count: usize) -> Self {
        let shards = (0..shard_count)
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self {
            shards,
            shard_count,
            max_buckets: 10_000,
        }
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shard_count
    }
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> RateLimitDecision {
        let shard_index = self.shard_index(key);
        let shard = &self.shards[shard_index];
        let mut buckets = shard.lock().await;

        if buckets.len() >= self.max_buckets {
            let now = Instant::now();
            buckets.retain(|_key, bucket| bucket.reset_at > now);

            // Still at capacity after cleanup: evict the oldest bucket.
            if buckets.len() >= self.max_buckets {
                let oldest_key = buckets
                    .iter()
                    .min_by_key(|(_, bucket)| bucket.reset_at)
                    .map(|(k, _)| k.clone());

                if let Some(key_to_remove) = oldest_key {
                    buckets.remove(&key_to_remove);
                    tracing::debug!(
                        removed_key = %key_to_remove,
                        shard_index,
                        "Evicted oldest rate limit bucket at capacity"
                    );
                }
            }
        }

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| RateLimitBucket::new(window));

        let (allowed, remaining) = bucket.check_and_increment(limit, window);
        if allowed {
            RateLimitDecision::Allowed { remaining }
        } else {
            RateLimitDecision::Denied {
                retry_after: bucket.reset_in(),
            }
        }
    }

    async fn evict_expired(&self) {
        let now = Instant::now();
        let mut total_cleaned = 0;

        for shard in &self.shards {
            let mut buckets = shard.lock().await;
            let before = buckets.len();
            buckets.retain(|_key, bucket| bucket.reset_at > now);
            total_cleaned += before - buckets.len();
        }

        if total_cleaned > 0 {
            tracing::debug!(
                buckets_cleaned = total_cleaned,
                "Cleaned up expired rate limit buckets"
            );
        }
    }
}

/// Upload rate limiter. Runs ahead of, and independently from, the
/// orchestrator: a denial costs the caller nothing but the check itself.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    max_uploads: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, max_uploads: u32, window: Duration) -> Self {
        Self {
            store,
            max_uploads,
            window,
        }
    }

    /// Convenience constructor with the sharded in-memory store.
    pub fn in_memory(max_uploads: u32, window: Duration) -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()), max_uploads, window)
    }

    /// Check the (identity, source address) window, counting this request.
    pub async fn check_rate_limit(
        &self,
        identity: &Identity,
        source_addr: &str,
    ) -> RateLimitDecision {
        let key = format!("{}:{}", identity.id, source_addr);
        let decision = self
            .store
            .check_and_increment(&key, self.max_uploads, self.window)
            .await;

        if !decision.is_allowed() {
            audit::log_rate_limit_exceeded(identity.id, source_addr);
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentiva_core::Role;
    use uuid::Uuid;

    fn identity() -> Identity {
        Identity::new(Uuid::new_v4(), Role::Guest)
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::in_memory(3, Duration::from_secs(60));
        let caller = identity();

        for _ in 0..3 {
            assert!(limiter.check_rate_limit(&caller, "10.0.0.1").await.is_allowed());
        }

        let decision = limiter.check_rate_limit(&caller, "10.0.0.1").await;
        assert!(matches!(decision, RateLimitDecision::Denied { .. }));
    }

    #[tokio::test]
    async fn window_expiry_allows_again() {
        let limiter = RateLimiter::in_memory(1, Duration::from_millis(100));
        let caller = identity();

        assert!(limiter.check_rate_limit(&caller, "10.0.0.1").await.is_allowed());
        assert!(!limiter.check_rate_limit(&caller, "10.0.0.1").await.is_allowed());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(limiter.check_rate_limit(&caller, "10.0.0.1").await.is_allowed());
    }

    #[tokio::test]
    async fn identities_are_counted_separately() {
        let limiter = RateLimiter::in_memory(1, Duration::from_secs(60));

        let first = identity();
        let second = identity();

        assert!(limiter.check_rate_limit(&first, "10.0.0.1").await.is_allowed());
        assert!(limiter.check_rate_limit(&second, "10.0.0.1").await.is_allowed());
        assert!(!limiter.check_rate_limit(&first, "10.0.0.1").await.is_allowed());
    }

    #[tokio::test]
    async fn source_addresses_are_counted_separately() {
        let limiter = RateLimiter::in_memory(1, Duration::from_secs(60));
        let caller = identity();

        assert!(limiter.check_rate_limit(&caller, "10.0.0.1").await.is_allowed());
        assert!(limiter.check_rate_limit(&caller, "10.0.0.2").await.is_allowed());
        assert!(!limiter.check_rate_limit(&caller, "10.0.0.1").await.is_allowed());
    }

    #[tokio::test]
    async fn denied_decision_reports_retry_after() {
        let limiter = RateLimiter::in_memory(1, Duration::from_secs(60));
        let caller = identity();

        limiter.check_rate_limit(&caller, "10.0.0.1").await;
        if let RateLimitDecision::Denied { retry_after } =
            limiter.check_rate_limit(&caller, "10.0.0.1").await
        {
            assert!(retry_after <= Duration::from_secs(60));
            assert!(retry_after > Duration::from_secs(0));
        } else {
            panic!("expected denial");
        }
    }

    #[tokio::test]
    async fn evict_expired_drops_stale_buckets() {
        let store = InMemoryRateLimitStore::with_shards(1);
        store
            .check_and_increment("k1", 5, Duration::from_millis(20))
            .await;
        store
            .check_and_increment("k2", 5, Duration::from_secs(60))
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.evict_expired().await;

        let buckets = store.shards[0].lock().await;
        assert!(!buckets.contains_key("k1"));
        assert!(buckets.contains_key("k2"));
    }
}
