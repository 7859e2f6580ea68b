//! Distributed rate-limit leases.
//!
//! A lease is a store key with an expiry. Holding the key means "this bucket
//! is locked until the key is gone"; every replica polls the key's TTL and
//! sleeps for whatever remains. Leases always carry a TTL so a crashed holder
//! blocks others for at most that long.
//!
//! Acquisition is a TTL read followed by a write. Two replicas polling the
//! same instant can both observe the key missing and both proceed.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, trace};

use shardline_core::{KeyTtl, StoreRef, StoreResult};

/// Store key of the cluster-wide lease.
pub const GLOBAL_LEASE_KEY: &str = "ratelimit:global";

/// Default TTL of a freshly acquired bucket lease.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(3);

/// Lease on one HTTP rate-limit bucket.
pub struct BucketLease {
    store: StoreRef,
    key: String,
    ttl: Duration,
}

impl BucketLease {
    /// Creates a lease handle for `bucket`; nothing is acquired yet.
    pub fn new(store: StoreRef, bucket: &str, ttl: Duration) -> Self {
        Self {
            store,
            key: format!("ratelimit:{bucket}"),
            ttl,
        }
    }

    /// The store key backing this lease.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits until the bucket is free, then takes it for the lease TTL.
    pub async fn acquire(&self) -> StoreResult<()> {
        loop {
            match self.store.ttl(&self.key).await? {
                KeyTtl::Missing => {
                    self.store.set_ex(&self.key, "1", self.ttl).await?;
                    trace!(key = %self.key, "bucket lease acquired");
                    return Ok(());
                }
                KeyTtl::Expires(remaining) => {
                    debug!(key = %self.key, wait_ms = remaining.as_millis() as u64, "bucket locked, waiting");
                    sleep(remaining).await;
                }
                // A lease without expiry is never written by this module;
                // treat it as held for one lease TTL.
                KeyTtl::Persistent => sleep(self.ttl).await,
            }
        }
    }

    /// Releases the bucket immediately.
    pub async fn release(&self) -> StoreResult<()> {
        self.store.delete(&self.key).await?;
        Ok(())
    }

    /// Keeps the bucket locked for `delay`, then lets it expire.
    pub async fn release_in(&self, delay: Duration) -> StoreResult<()> {
        if delay.is_zero() {
            return self.release().await;
        }
        self.store.set_ex(&self.key, "1", delay).await
    }
}

/// The cluster-wide lease that suspends every outbound call.
pub struct GlobalLease {
    store: StoreRef,
}

impl GlobalLease {
    pub fn new(store: StoreRef) -> Self {
        Self { store }
    }

    /// Sleeps until no global lease is in effect.
    ///
    /// Only an expiring key suspends callers.
    pub async fn wait(&self) -> StoreResult<()> {
        while let KeyTtl::Expires(remaining) = self.store.ttl(GLOBAL_LEASE_KEY).await? {
            debug!(wait_ms = remaining.as_millis() as u64, "global rate limit in effect");
            sleep(remaining).await;
        }
        Ok(())
    }

    /// Suspends all outbound calls for `duration`.
    pub async fn engage(&self, duration: Duration) -> StoreResult<()> {
        if duration.is_zero() {
            return Ok(());
        }
        self.store.set_ex(GLOBAL_LEASE_KEY, "1", duration).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use shardline_core::{MemoryStore, SharedStore};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_holder() {
        let store: StoreRef = Arc::new(MemoryStore::new());
        let first = BucketLease::new(store.clone(), "b", DEFAULT_LEASE_TTL);
        let second = BucketLease::new(store.clone(), "b", DEFAULT_LEASE_TTL);

        let start = Instant::now();
        first.acquire().await.unwrap();
        assert_eq!(
            store.ttl("ratelimit:b").await.unwrap(),
            KeyTtl::Expires(DEFAULT_LEASE_TTL)
        );

        second.acquire().await.unwrap();
        assert_eq!(start.elapsed(), DEFAULT_LEASE_TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_in_extends_lock() {
        let store: StoreRef = Arc::new(MemoryStore::new());
        let lease = BucketLease::new(store.clone(), "b", DEFAULT_LEASE_TTL);
        lease.acquire().await.unwrap();
        lease.release_in(Duration::from_secs(7)).await.unwrap();
        assert_eq!(
            store.ttl(lease.key()).await.unwrap(),
            KeyTtl::Expires(Duration::from_secs(7))
        );

        lease.release().await.unwrap();
        assert_eq!(store.ttl(lease.key()).await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_wait() {
        let store: StoreRef = Arc::new(MemoryStore::new());
        let global = GlobalLease::new(store.clone());

        let start = Instant::now();
        global.wait().await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        global.engage(Duration::from_secs(2)).await.unwrap();
        global.wait().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        // A persistent key does not block.
        store.set(GLOBAL_LEASE_KEY, "1").await.unwrap();
        global.wait().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
