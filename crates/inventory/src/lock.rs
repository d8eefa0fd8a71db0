use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Clock, Sku};
use tokio::sync::Mutex;

/// How long a SKU lock is held before it self-expires. Generous for a
/// read-modify-write of one stock row, short enough that a crashed
/// holder does not wedge the SKU.
pub const LOCK_TTL: Duration = Duration::from_secs(5);

/// Try-acquire mutual exclusion per SKU.
///
/// `try_acquire` never blocks: it either takes the lock or reports
/// contention so the caller can fail fast and retry. Holders release
/// explicitly; the TTL is the backstop for holders that never do.
#[async_trait]
pub trait SkuLock: Send + Sync {
    /// Returns `true` if the lock was taken, `false` on contention.
    async fn try_acquire(&self, sku: &Sku, ttl: Duration) -> bool;

    async fn release(&self, sku: &Sku);
}

/// Process-local lock table. Single-instance deployments get full
/// mutual exclusion; behind this trait a shared implementation (e.g.
/// Redis SET NX PX) slots in for multi-instance setups.
pub struct InMemorySkuLock {
    clock: Arc<dyn Clock>,
    held: Mutex<HashMap<Sku, DateTime<Utc>>>,
}

impl InMemorySkuLock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        InMemorySkuLock {
            clock,
            held: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SkuLock for InMemorySkuLock {
    async fn try_acquire(&self, sku: &Sku, ttl: Duration) -> bool {
        let now = self.clock.now();
        let mut held = self.held.lock().await;
        match held.get(sku) {
            Some(expires_at) if *expires_at > now => false,
            _ => {
                let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(5));
                held.insert(sku.clone(), now + ttl);
                true
            }
        }
    }

    async fn release(&self, sku: &Sku) {
        let mut held = self.held.lock().await;
        held.remove(sku);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ManualClock;

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let clock = Arc::new(ManualClock::default());
        let lock = InMemorySkuLock::new(clock);
        let sku = Sku::new("SKU-1");

        assert!(lock.try_acquire(&sku, LOCK_TTL).await);
        assert!(!lock.try_acquire(&sku, LOCK_TTL).await);

        lock.release(&sku).await;
        assert!(lock.try_acquire(&sku, LOCK_TTL).await);
    }

    #[tokio::test]
    async fn expired_lock_can_be_retaken() {
        let clock = Arc::new(ManualClock::default());
        let lock = InMemorySkuLock::new(clock.clone());
        let sku = Sku::new("SKU-1");

        assert!(lock.try_acquire(&sku, LOCK_TTL).await);
        clock.advance(chrono::Duration::seconds(6));
        assert!(lock.try_acquire(&sku, LOCK_TTL).await);
    }

    #[tokio::test]
    async fn locks_are_independent_per_sku() {
        let clock = Arc::new(ManualClock::default());
        let lock = InMemorySkuLock::new(clock);

        assert!(lock.try_acquire(&Sku::new("SKU-1"), LOCK_TTL).await);
        assert!(lock.try_acquire(&Sku::new("SKU-2"), LOCK_TTL).await);
    }
}
