//! Consumed-event dedup guard.

use std::sync::Arc;

use common::Clock;

use crate::error::Result;
use crate::store::DedupStore;

/// Converts at-least-once delivery into at-most-once effect.
///
/// The caller checks the guard inside the same local transactional scope as
/// the business effect it protects: marker and effect commit together, so a
/// crash between them cannot leave a silently duplicated application.
#[derive(Clone)]
pub struct DedupGuard {
    store: Arc<dyn DedupStore>,
    clock: Arc<dyn Clock>,
    group: Option<String>,
}

impl DedupGuard {
    /// Creates a guard over the given marker store.
    pub fn new(store: Arc<dyn DedupStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            group: None,
        }
    }

    /// Namespaces markers by consumer group, so independent consumers of
    /// the same event can share one marker store.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Records `event_id` if it has not been seen, returning true exactly
    /// once per distinct id. A missing or blank id cannot be deduplicated
    /// and is treated as always new.
    pub async fn mark_if_new(&self, event_id: Option<&str>) -> Result<bool> {
        let Some(event_id) = event_id else {
            return Ok(true);
        };
        if event_id.trim().is_empty() {
            return Ok(true);
        }
        let marker = match &self.group {
            Some(group) => format!("{group}:{event_id}"),
            None => event_id.to_string(),
        };

        let fresh = self
            .store
            .insert_if_absent(&marker, self.clock.now())
            .await?;
        if !fresh {
            metrics::counter!("consumer_duplicates_skipped_total").increment(1);
            tracing::debug!(event_id, "duplicate delivery skipped");
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDedupStore;
    use common::SystemClock;

    fn guard() -> (DedupGuard, Arc<InMemoryDedupStore>) {
        let store = Arc::new(InMemoryDedupStore::new());
        (
            DedupGuard::new(store.clone(), Arc::new(SystemClock)),
            store,
        )
    }

    #[tokio::test]
    async fn first_sighting_is_new_second_is_not() {
        let (guard, _) = guard();
        assert!(guard.mark_if_new(Some("evt-1")).await.unwrap());
        assert!(!guard.mark_if_new(Some("evt-1")).await.unwrap());
        assert!(guard.mark_if_new(Some("evt-2")).await.unwrap());
    }

    #[tokio::test]
    async fn blank_ids_are_always_new() {
        let (guard, store) = guard();
        assert!(guard.mark_if_new(None).await.unwrap());
        assert!(guard.mark_if_new(Some("")).await.unwrap());
        assert!(guard.mark_if_new(Some("   ")).await.unwrap());
        // No markers recorded for undeduplicatable ids.
        assert_eq!(store.marker_count().await, 0);
    }

    #[tokio::test]
    async fn groups_partition_the_marker_space() {
        let store = Arc::new(InMemoryDedupStore::new());
        let clock: Arc<SystemClock> = Arc::new(SystemClock);
        let inventory = DedupGuard::new(store.clone(), clock.clone()).with_group("inventory");
        let payments = DedupGuard::new(store, clock).with_group("payments");

        assert!(inventory.mark_if_new(Some("evt-1")).await.unwrap());
        // A different group sees the same event as fresh.
        assert!(payments.mark_if_new(Some("evt-1")).await.unwrap());
        assert!(!inventory.mark_if_new(Some("evt-1")).await.unwrap());
    }
}
