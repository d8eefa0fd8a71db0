//! In-memory outbox and dedup stores for single-process wiring and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::record::{OutboxEvent, OutboxStatus};
use crate::store::{DedupStore, OutboxStore};

/// In-memory [`OutboxStore`] implementation.
///
/// Provides the same interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    rows: Arc<RwLock<Vec<OutboxEvent>>>,
}

impl InMemoryOutboxStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of rows in any status.
    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns a row by id, if present.
    pub async fn find(&self, id: common::EventId) -> Option<OutboxEvent> {
        self.rows.read().await.iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn insert(&self, event: OutboxEvent) -> Result<()> {
        self.rows.write().await.push(event);
        Ok(())
    }

    async fn update(&self, event: &OutboxEvent) -> Result<()> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.iter_mut().find(|r| r.id == event.id) {
            row.status = event.status;
            row.attempts = event.attempts;
            row.last_error = event.last_error.clone();
            row.updated_at = event.updated_at;
        }
        Ok(())
    }

    async fn fetch_by_status(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> Result<Vec<OutboxEvent>> {
        let rows = self.rows.read().await;
        let mut matching: Vec<OutboxEvent> = rows
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        matching.truncate(limit);
        Ok(matching)
    }

    async fn count_by_status(&self, status: OutboxStatus) -> Result<u64> {
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|r| r.status == status).count() as u64)
    }

    async fn delete_by_status_before(
        &self,
        status: OutboxStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| !(r.status == status && r.updated_at < cutoff));
        Ok((before - rows.len()) as u64)
    }
}

/// In-memory [`DedupStore`] implementation.
#[derive(Clone, Default)]
pub struct InMemoryDedupStore {
    markers: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl InMemoryDedupStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of markers held.
    pub async fn marker_count(&self) -> usize {
        self.markers.read().await.len()
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn insert_if_absent(&self, event_id: &str, consumed_at: DateTime<Utc>) -> Result<bool> {
        let mut markers = self.markers.write().await;
        if markers.contains_key(event_id) {
            return Ok(false);
        }
        markers.insert(event_id.to_string(), consumed_at);
        Ok(true)
    }

    async fn delete_consumed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut markers = self.markers.write().await;
        let before = markers.len();
        markers.retain(|_, consumed_at| *consumed_at >= cutoff);
        Ok((before - markers.len()) as u64)
    }
}
