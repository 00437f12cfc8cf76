//! Read-through cache over a `SoundStore`
//!
//! Mutations are explicit commands: each forwards to the store and then
//! refreshes the cached listing. The command's outcome is whatever the store
//! reports; a refresh failure is logged and the previous listing is kept.

use crate::audio::types::EncodedClip;
use crate::error::Result;
use crate::store::SoundStore;
use clipdeck_common::events::{ClipDeckEvent, EventBus};
use clipdeck_common::SoundRecord;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct SoundCatalog {
    store: Arc<dyn SoundStore>,
    records: RwLock<Vec<SoundRecord>>,
    events: Option<EventBus>,
}

impl SoundCatalog {
    /// Empty catalog; call `refresh` to populate
    pub fn new(store: Arc<dyn SoundStore>) -> Self {
        Self {
            store,
            records: RwLock::new(Vec::new()),
            events: None,
        }
    }

    /// Publish `CatalogRefreshed` on `events` after every refresh
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &Arc<dyn SoundStore> {
        &self.store
    }

    /// Cached records, newest first
    pub async fn records(&self) -> Vec<SoundRecord> {
        self.records.read().await.clone()
    }

    pub async fn find(&self, id: Uuid) -> Option<SoundRecord> {
        self.records.read().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Reload from the store. On failure the previous cache is kept.
    pub async fn refresh(&self) -> Result<usize> {
        let fresh = self.store.list().await?;
        let count = fresh.len();
        *self.records.write().await = fresh;

        debug!("Sound catalog refreshed: {} records", count);
        if let Some(events) = &self.events {
            events.emit_lossy(ClipDeckEvent::CatalogRefreshed {
                count,
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(count)
    }

    /// Save through the store. A failed refresh afterwards only leaves the
    /// cache stale; the record is already persisted and is returned.
    pub async fn save(&self, clip: &EncodedClip, title: &str) -> Result<SoundRecord> {
        let record = self.store.save(clip, title).await?;
        self.refresh_after("save").await;
        Ok(record)
    }

    pub async fn delete(&self, locator: &str) -> Result<bool> {
        let deleted = self.store.delete(locator).await?;
        if deleted {
            self.refresh_after("delete").await;
        }
        Ok(deleted)
    }

    pub async fn rename(&self, id: Uuid, title: &str) -> Result<SoundRecord> {
        let record = self.store.rename(id, title).await?;
        self.refresh_after("rename").await;
        Ok(record)
    }

    async fn refresh_after(&self, command: &str) {
        if let Err(e) = self.refresh().await {
            warn!("Sound catalog not refreshed after {}: {}", command, e);
        }
    }
}
