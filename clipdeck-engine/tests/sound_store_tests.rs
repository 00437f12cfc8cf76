//! Sound Store Tests
//!
//! **Test Coverage:**
//! - Save assigns id/locator; list is newest first
//! - Full, partial, suffix and unsatisfiable range streaming
//! - Delete and rename semantics
//! - Catalog refresh and its event; commands survive a failed refresh
//! - End-to-end trim → encode → save → play from the store

mod helpers;

use async_trait::async_trait;
use clipdeck_common::events::{ClipDeckEvent, EventBus, SessionState};
use clipdeck_common::{MimeType, SoundRecord};
use clipdeck_engine::audio::{wav, ByteSource, EncodedClip, PcmBuffer, TrimRange};
use clipdeck_engine::playback::{AutoplayStrategy, PlaybackSessionManager};
use clipdeck_engine::store::{ByteRange, ClipStream, SoundCatalog, SoundStore, SqliteSoundStore};
use clipdeck_engine::{ClipPipeline, Error, Result};
use helpers::{sine_wav, MockBackend};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

async fn temp_store() -> (TempDir, SqliteSoundStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteSoundStore::open(&dir.path().join("clipdeck.db"), dir.path())
        .await
        .unwrap();
    (dir, store)
}

fn short_clip(frames: u32) -> EncodedClip {
    let samples: Vec<f32> = (0..frames).map(|i| (i % 100) as f32 / 100.0 - 0.5).collect();
    wav::encode(&PcmBuffer::new(8000, vec![samples]).unwrap()).unwrap()
}

#[tokio::test]
async fn test_list_is_newest_first() {
    let (_dir, store) = temp_store().await;

    let first = store.save(&short_clip(800), "first").await.unwrap();
    let second = store.save(&short_clip(800), "second").await.unwrap();
    let third = store.save(&short_clip(800), "third").await.unwrap();

    let ids: Vec<Uuid> = store.list().await.unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![third.id, second.id, first.id]);
}

#[tokio::test]
async fn test_saved_record_describes_clip() {
    let (_dir, store) = temp_store().await;
    let clip = short_clip(4000);

    let record = store.save(&clip, "  Door slam  ").await.unwrap();

    assert_eq!(record.title, "Door slam");
    assert_eq!(record.duration_seconds, 0.5);
    assert_eq!(record.byte_size, clip.byte_length());
    assert_eq!(record.mime_type, MimeType::Wav);
    assert_eq!(record.source_locator, format!("{}.wav", record.id));
    assert_eq!(store.list().await.unwrap(), vec![record]);
}

#[tokio::test]
async fn test_stream_full_blob() {
    let (_dir, store) = temp_store().await;
    let clip = short_clip(1000);
    let record = store.save(&clip, "full").await.unwrap();

    let stream = store
        .stream_by_locator(&record.source_locator, None)
        .await
        .unwrap();
    assert!(!stream.partial);
    assert_eq!(stream.mime_type, MimeType::Wav);
    assert_eq!(stream.range.total, clip.byte_length());

    assert_eq!(stream.read_to_end().await.unwrap(), clip.bytes());
}

#[tokio::test]
async fn test_stream_partial_ranges() {
    let (_dir, store) = temp_store().await;
    let clip = short_clip(1000);
    let record = store.save(&clip, "ranges").await.unwrap();
    let locator = record.source_locator.as_str();
    let bytes = clip.bytes();
    let total = bytes.len();

    let head = store
        .stream_by_locator(locator, Some(ByteRange::parse_header("bytes=0-43").unwrap()))
        .await
        .unwrap();
    assert!(head.partial);
    assert_eq!(head.range.header_value(), format!("bytes 0-43/{}", total));
    assert_eq!(head.read_to_end().await.unwrap(), &bytes[..44]);

    let tail = store
        .stream_by_locator(locator, Some(ByteRange::Suffix { len: 10 }))
        .await
        .unwrap();
    assert_eq!(tail.read_to_end().await.unwrap(), &bytes[total - 10..]);

    let open_ended = store
        .stream_by_locator(locator, Some(ByteRange::From { start: 100 }))
        .await
        .unwrap();
    assert_eq!(open_ended.read_to_end().await.unwrap(), &bytes[100..]);
}

#[tokio::test]
async fn test_stream_unsatisfiable_range() {
    let (_dir, store) = temp_store().await;
    let record = store.save(&short_clip(100), "tiny").await.unwrap();

    let result = store
        .stream_by_locator(
            &record.source_locator,
            Some(ByteRange::From { start: 1_000_000 }),
        )
        .await;
    assert!(matches!(result, Err(Error::RangeNotSatisfiable { .. })));
}

#[tokio::test]
async fn test_stream_unknown_or_hostile_locator() {
    let (_dir, store) = temp_store().await;

    let unknown = store
        .stream_by_locator(&format!("{}.wav", Uuid::new_v4()), None)
        .await;
    assert!(matches!(unknown, Err(Error::NotFound(_))));

    let escape = store.stream_by_locator("../clipdeck.db", None).await;
    assert!(matches!(escape, Err(Error::InvalidLocator(_))));
}

#[tokio::test]
async fn test_delete_removes_record_and_blob() {
    let (_dir, store) = temp_store().await;
    let record = store.save(&short_clip(100), "gone soon").await.unwrap();
    let blob = store.blob_dir().join(&record.source_locator);
    assert!(blob.exists());

    assert!(store.delete(&record.source_locator).await.unwrap());
    assert!(!blob.exists());
    assert!(store.list().await.unwrap().is_empty());

    // Deleting again reports nothing was there
    assert!(!store.delete(&record.source_locator).await.unwrap());
}

#[tokio::test]
async fn test_rename_changes_only_title() {
    let (_dir, store) = temp_store().await;
    let record = store.save(&short_clip(100), "old").await.unwrap();

    let renamed = store.rename(record.id, "new").await.unwrap();
    assert_eq!(renamed.title, "new");
    assert_eq!(renamed.id, record.id);
    assert_eq!(renamed.source_locator, record.source_locator);
    assert_eq!(renamed.created_at, record.created_at);

    let missing = store.rename(Uuid::new_v4(), "whatever").await;
    assert!(matches!(missing, Err(Error::NotFound(_))));

    let empty = store.rename(record.id, "   ").await;
    assert!(matches!(empty, Err(Error::Common(_))));
}

#[tokio::test]
async fn test_catalog_tracks_store_changes() {
    let (_dir, store) = temp_store().await;
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let catalog = SoundCatalog::new(Arc::new(store)).with_events(bus);

    assert!(catalog.is_empty().await);

    let a = catalog.save(&short_clip(100), "a").await.unwrap();
    let b = catalog.save(&short_clip(100), "b").await.unwrap();
    assert_eq!(catalog.len().await, 2);
    assert_eq!(catalog.records().await[0].id, b.id);

    catalog.rename(a.id, "renamed").await.unwrap();
    assert_eq!(catalog.find(a.id).await.unwrap().title, "renamed");

    assert!(catalog.delete(&b.source_locator).await.unwrap());
    assert_eq!(catalog.len().await, 1);
    assert!(catalog.find(b.id).await.is_none());

    let mut counts = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ClipDeckEvent::CatalogRefreshed { count, .. } = event {
            counts.push(count);
        }
    }
    assert_eq!(counts, vec![1, 2, 2, 1]);
}

#[tokio::test]
async fn test_trim_save_and_play_from_store() {
    let (_dir, store) = temp_store().await;
    let store = Arc::new(store);

    let record = ClipPipeline::default()
        .trim_and_save(
            ByteSource::from_bytes(sine_wav(16000, 2, 2.0)).with_hint("wav"),
            TrimRange::new(0.5, 1.25),
            "middle",
            store.as_ref(),
        )
        .await
        .unwrap();
    assert_eq!(record.duration_seconds, 0.75);
    // 12000 frames * 2 channels * 2 bytes + header
    assert_eq!(record.byte_size, 44 + 48000);

    let backend = MockBackend::new();
    let manager = PlaybackSessionManager::builder(backend.clone(), store.clone())
        .strategy(AutoplayStrategy::ImmediateRetry)
        .build();

    let session = manager
        .play(&record.id.to_string(), &record.source_locator)
        .await
        .unwrap();
    assert_eq!(session.state, SessionState::Playing);
    assert_eq!(backend.audible_voices(), 1);
}

#[tokio::test]
async fn test_invalid_range_saves_nothing() {
    let (_dir, store) = temp_store().await;

    let result = ClipPipeline::default()
        .trim_and_save(
            ByteSource::from_bytes(sine_wav(8000, 1, 1.0)),
            TrimRange::new(0.8, 0.2),
            "backwards",
            &store,
        )
        .await;

    assert!(matches!(result, Err(Error::InvalidRange { .. })));
    assert!(store.list().await.unwrap().is_empty());
}

/// Store whose `list` can be switched to fail while commands still succeed
struct ListFailingStore {
    inner: SqliteSoundStore,
    fail_list: AtomicBool,
}

#[async_trait]
impl SoundStore for ListFailingStore {
    async fn list(&self) -> Result<Vec<SoundRecord>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::Internal("listing unavailable".to_string()));
        }
        self.inner.list().await
    }

    async fn save(&self, clip: &EncodedClip, title: &str) -> Result<SoundRecord> {
        self.inner.save(clip, title).await
    }

    async fn stream_by_locator(&self, locator: &str, range: Option<ByteRange>) -> Result<ClipStream> {
        self.inner.stream_by_locator(locator, range).await
    }

    async fn delete(&self, locator: &str) -> Result<bool> {
        self.inner.delete(locator).await
    }

    async fn rename(&self, id: Uuid, title: &str) -> Result<SoundRecord> {
        self.inner.rename(id, title).await
    }
}

#[tokio::test]
async fn test_catalog_commands_succeed_when_refresh_fails() {
    let (_dir, inner) = temp_store().await;
    let store = Arc::new(ListFailingStore {
        inner,
        fail_list: AtomicBool::new(false),
    });
    let catalog = SoundCatalog::new(store.clone());

    let first = catalog.save(&short_clip(100), "first").await.unwrap();
    assert_eq!(catalog.len().await, 1);

    store.fail_list.store(true, Ordering::SeqCst);

    // The store committed, so the command reports success; the cache is stale
    let second = catalog.save(&short_clip(100), "second").await.unwrap();
    assert_eq!(catalog.len().await, 1);
    assert!(catalog.find(second.id).await.is_none());

    let renamed = catalog.rename(first.id, "renamed").await.unwrap();
    assert_eq!(renamed.title, "renamed");
    assert!(catalog.delete(&second.source_locator).await.unwrap());
    assert!(catalog.refresh().await.is_err());

    store.fail_list.store(false, Ordering::SeqCst);
    assert_eq!(catalog.refresh().await.unwrap(), 1);
    assert_eq!(catalog.find(first.id).await.unwrap().title, "renamed");
}
