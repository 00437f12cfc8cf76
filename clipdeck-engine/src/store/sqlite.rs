//! SQLite-backed sound store
//!
//! Metadata lives in the `sounds` table; clip bytes live in
//! `<root>/sounds/<locator>`. The locator is `<id>.<ext>` and is never taken
//! from user input on save.

use crate::audio::decoder::ByteSource;
use crate::audio::types::EncodedClip;
use crate::error::{Error, Result};
use crate::store::{validate_locator, ByteRange, ClipSource, ClipStream, ContentRange, SoundStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use clipdeck_common::{MimeType, SoundRecord};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Subdirectory of the root folder holding clip blobs
pub const BLOB_DIR: &str = "sounds";

pub struct SqliteSoundStore {
    pool: SqlitePool,
    blob_dir: PathBuf,
}

impl SqliteSoundStore {
    /// Open (creating if needed) the database and blob folder
    pub async fn open(database_path: &Path, root_folder: &Path) -> Result<Self> {
        let newly_created = !database_path.exists();

        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", database_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new database: {}", database_path.display());
        } else {
            info!("Opened existing database: {}", database_path.display());
        }

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        Self::with_pool(pool, root_folder).await
    }

    /// Use an existing pool; creates the schema and blob folder
    pub async fn with_pool(pool: SqlitePool, root_folder: &Path) -> Result<Self> {
        create_sounds_table(&pool).await?;

        let blob_dir = root_folder.join(BLOB_DIR);
        tokio::fs::create_dir_all(&blob_dir).await?;

        Ok(Self { pool, blob_dir })
    }

    pub fn blob_dir(&self) -> &Path {
        &self.blob_dir
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<SoundRecord>> {
        let row = sqlx::query(
            "SELECT guid, title, duration, byte_size, locator, mime_type, created_at FROM sounds WHERE guid = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    pub async fn get_by_locator(&self, locator: &str) -> Result<Option<SoundRecord>> {
        let row = sqlx::query(
            "SELECT guid, title, duration, byte_size, locator, mime_type, created_at FROM sounds WHERE locator = ?",
        )
        .bind(locator)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    fn blob_path(&self, locator: &str) -> Result<PathBuf> {
        validate_locator(locator)?;
        Ok(self.blob_dir.join(locator))
    }
}

async fn create_sounds_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sounds (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            duration REAL NOT NULL CHECK (duration >= 0),
            byte_size INTEGER NOT NULL CHECK (byte_size >= 0),
            locator TEXT NOT NULL UNIQUE,
            mime_type TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sounds_created_at ON sounds(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

fn row_to_record(row: &SqliteRow) -> Result<SoundRecord> {
    let guid: String = row.get("guid");
    let id = Uuid::parse_str(&guid)
        .map_err(|e| Error::Internal(format!("Invalid guid '{}' in sounds table: {}", guid, e)))?;

    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Invalid created_at '{}': {}", created_at, e)))?
        .with_timezone(&Utc);

    let mime_type: MimeType = row.get::<String, _>("mime_type").parse()?;

    Ok(SoundRecord {
        id,
        title: row.get("title"),
        duration_seconds: row.get("duration"),
        byte_size: row.get::<i64, _>("byte_size") as u64,
        source_locator: row.get("locator"),
        mime_type,
        created_at,
    })
}

/// Write `bytes` to `partial`, then move it into place at `path`.
///
/// On failure the partial file is removed before the error is returned.
async fn write_blob(partial: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    if let Err(e) = write_and_rename(partial, path, bytes).await {
        if let Err(cleanup) = tokio::fs::remove_file(partial).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove partial blob {}: {}", partial.display(), cleanup);
            }
        }
        return Err(e.into());
    }
    Ok(())
}

async fn write_and_rename(partial: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(partial).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(partial, path).await
}

fn normalize_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(clipdeck_common::Error::InvalidInput("title must not be empty".to_string()).into());
    }
    Ok(title.to_string())
}

#[async_trait]
impl SoundStore for SqliteSoundStore {
    async fn list(&self) -> Result<Vec<SoundRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT guid, title, duration, byte_size, locator, mime_type, created_at
            FROM sounds
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn save(&self, clip: &EncodedClip, title: &str) -> Result<SoundRecord> {
        let title = normalize_title(title)?;
        let id = Uuid::new_v4();
        let locator = format!("{}.{}", id, clip.mime_type().extension());
        let path = self.blob_path(&locator)?;
        let partial = path.with_extension("part");

        write_blob(&partial, &path, clip.bytes()).await?;

        let record = SoundRecord {
            id,
            title,
            duration_seconds: clip.duration_seconds(),
            byte_size: clip.byte_length(),
            source_locator: locator,
            mime_type: clip.mime_type(),
            // Stored at microsecond precision
            created_at: Utc::now().trunc_subsecs(6),
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO sounds (guid, title, duration, byte_size, locator, mime_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.title)
        .bind(record.duration_seconds)
        .bind(record.byte_size as i64)
        .bind(&record.source_locator)
        .bind(record.mime_type.as_str())
        .bind(record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await;

        if let Err(e) = inserted {
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove orphaned blob {}: {}", path.display(), cleanup);
            }
            return Err(e.into());
        }

        info!(
            "Saved sound '{}' ({} bytes, {:.3}s) as {}",
            record.title, record.byte_size, record.duration_seconds, record.source_locator
        );
        Ok(record)
    }

    async fn stream_by_locator(&self, locator: &str, range: Option<ByteRange>) -> Result<ClipStream> {
        let path = self.blob_path(locator)?;
        let record = self
            .get_by_locator(locator)
            .await?
            .ok_or_else(|| Error::NotFound(locator.to_string()))?;

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("blob for {}", locator))
            } else {
                Error::Io(e)
            }
        })?;
        let total = file.metadata().await?.len();

        let content_range = match range {
            Some(range) => range.resolve(total)?,
            None => ContentRange::full(total),
        };

        if content_range.start > 0 {
            file.seek(SeekFrom::Start(content_range.start)).await?;
        }

        debug!(
            "Streaming {} ({})",
            locator,
            content_range.header_value()
        );

        Ok(ClipStream::new(
            record.mime_type,
            content_range,
            range.is_some(),
            Box::pin(file.take(content_range.len())),
        ))
    }

    async fn delete(&self, locator: &str) -> Result<bool> {
        let path = self.blob_path(locator)?;

        let rows = sqlx::query("DELETE FROM sounds WHERE locator = ?")
            .bind(locator)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let blob_removed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        let deleted = rows > 0 || blob_removed;
        if deleted {
            info!("Deleted sound {}", locator);
        }
        Ok(deleted)
    }

    async fn rename(&self, id: Uuid, title: &str) -> Result<SoundRecord> {
        let title = normalize_title(title)?;

        let rows = sqlx::query("UPDATE sounds SET title = ? WHERE guid = ?")
            .bind(&title)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        debug!("Renamed sound {} to '{}'", id, title);
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

#[async_trait]
impl ClipSource for SqliteSoundStore {
    async fn fetch(&self, locator: &str) -> Result<ByteSource> {
        let path = self.blob_path(locator)?;
        if self.get_by_locator(locator).await?.is_none() {
            return Err(Error::NotFound(locator.to_string()));
        }
        Ok(ByteSource::File(path))
    }
}
