//! Sound Store
//!
//! Persistence contract for encoded clips plus the read side used by the
//! playback manager. `SqliteSoundStore` is the bundled implementation;
//! `SoundCatalog` caches its listing.

pub mod catalog;
pub mod sqlite;

pub use catalog::SoundCatalog;
pub use sqlite::SqliteSoundStore;

use crate::audio::decoder::ByteSource;
use crate::audio::types::EncodedClip;
use crate::error::{Error, Result};
use async_trait::async_trait;
use clipdeck_common::{MimeType, SoundRecord};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

/// Requested byte range, HTTP `Range: bytes=` semantics (inclusive ends)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-`
    From { start: u64 },
    /// `bytes=start-end`
    Inclusive { start: u64, end: u64 },
    /// `bytes=-len`: the last `len` bytes
    Suffix { len: u64 },
}

impl ByteRange {
    /// Parse a single-range `Range` header value such as `bytes=0-1023`
    pub fn parse_header(value: &str) -> Result<Self> {
        let invalid = || Error::RangeNotSatisfiable {
            requested: value.to_string(),
            total: 0,
        };

        let spec = value.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
        if spec.contains(',') {
            return Err(invalid());
        }
        let (start, end) = spec.split_once('-').ok_or_else(invalid)?;
        let parse = |s: &str| s.trim().parse::<u64>().map_err(|_| invalid());

        match (start.trim().is_empty(), end.trim().is_empty()) {
            (true, false) => Ok(ByteRange::Suffix { len: parse(end)? }),
            (false, true) => Ok(ByteRange::From { start: parse(start)? }),
            (false, false) => {
                let (start, end) = (parse(start)?, parse(end)?);
                if end < start {
                    return Err(invalid());
                }
                Ok(ByteRange::Inclusive { start, end })
            }
            (true, true) => Err(invalid()),
        }
    }

    /// Resolve against a blob of `total` bytes
    pub fn resolve(&self, total: u64) -> Result<ContentRange> {
        let unsatisfiable = || Error::RangeNotSatisfiable {
            requested: self.to_string(),
            total,
        };

        let (start, end) = match *self {
            ByteRange::From { start } => (start, total.checked_sub(1).ok_or_else(unsatisfiable)?),
            ByteRange::Inclusive { start, end } => {
                (start, end.min(total.checked_sub(1).ok_or_else(unsatisfiable)?))
            }
            ByteRange::Suffix { len } => {
                if len == 0 || total == 0 {
                    return Err(unsatisfiable());
                }
                (total.saturating_sub(len), total - 1)
            }
        };

        if start >= total || start > end {
            return Err(unsatisfiable());
        }

        Ok(ContentRange { start, end, total })
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteRange::From { start } => write!(f, "bytes={}-", start),
            ByteRange::Inclusive { start, end } => write!(f, "bytes={}-{}", start, end),
            ByteRange::Suffix { len } => write!(f, "bytes=-{}", len),
        }
    }
}

/// Slice of a blob actually served; `end` is inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    pub fn full(total: u64) -> Self {
        Self {
            start: 0,
            end: total.saturating_sub(1),
            total,
        }
    }

    pub fn len(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Content-Range` header value, e.g. `bytes 0-99/1000`
    pub fn header_value(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Byte stream of a stored clip, or a range of it
pub struct ClipStream {
    pub mime_type: MimeType,
    pub range: ContentRange,
    /// True when only part of the blob was requested
    pub partial: bool,
    reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl ClipStream {
    pub fn new(
        mime_type: MimeType,
        range: ContentRange,
        partial: bool,
        reader: Pin<Box<dyn AsyncRead + Send>>,
    ) -> Self {
        Self {
            mime_type,
            range,
            partial,
            reader,
        }
    }

    pub fn into_reader(self) -> Pin<Box<dyn AsyncRead + Send>> {
        self.reader
    }

    /// Drain the stream into memory
    pub async fn read_to_end(mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.range.len() as usize);
        self.reader.read_to_end(&mut bytes).await?;
        Ok(bytes)
    }
}

impl fmt::Debug for ClipStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipStream")
            .field("mime_type", &self.mime_type)
            .field("range", &self.range)
            .field("partial", &self.partial)
            .finish_non_exhaustive()
    }
}

/// Persistence contract for clips.
///
/// Records are immutable except for `title`; ids and locators are chosen by
/// the store.
#[async_trait]
pub trait SoundStore: Send + Sync {
    /// All records, newest first
    async fn list(&self) -> Result<Vec<SoundRecord>>;

    async fn save(&self, clip: &EncodedClip, title: &str) -> Result<SoundRecord>;

    async fn stream_by_locator(&self, locator: &str, range: Option<ByteRange>) -> Result<ClipStream>;

    /// Returns false if nothing was stored under `locator`
    async fn delete(&self, locator: &str) -> Result<bool>;

    async fn rename(&self, id: Uuid, title: &str) -> Result<SoundRecord>;
}

/// Where the playback manager gets clip bytes from
#[async_trait]
pub trait ClipSource: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<ByteSource>;
}

/// Clip source whose locators are file paths, optionally under a root
#[derive(Debug, Clone, Default)]
pub struct FsClipSource {
    root: Option<PathBuf>,
}

impl FsClipSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Rooted locators must be relative paths that stay under the root
    fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let Some(root) = &self.root else {
            return Ok(PathBuf::from(locator));
        };

        let relative = Path::new(locator);
        let confined = !locator.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            return Err(Error::InvalidLocator(locator.to_string()));
        }
        Ok(root.join(relative))
    }
}

#[async_trait]
impl ClipSource for FsClipSource {
    async fn fetch(&self, locator: &str) -> Result<ByteSource> {
        let path = self.resolve(locator)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(Error::NotFound(path.display().to_string()));
        }
        Ok(ByteSource::File(path))
    }
}

/// Reject locators that could escape the blob folder
pub(crate) fn validate_locator(locator: &str) -> Result<()> {
    let path = Path::new(locator);
    let single_component = path.components().count() == 1
        && path.file_name().map(|n| n == locator).unwrap_or(false);

    if locator.is_empty() || locator.contains(['/', '\\']) || !single_component {
        return Err(Error::InvalidLocator(locator.to_string()));
    }
    Ok(())
}
