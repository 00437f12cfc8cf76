//! Sound catalog models
//!
//! A `SoundRecord` describes one finished clip held by the Sound Store. All
//! fields are mandatory; only `title` may change after creation.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Media type of a stored clip.
///
/// Closed set: clips are tagged explicitly when they are created, never by
/// sniffing a filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MimeType {
    /// RIFF/WAVE container with 16-bit integer PCM
    #[serde(rename = "audio/wav")]
    Wav,
}

impl MimeType {
    /// Canonical MIME string
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::Wav => "audio/wav",
        }
    }

    /// File extension used for stored blobs
    pub fn extension(&self) -> &'static str {
        match self {
            MimeType::Wav => "wav",
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MimeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "audio/wav" => Ok(MimeType::Wav),
            other => Err(Error::InvalidInput(format!("Unknown MIME type: {}", other))),
        }
    }
}

/// Metadata for a finished, persisted clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundRecord {
    /// Store-assigned identifier
    pub id: Uuid,
    /// User-visible title (the only mutable field)
    pub title: String,
    /// Clip length in seconds
    pub duration_seconds: f64,
    /// Size of the stored blob in bytes
    pub byte_size: u64,
    /// Opaque locator the store resolves back to the blob
    pub source_locator: String,
    /// Container type of the blob
    pub mime_type: MimeType,
    /// When the clip was persisted
    pub created_at: DateTime<Utc>,
}
