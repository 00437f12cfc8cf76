//! Error types for clipdeck-engine
//!
//! One enum for the whole engine, using thiserror. The decode, trim and
//! playback variants form the user-facing taxonomy; the rest are plumbing.

use std::time::Duration;
use thiserror::Error;

/// Main error type for clipdeck-engine
#[derive(Error, Debug)]
pub enum Error {
    /// The platform decoder does not recognize the container or codec
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Decoding started but could not produce a complete buffer
    #[error("Corrupt input: {0}")]
    CorruptInput(String),

    /// Decode did not finish within the caller-imposed timeout
    #[error("Decode timed out after {0:?}")]
    DecodeTimeout(Duration),

    /// Trim bounds rejected before any frame computation
    #[error("Invalid trim range: start={start}s, end={end}s")]
    InvalidRange { start: f64, end: f64 },

    /// Trim range collapsed to zero frames after clamping
    #[error("Trim produced no frames (start_frame={start_frame}, end_frame={end_frame})")]
    EmptyTrimResult { start_frame: u64, end_frame: u64 },

    /// PCM buffer invariants violated at construction
    #[error("Invalid PCM buffer: {0}")]
    InvalidBuffer(String),

    /// Data section would overflow the container's 32-bit size fields
    #[error("Clip too large for WAV container: {0} data bytes")]
    ClipTooLarge(u64),

    /// Network/stream/device failure during an active session
    #[error("Playback error: {0}")]
    Playback(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Locator that the store cannot resolve safely
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Requested byte range lies outside the stored blob
    #[error("Range not satisfiable: {requested} (length {total})")]
    RangeNotSatisfiable { requested: String, total: u64 },

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from clipdeck-common
    #[error(transparent)]
    Common(#[from] clipdeck_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a caller may reasonably retry the same request once.
    ///
    /// Only resource/timing failures qualify; the engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::DecodeTimeout(_))
    }

    /// Short message suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            Error::UnsupportedFormat(_) => "This file type can't be played.".to_string(),
            Error::CorruptInput(_) => "This file appears to be damaged.".to_string(),
            Error::DecodeTimeout(_) => "Loading the sound took too long. Try again.".to_string(),
            Error::InvalidRange { .. } => "The end time must be after the start time.".to_string(),
            Error::EmptyTrimResult { .. } => "The selected range is empty.".to_string(),
            Error::Playback(_) | Error::AudioOutput(_) => "Playback failed.".to_string(),
            Error::NotFound(_) => "That sound no longer exists.".to_string(),
            other => format!("Something went wrong: {}", other),
        }
    }
}

/// Convenience Result type using clipdeck-engine Error
pub type Result<T> = std::result::Result<T, Error>;
