//! Core audio data types
//!
//! Defines the PCM buffer, the trim range and its frame-domain resolution, and
//! the encoded clip handed to the Sound Store.

use crate::error::{Error, Result};
use clipdeck_common::MimeType;

/// Immutable planar PCM audio.
///
/// **Format:**
/// - One `Vec<f32>` per channel, nominally in `[-1.0, 1.0]`
/// - Every channel holds exactly `frames` samples
/// - `sample_rate > 0`, at least one channel
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    frames: u32,
    channel_data: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Create a buffer from planar channel data, validating the shape invariants
    pub fn new(sample_rate: u32, channel_data: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidBuffer("sample rate must be positive".to_string()));
        }
        if channel_data.is_empty() {
            return Err(Error::InvalidBuffer("at least one channel required".to_string()));
        }
        if channel_data.len() > u8::MAX as usize {
            return Err(Error::InvalidBuffer(format!(
                "{} channels exceeds the supported maximum of {}",
                channel_data.len(),
                u8::MAX
            )));
        }

        let frames = channel_data[0].len();
        if let Some((idx, ch)) = channel_data
            .iter()
            .enumerate()
            .find(|(_, ch)| ch.len() != frames)
        {
            return Err(Error::InvalidBuffer(format!(
                "channel {} has {} samples, expected {}",
                idx,
                ch.len(),
                frames
            )));
        }
        let frames = u32::try_from(frames)
            .map_err(|_| Error::InvalidBuffer(format!("{} frames exceeds u32", frames)))?;

        Ok(Self {
            sample_rate,
            frames,
            channel_data,
        })
    }

    /// Create a buffer of digital silence
    pub fn silent(sample_rate: u32, channel_count: u8, frames: u32) -> Result<Self> {
        Self::new(
            sample_rate,
            vec![vec![0.0; frames as usize]; channel_count as usize],
        )
    }

    /// Frames per second
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels
    pub fn channel_count(&self) -> u8 {
        self.channel_data.len() as u8
    }

    /// Length in the time dimension
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Samples for one channel, or None if out of range
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channel_data.get(index).map(Vec::as_slice)
    }

    /// All channels, planar
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channel_data
    }

    /// Consume the buffer, returning its planar channel data
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channel_data
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Sample at (channel, frame); None if either index is out of range
    pub fn sample(&self, channel: usize, frame: usize) -> Option<f32> {
        self.channel_data.get(channel)?.get(frame).copied()
    }
}

/// Requested trim bounds in seconds.
///
/// Fields are public so callers can express any request; validation happens in
/// `trim()` (and `TrimRange::validate`) before any frame computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimRange {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl TrimRange {
    pub fn new(start_seconds: f64, end_seconds: f64) -> Self {
        Self {
            start_seconds,
            end_seconds,
        }
    }

    /// Reject negative starts, non-increasing ranges and non-finite bounds
    pub fn validate(&self) -> Result<()> {
        let valid = self.start_seconds.is_finite()
            && self.end_seconds.is_finite()
            && self.start_seconds >= 0.0
            && self.end_seconds > self.start_seconds;

        if valid {
            Ok(())
        } else {
            Err(Error::InvalidRange {
                start: self.start_seconds,
                end: self.end_seconds,
            })
        }
    }
}

/// Half-open frame interval `[start_frame, end_frame)` inside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    pub start_frame: u32,
    pub end_frame: u32,
}

impl FrameRange {
    /// Resolve a validated `TrimRange` against a buffer shape.
    ///
    /// Seconds are converted with floor (truncation), then clamped to
    /// `[0, total_frames]`. Clamping happens in the frame domain, which is the
    /// same as clamping to the duration in seconds without the float error of
    /// `frames / rate * rate`.
    pub fn resolve(range: &TrimRange, sample_rate: u32, total_frames: u32) -> Result<Self> {
        range.validate()?;

        let rate = sample_rate as f64;
        let to_frame = |seconds: f64| -> u32 {
            let frame = (seconds * rate).floor();
            if frame >= total_frames as f64 {
                total_frames
            } else {
                frame as u32
            }
        };

        let start_frame = to_frame(range.start_seconds);
        let end_frame = to_frame(range.end_seconds);

        if start_frame >= end_frame {
            return Err(Error::EmptyTrimResult {
                start_frame: start_frame as u64,
                end_frame: end_frame as u64,
            });
        }

        Ok(Self {
            start_frame,
            end_frame,
        })
    }

    /// Number of frames covered
    pub fn len(&self) -> u32 {
        self.end_frame - self.start_frame
    }

    pub fn is_empty(&self) -> bool {
        self.end_frame <= self.start_frame
    }
}

/// Serialized clip ready for storage: container bytes plus type metadata
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedClip {
    bytes: Vec<u8>,
    mime_type: MimeType,
    duration_seconds: f64,
}

impl EncodedClip {
    pub(crate) fn new(bytes: Vec<u8>, mime_type: MimeType, duration_seconds: f64) -> Self {
        Self {
            bytes,
            mime_type,
            duration_seconds,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn mime_type(&self) -> MimeType {
        self.mime_type
    }

    pub fn byte_length(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }
}
