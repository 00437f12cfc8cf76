//! Trim Engine
//!
//! Sample-accurate extraction of a time range from a PCM buffer.
//!
//! Seconds are truncated to frame indices and each channel's sub-range is
//! copied verbatim: no resampling, no fades, no declick at the boundaries.
//! A cut through a non-zero sample can click audibly; that is accepted.

use crate::audio::types::{FrameRange, PcmBuffer, TrimRange};
use crate::error::{Error, Result};
use tracing::debug;

/// Produce a new buffer holding exactly `range` of `buffer`.
///
/// # Errors
/// - `InvalidRange` if `start < 0`, `end <= start`, or a bound is not finite
///   (checked before any frame arithmetic)
/// - `EmptyTrimResult` if the range is empty after clamping to the buffer
///
/// An end beyond the buffer's duration is clamped silently.
pub fn trim(buffer: &PcmBuffer, range: TrimRange) -> Result<PcmBuffer> {
    let frames = FrameRange::resolve(&range, buffer.sample_rate(), buffer.frames())?;
    trim_frames(buffer, frames)
}

/// Copy `[start_frame, end_frame)` of every channel into a new buffer.
///
/// # Errors
/// - `EmptyTrimResult` if `start_frame >= end_frame`
/// - `InvalidRange` if `end_frame` lies past the end of the buffer
pub fn trim_frames(buffer: &PcmBuffer, frames: FrameRange) -> Result<PcmBuffer> {
    if frames.is_empty() {
        return Err(Error::EmptyTrimResult {
            start_frame: frames.start_frame as u64,
            end_frame: frames.end_frame as u64,
        });
    }
    if frames.end_frame > buffer.frames() {
        let rate = buffer.sample_rate() as f64;
        return Err(Error::InvalidRange {
            start: frames.start_frame as f64 / rate,
            end: frames.end_frame as f64 / rate,
        });
    }

    let start = frames.start_frame as usize;
    let end = frames.end_frame as usize;

    let channel_data: Vec<Vec<f32>> = buffer
        .channels()
        .iter()
        .map(|samples| samples[start..end].to_vec())
        .collect();

    debug!(
        "Trimmed frames [{}, {}) of {} ({} channels @ {}Hz)",
        start,
        end,
        buffer.frames(),
        buffer.channel_count(),
        buffer.sample_rate()
    );

    PcmBuffer::new(buffer.sample_rate(), channel_data)
}
