//! Trim Engine Tests
//!
//! **Test Coverage:**
//! - Output length is exactly `floor(end*sr) - floor(start*sr)` after clamping
//! - Trimmed samples equal the source sub-range (no fades, no resampling)
//! - Validation happens before frame arithmetic
//! - Trimming is pure: the source buffer is untouched

mod helpers;

use clipdeck_engine::audio::trim::{trim, trim_frames};
use clipdeck_engine::audio::{FrameRange, PcmBuffer, TrimRange};
use clipdeck_engine::Error;
use helpers::ramp_buffer;

#[test]
fn test_output_length_matches_floor_arithmetic() {
    let cases = [
        (44100, 0.0, 1.0),
        (44100, 0.123456, 0.654321),
        (48000, 0.5, 1.999),
        (22050, 1.0 / 3.0, 2.0 / 3.0),
        (8000, 0.0001, 0.0002),
    ];

    for (rate, start, end) in cases {
        let buffer = ramp_buffer(rate, 2, rate as usize * 2);
        let out = trim(&buffer, TrimRange::new(start, end)).unwrap();

        let expected = (end * rate as f64).floor() as u32 - (start * rate as f64).floor() as u32;
        assert_eq!(out.frames(), expected, "rate={} range=[{}, {})", rate, start, end);
        assert_eq!(out.sample_rate(), rate);
        assert_eq!(out.channel_count(), 2);
    }
}

#[test]
fn test_trimmed_samples_equal_source_sub_range() {
    let buffer = ramp_buffer(44100, 2, 44100);
    let out = trim(&buffer, TrimRange::new(0.25, 0.75)).unwrap();

    let start = (0.25f64 * 44100.0).floor() as usize;
    for ch in 0..2 {
        let src = buffer.channel(ch).unwrap();
        let dst = out.channel(ch).unwrap();
        assert_eq!(dst, &src[start..start + dst.len()]);
    }
}

#[test]
fn test_first_and_last_samples_are_not_faded() {
    let buffer = PcmBuffer::new(1000, vec![vec![0.9; 1000]]).unwrap();
    let out = trim(&buffer, TrimRange::new(0.1, 0.2)).unwrap();

    assert_eq!(out.sample(0, 0), Some(0.9));
    assert_eq!(out.sample(0, out.frames() as usize - 1), Some(0.9));
}

#[test]
fn test_invalid_ranges_are_rejected() {
    let buffer = ramp_buffer(44100, 1, 44100);

    for (start, end) in [(-0.5, 1.0), (1.0, 1.0), (0.8, 0.2), (f64::NAN, 1.0), (0.0, f64::NAN)] {
        let result = trim(&buffer, TrimRange::new(start, end));
        assert!(
            matches!(result, Err(Error::InvalidRange { .. })),
            "[{}, {}) should be InvalidRange, got {:?}",
            start,
            end,
            result.map(|b| b.frames())
        );
    }
}

#[test]
fn test_range_collapsing_below_one_frame_is_empty() {
    let buffer = ramp_buffer(1000, 1, 1000);
    // Both bounds floor to frame 100
    let result = trim(&buffer, TrimRange::new(0.1001, 0.1009));
    assert!(matches!(
        result,
        Err(Error::EmptyTrimResult {
            start_frame: 100,
            end_frame: 100
        })
    ));
}

#[test]
fn test_range_entirely_past_end_is_empty() {
    let buffer = ramp_buffer(1000, 1, 1000);
    let result = trim(&buffer, TrimRange::new(3.0, 4.0));
    assert!(matches!(result, Err(Error::EmptyTrimResult { .. })));
}

#[test]
fn test_end_past_duration_is_clamped_silently() {
    let buffer = ramp_buffer(16000, 2, 16000);
    let out = trim(&buffer, TrimRange::new(0.5, 1000.0)).unwrap();
    assert_eq!(out.frames(), 8000);
    assert_eq!(out.sample(1, 7999), buffer.sample(1, 15999));
}

#[test]
fn test_source_is_untouched() {
    let buffer = ramp_buffer(8000, 3, 800);
    let before = buffer.clone();
    let _ = trim(&buffer, TrimRange::new(0.01, 0.05)).unwrap();
    assert_eq!(buffer, before);
}

#[test]
fn test_trim_frames_matches_trim() {
    let buffer = ramp_buffer(44100, 2, 10000);
    let range = TrimRange::new(0.01, 0.2);

    let frames = FrameRange::resolve(&range, 44100, buffer.frames()).unwrap();
    assert_eq!(
        trim_frames(&buffer, frames).unwrap(),
        trim(&buffer, range).unwrap()
    );
}

#[test]
fn test_trim_frames_rejects_out_of_bounds_and_reversed_ranges() {
    let buffer = PcmBuffer::silent(1000, 1, 10).unwrap();

    let past_end = trim_frames(
        &buffer,
        FrameRange {
            start_frame: 5,
            end_frame: 50,
        },
    );
    assert!(matches!(past_end, Err(Error::InvalidRange { .. })));

    let reversed = trim_frames(
        &buffer,
        FrameRange {
            start_frame: 8,
            end_frame: 2,
        },
    );
    assert!(matches!(
        reversed,
        Err(Error::EmptyTrimResult {
            start_frame: 8,
            end_frame: 2
        })
    ));

    let whole = trim_frames(
        &buffer,
        FrameRange {
            start_frame: 0,
            end_frame: 10,
        },
    )
    .unwrap();
    assert_eq!(whole.frames(), 10);
}
