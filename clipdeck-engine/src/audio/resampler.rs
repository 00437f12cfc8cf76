//! Audio resampling using rubato
//!
//! Converts a decoded clip to an output device's sample rate. Only the
//! playback path resamples; trimmed and stored clips keep their source rate.

use crate::audio::types::PcmBuffer;
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Planar resampler over whole `PcmBuffer`s
pub struct Resampler;

impl Resampler {
    /// Resample `buffer` to `output_rate`.
    ///
    /// Returns a clone when the rates already match.
    pub fn resample(buffer: &PcmBuffer, output_rate: u32) -> Result<PcmBuffer> {
        let input_rate = buffer.sample_rate();

        if output_rate == 0 {
            return Err(Error::InvalidBuffer("output rate must be positive".to_string()));
        }
        if input_rate == output_rate {
            debug!("Sample rate already at {}Hz, skipping resample", output_rate);
            return Ok(buffer.clone());
        }
        if buffer.frames() == 0 {
            return PcmBuffer::silent(output_rate, buffer.channel_count(), 0);
        }

        let channels = buffer.channel_count() as usize;
        let input_frames = buffer.frames() as usize;

        debug!(
            "Resampling from {}Hz to {}Hz ({} channels)",
            input_rate, output_rate, channels
        );

        let mut resampler = Self::create_resampler(input_rate, output_rate, channels, input_frames)?;

        let planar_output = resampler
            .process(buffer.channels(), None)
            .map_err(|e| Error::AudioOutput(format!("Resampling failed: {}", e)))?;

        debug!(
            "Resampled {} input frames to {} output frames",
            input_frames,
            planar_output.first().map(Vec::len).unwrap_or(0)
        );

        PcmBuffer::new(output_rate, planar_output)
    }

    /// One chunk covering the whole clip; the ratio never changes at runtime.
    fn create_resampler(
        input_rate: u32,
        output_rate: u32,
        channels: usize,
        chunk_size: usize,
    ) -> Result<FastFixedIn<f32>> {
        FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            chunk_size,
            channels,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to create resampler: {}", e)))
    }

    /// Planar to interleaved, mapping channels onto `out_channels`.
    ///
    /// Mono fans out to every output channel; extra source channels are
    /// dropped; missing output channels repeat the last source channel.
    pub fn interleave_for_output(buffer: &PcmBuffer, out_channels: usize) -> Vec<f32> {
        let frames = buffer.frames() as usize;
        let planar = buffer.channels();
        let last = planar.len().saturating_sub(1);
        let mut interleaved = Vec::with_capacity(frames * out_channels);

        for frame_idx in 0..frames {
            for out_ch in 0..out_channels {
                interleaved.push(planar[out_ch.min(last)][frame_idx]);
            }
        }

        interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let buffer = PcmBuffer::new(44100, vec![vec![0.1, 0.3], vec![0.2, 0.4]]).unwrap();
        let output = Resampler::resample(&buffer, 44100).unwrap();
        assert_eq!(output, buffer);
    }

    #[test]
    fn test_resample_different_rate() {
        let input_rate = 48000;
        let duration_frames = 1000;

        let samples: Vec<f32> = (0..duration_frames)
            .map(|i| {
                let t = i as f32 / input_rate as f32;
                (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
            })
            .collect();
        let buffer = PcmBuffer::new(input_rate, vec![samples.clone(), samples]).unwrap();

        let output = Resampler::resample(&buffer, 44100).unwrap();

        let expected_frames = (duration_frames as f64 * 44100.0 / input_rate as f64) as u32;
        assert_eq!(output.sample_rate(), 44100);
        assert_eq!(output.channel_count(), 2);
        assert!(
            output.frames() >= expected_frames - 10 && output.frames() <= expected_frames + 10,
            "Expected ~{} frames, got {}",
            expected_frames,
            output.frames()
        );
    }

    #[test]
    fn test_resample_empty_buffer() {
        let buffer = PcmBuffer::silent(22050, 1, 0).unwrap();
        let output = Resampler::resample(&buffer, 48000).unwrap();
        assert_eq!(output.sample_rate(), 48000);
        assert_eq!(output.frames(), 0);
    }

    #[test]
    fn test_interleave_stereo() {
        let buffer = PcmBuffer::new(8000, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]).unwrap();
        assert_eq!(
            Resampler::interleave_for_output(&buffer, 2),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    }

    #[test]
    fn test_interleave_mono_fans_out() {
        let buffer = PcmBuffer::new(8000, vec![vec![1.0, 2.0]]).unwrap();
        assert_eq!(
            Resampler::interleave_for_output(&buffer, 2),
            vec![1.0, 1.0, 2.0, 2.0]
        );
    }

    #[test]
    fn test_interleave_drops_extra_channels() {
        let buffer = PcmBuffer::new(8000, vec![vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        assert_eq!(Resampler::interleave_for_output(&buffer, 2), vec![1.0, 2.0]);
    }
}
