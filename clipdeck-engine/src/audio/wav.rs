//! Container Encoder (RIFF/WAVE, 16-bit integer PCM)
//!
//! Layout (all integers little-endian):
//!
//! | Offset | Size | Value                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 4    | `"RIFF"`                               |
//! | 4      | 4    | `36 + data_len`                        |
//! | 8      | 4    | `"WAVE"`                               |
//! | 12     | 4    | `"fmt "`                               |
//! | 16     | 4    | `16`                                   |
//! | 20     | 2    | `1` (integer PCM)                      |
//! | 22     | 2    | channel count                          |
//! | 24     | 4    | sample rate                            |
//! | 28     | 4    | byte rate = rate * channels * 2        |
//! | 32     | 2    | block align = channels * 2             |
//! | 34     | 2    | `16` bits per sample                   |
//! | 36     | 4    | `"data"`                               |
//! | 40     | 4    | `data_len = frames * channels * 2`     |
//! | 44     | ...  | interleaved i16 samples, frame-major   |

use crate::audio::types::{EncodedClip, PcmBuffer};
use crate::error::{Error, Result};
use clipdeck_common::MimeType;
use tracing::debug;

/// Size of the canonical header
pub const WAV_HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u32 = 2;
const FORMAT_PCM: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

/// Quantize one float sample to 16-bit.
///
/// Clamp to `[-1, 1]`, scale negatives by 32768 and non-negatives by 32767,
/// then truncate toward zero. NaN maps to 0. The product is formed in f64,
/// where an f32 times a 16-bit constant is exact.
pub fn quantize_sample(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0) as f64;
    let scaled = if clamped < 0.0 {
        clamped * 32768.0
    } else {
        clamped * 32767.0
    };
    scaled as i16
}

/// Exact inverse of `quantize_sample` on its image.
///
/// Negatives divide by 32768 (exact in f32). Non-negatives take the smallest
/// f32 not below `s / 32767`, so `quantize_sample` truncates back to `s`.
pub fn dequantize_sample(sample: i16) -> f32 {
    if sample < 0 {
        return sample as f32 / 32768.0;
    }

    let exact = sample as f64 / 32767.0;
    let nearest = exact as f32;
    if (nearest as f64) < exact {
        f32::from_bits(nearest.to_bits() + 1)
    } else {
        nearest
    }
}

/// Parsed canonical WAV header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub channel_count: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

impl WavHeader {
    /// Header describing `frames` frames of 16-bit PCM
    pub fn for_pcm16(channel_count: u16, sample_rate: u32, frames: u32) -> Result<Self> {
        let data_len = frames as u64 * channel_count as u64 * BYTES_PER_SAMPLE as u64;
        if data_len + 36 > u32::MAX as u64 {
            return Err(Error::ClipTooLarge(data_len));
        }
        let block_align = u16::try_from(channel_count as u32 * BYTES_PER_SAMPLE).map_err(|_| {
            Error::InvalidBuffer(format!("{} channels do not fit a WAV frame", channel_count))
        })?;
        let byte_rate = sample_rate.checked_mul(block_align as u32).ok_or_else(|| {
            Error::InvalidBuffer(format!(
                "byte rate overflows for {}Hz x {} channels",
                sample_rate, channel_count
            ))
        })?;

        Ok(Self {
            channel_count,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample: BITS_PER_SAMPLE,
            data_len: data_len as u32,
        })
    }

    /// Frames described by the data chunk
    pub fn frames(&self) -> u32 {
        if self.block_align == 0 {
            0
        } else {
            self.data_len / self.block_align as u32
        }
    }

    /// Serialize to the 44-byte canonical layout
    pub fn to_bytes(&self) -> [u8; WAV_HEADER_LEN] {
        let mut out = [0u8; WAV_HEADER_LEN];
        out[0..4].copy_from_slice(b"RIFF");
        out[4..8].copy_from_slice(&(36 + self.data_len).to_le_bytes());
        out[8..12].copy_from_slice(b"WAVE");
        out[12..16].copy_from_slice(b"fmt ");
        out[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        out[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
        out[22..24].copy_from_slice(&self.channel_count.to_le_bytes());
        out[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[28..32].copy_from_slice(&self.byte_rate.to_le_bytes());
        out[32..34].copy_from_slice(&self.block_align.to_le_bytes());
        out[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        out[36..40].copy_from_slice(b"data");
        out[40..44].copy_from_slice(&self.data_len.to_le_bytes());
        out
    }

    /// Parse and validate a canonical 16-bit PCM header.
    ///
    /// Only the layout this encoder writes is accepted; extensible or
    /// chunk-reordered files should go through the Decode Adapter instead.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < WAV_HEADER_LEN {
            return Err(Error::CorruptInput(format!(
                "WAV header needs {} bytes, got {}",
                WAV_HEADER_LEN,
                bytes.len()
            )));
        }

        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(Error::UnsupportedFormat("not a RIFF/WAVE stream".to_string()));
        }
        if &bytes[12..16] != b"fmt " || u32_at(16) != FMT_CHUNK_LEN || &bytes[36..40] != b"data" {
            return Err(Error::UnsupportedFormat(
                "non-canonical WAV chunk layout".to_string(),
            ));
        }
        if u16_at(20) != FORMAT_PCM || u16_at(34) != BITS_PER_SAMPLE {
            return Err(Error::UnsupportedFormat(format!(
                "expected 16-bit integer PCM, got format {} at {} bits",
                u16_at(20),
                u16_at(34)
            )));
        }

        let header = Self {
            channel_count: u16_at(22),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            block_align: u16_at(32),
            bits_per_sample: u16_at(34),
            data_len: u32_at(40),
        };

        if header.channel_count == 0 || header.sample_rate == 0 {
            return Err(Error::CorruptInput("zero channels or sample rate".to_string()));
        }
        if header.block_align as u32 != header.channel_count as u32 * BYTES_PER_SAMPLE {
            return Err(Error::CorruptInput(format!(
                "block align {} inconsistent with {} channels",
                header.block_align, header.channel_count
            )));
        }
        if u32_at(4) != 36u32.wrapping_add(header.data_len) {
            return Err(Error::CorruptInput("RIFF size disagrees with data length".to_string()));
        }

        Ok(header)
    }
}

/// Serialize a PCM buffer into a canonical 16-bit WAV clip.
///
/// # Errors
/// `ClipTooLarge` if the data section would not fit the 32-bit size fields.
pub fn encode(buffer: &PcmBuffer) -> Result<EncodedClip> {
    let channels = buffer.channel_count() as usize;
    let frames = buffer.frames() as usize;
    let header = WavHeader::for_pcm16(channels as u16, buffer.sample_rate(), buffer.frames())?;

    let mut bytes = Vec::with_capacity(WAV_HEADER_LEN + header.data_len as usize);
    bytes.extend_from_slice(&header.to_bytes());

    let planar = buffer.channels();
    for frame in 0..frames {
        for channel in planar {
            bytes.extend_from_slice(&quantize_sample(channel[frame]).to_le_bytes());
        }
    }

    debug!(
        "Encoded {} frames x {} channels @ {}Hz into {} bytes",
        frames,
        channels,
        buffer.sample_rate(),
        bytes.len()
    );

    Ok(EncodedClip::new(bytes, MimeType::Wav, buffer.duration_seconds()))
}

/// Read a canonical 16-bit WAV produced by `encode` back into PCM.
///
/// Strict: anything other than the 44-byte canonical layout is rejected.
/// Playback and trimming decode through `DecodeAdapter`, stored clips included.
pub fn decode_canonical(bytes: &[u8]) -> Result<PcmBuffer> {
    let header = WavHeader::parse(bytes)?;
    let channels = header.channel_count as usize;
    let data = &bytes[WAV_HEADER_LEN..];

    if data.len() < header.data_len as usize {
        return Err(Error::CorruptInput(format!(
            "data chunk truncated: {} of {} bytes",
            data.len(),
            header.data_len
        )));
    }

    let frames = header.frames() as usize;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for (i, pair) in data[..frames * channels * 2].chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        planar[i % channels].push(dequantize_sample(sample));
    }

    PcmBuffer::new(header.sample_rate, planar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_extremes() {
        assert_eq!(quantize_sample(1.0), 32767);
        assert_eq!(quantize_sample(-1.0), -32768);
        assert_eq!(quantize_sample(0.0), 0);
        assert_eq!(quantize_sample(2.5), 32767);
        assert_eq!(quantize_sample(-7.0), -32768);
        assert_eq!(quantize_sample(f32::NAN), 0);
    }

    #[test]
    fn test_quantize_truncates_toward_zero() {
        // 0.5 * 32767 = 16383.5 -> 16383
        assert_eq!(quantize_sample(0.5), 16383);
        // -0.5 * 32768 = -16384 exactly
        assert_eq!(quantize_sample(-0.5), -16384);
        // -0.00002 * 32768 = -0.655 -> 0
        assert_eq!(quantize_sample(-0.00002), 0);
    }

    #[test]
    fn test_dequantize_is_exact_inverse_for_every_i16() {
        for s in i16::MIN..=i16::MAX {
            assert_eq!(quantize_sample(dequantize_sample(s)), s, "sample {}", s);
        }
    }

    #[test]
    fn test_dequantize_stays_in_unit_range() {
        assert_eq!(dequantize_sample(i16::MIN), -1.0);
        assert!(dequantize_sample(i16::MAX) <= 1.0 + f32::EPSILON);
    }

    #[test]
    fn test_header_rejects_non_wave() {
        let mut bytes = WavHeader::for_pcm16(1, 8000, 4).unwrap().to_bytes().to_vec();
        bytes[8..12].copy_from_slice(b"AVI ");
        assert!(matches!(WavHeader::parse(&bytes), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_header_too_large_is_rejected() {
        let result = WavHeader::for_pcm16(2, 44100, u32::MAX);
        assert!(matches!(result, Err(Error::ClipTooLarge(_))));
    }

    #[test]
    fn test_header_rejects_overflowing_byte_rate() {
        let result = WavHeader::for_pcm16(2, 3_000_000_000, 1);
        assert!(matches!(result, Err(Error::InvalidBuffer(_))));

        let fits = WavHeader::for_pcm16(2, 1_000_000_000, 1).unwrap();
        assert_eq!(fits.byte_rate, 4_000_000_000);
    }

    #[test]
    fn test_decode_canonical_detects_truncation() {
        let buffer = PcmBuffer::silent(8000, 2, 10).unwrap();
        let clip = encode(&buffer).unwrap();
        let truncated = &clip.bytes()[..clip.bytes().len() - 2];
        assert!(matches!(decode_canonical(truncated), Err(Error::CorruptInput(_))));
    }
}
