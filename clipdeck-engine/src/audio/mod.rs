//! Audio processing: decode, trim, encode, resample, and device output

pub mod decoder;
#[cfg(feature = "device-output")]
pub mod output;
pub mod resampler;
pub mod trim;
pub mod types;
pub mod wav;

pub use decoder::{ByteSource, DecodeAdapter};
#[cfg(feature = "device-output")]
pub use output::DeviceBackend;
pub use resampler::Resampler;
pub use trim::trim;
pub use types::{EncodedClip, FrameRange, PcmBuffer, TrimRange};
