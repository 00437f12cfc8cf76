//! # clipdeck engine
//!
//! Turns short audio/video source files into trimmed, loop-ready WAV clips and
//! replays them on demand.
//!
//! **Architecture:**
//! - `audio`: symphonia decode adapter, sample-accurate trim, 16-bit WAV
//!   encoder, rubato resampler, cpal device output (feature `device-output`)
//! - `playback`: session state machine with autoplay handling
//! - `store`: SQLite + blob folder persistence and a cached catalog
//! - `pipeline`: decode → trim → encode → save

pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod store;

pub use error::{Error, Result};
pub use pipeline::ClipPipeline;
pub use playback::PlaybackSessionManager;
