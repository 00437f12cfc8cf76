//! Shared fixtures for clipdeck-engine integration tests
//!
//! - `MockBackend`: scripted playback backend that tracks audible voices
//! - `CountingSource`: in-memory clip source that counts fetches
//! - WAV fixture builders (hound)

#![allow(dead_code)]

use async_trait::async_trait;
use clipdeck_engine::audio::{ByteSource, PcmBuffer};
use clipdeck_engine::playback::backend::BackendEventSender;
use clipdeck_engine::playback::{BackendEvent, PlaybackBackend, StartError, VoiceId};
use clipdeck_engine::store::ClipSource;
use clipdeck_engine::{Error, Result};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// WAV fixtures
// ============================================================================

/// 16-bit PCM WAV written by hound; `sample(channel, frame)` gives each value
pub fn wav_bytes_i16(
    sample_rate: u32,
    channels: u16,
    frames: u32,
    sample: impl Fn(u16, u32) -> i16,
) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for frame in 0..frames {
            for ch in 0..channels {
                writer.write_sample(sample(ch, frame)).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// 32-bit float WAV written by hound
pub fn wav_bytes_f32(sample_rate: u32, channels: u16, samples: &[Vec<f32>]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let frames = samples[0].len();
        for frame in 0..frames {
            for ch in samples {
                writer.write_sample(ch[frame]).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Deterministic pseudo-random 16-bit sample (xorshift on channel/frame)
pub fn noise_sample(channel: u16, frame: u32) -> i16 {
    let mut x = (frame as u64) << 8 | channel as u64 | 0x9E37_79B9_0000_0000;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    (x & 0xFFFF) as u16 as i16
}

/// One second of a 440 Hz sine at half scale
pub fn sine_wav(sample_rate: u32, channels: u16, seconds: f32) -> Vec<u8> {
    let frames = (sample_rate as f32 * seconds) as u32;
    wav_bytes_i16(sample_rate, channels, frames, |_, f| {
        let t = f as f32 / sample_rate as f32;
        ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 16384.0) as i16
    })
}

/// Ramp buffer whose sample values identify (channel, frame)
pub fn ramp_buffer(sample_rate: u32, channels: usize, frames: usize) -> PcmBuffer {
    let data = (0..channels)
        .map(|ch| {
            (0..frames)
                .map(|f| ((ch * frames + f) % 65536) as f32 / 65536.0 - 0.5)
                .collect()
        })
        .collect();
    PcmBuffer::new(sample_rate, data).unwrap()
}

/// Reader that sleeps before every small read and records when it is dropped
pub struct SlowReader {
    inner: Cursor<Vec<u8>>,
    delay: Duration,
    dropped: Arc<AtomicBool>,
}

impl SlowReader {
    pub fn new(bytes: Vec<u8>, delay: Duration) -> (Self, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner: Cursor::new(bytes),
                delay,
                dropped: Arc::clone(&dropped),
            },
            dropped,
        )
    }
}

impl Read for SlowReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        std::thread::sleep(self.delay);
        let n = buf.len().min(256);
        self.inner.read(&mut buf[..n])
    }
}

impl Drop for SlowReader {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Mock playback backend
// ============================================================================

#[derive(Default)]
struct MockState {
    /// voice -> paused
    voices: HashMap<VoiceId, bool>,
    senders: HashMap<VoiceId, BackendEventSender>,
    blocked_starts_remaining: usize,
    locked_until_primed: bool,
    fail_next_start: Option<String>,
    start_attempts: usize,
    primes: usize,
    max_audible: usize,
}

impl MockState {
    fn audible(&self) -> usize {
        self.voices.values().filter(|paused| !**paused).count()
    }

    fn record_audible(&mut self) {
        self.max_audible = self.max_audible.max(self.audible());
    }
}

/// Scripted backend: voices never end on their own; tests call `finish`
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse the next `n` starts with `AutoplayBlocked`
    pub fn block_next_starts(&self, n: usize) {
        self.state.lock().unwrap().blocked_starts_remaining = n;
    }

    /// Refuse every start until `prime` is called
    pub fn lock_until_primed(&self) {
        self.state.lock().unwrap().locked_until_primed = true;
    }

    pub fn fail_next_start(&self, message: &str) {
        self.state.lock().unwrap().fail_next_start = Some(message.to_string());
    }

    pub fn audible_voices(&self) -> usize {
        self.state.lock().unwrap().audible()
    }

    pub fn held_voices(&self) -> usize {
        self.state.lock().unwrap().voices.len()
    }

    pub fn max_concurrent_audible(&self) -> usize {
        self.state.lock().unwrap().max_audible
    }

    pub fn start_attempts(&self) -> usize {
        self.state.lock().unwrap().start_attempts
    }

    pub fn primes(&self) -> usize {
        self.state.lock().unwrap().primes
    }

    pub fn only_voice(&self) -> Option<VoiceId> {
        let state = self.state.lock().unwrap();
        if state.voices.len() == 1 {
            state.voices.keys().next().copied()
        } else {
            None
        }
    }

    /// Simulate natural end of stream for `voice`
    pub fn finish(&self, voice: VoiceId) {
        let state = self.state.lock().unwrap();
        if let Some(tx) = state.senders.get(&voice) {
            tx.send(BackendEvent::Ended(voice)).unwrap();
        }
    }

    /// Simulate a device/stream failure for `voice`
    pub fn fail_stream(&self, voice: VoiceId, message: &str) {
        let state = self.state.lock().unwrap();
        if let Some(tx) = state.senders.get(&voice) {
            tx.send(BackendEvent::Failed {
                voice,
                message: message.to_string(),
            })
            .unwrap();
        }
    }
}

impl PlaybackBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn prime(&self) {
        let mut state = self.state.lock().unwrap();
        state.primes += 1;
        state.locked_until_primed = false;
    }

    fn start(
        &self,
        voice: VoiceId,
        _clip: Arc<PcmBuffer>,
        events: BackendEventSender,
    ) -> std::result::Result<(), StartError> {
        let mut state = self.state.lock().unwrap();
        state.start_attempts += 1;

        if state.locked_until_primed {
            return Err(StartError::AutoplayBlocked);
        }
        if state.blocked_starts_remaining > 0 {
            state.blocked_starts_remaining -= 1;
            return Err(StartError::AutoplayBlocked);
        }
        if let Some(message) = state.fail_next_start.take() {
            return Err(StartError::Failed(message));
        }

        state.voices.insert(voice, false);
        state.senders.insert(voice, events);
        state.record_audible();
        Ok(())
    }

    fn pause(&self, voice: VoiceId) {
        if let Some(paused) = self.state.lock().unwrap().voices.get_mut(&voice) {
            *paused = true;
        }
    }

    fn resume(&self, voice: VoiceId) {
        let mut state = self.state.lock().unwrap();
        if let Some(paused) = state.voices.get_mut(&voice) {
            *paused = false;
        }
        state.record_audible();
    }

    fn release(&self, voice: VoiceId) {
        let mut state = self.state.lock().unwrap();
        state.voices.remove(&voice);
        state.senders.remove(&voice);
    }
}

// ============================================================================
// Clip sources
// ============================================================================

/// In-memory clip source with per-locator delays and fetch counting
#[derive(Default)]
pub struct CountingSource {
    clips: Mutex<HashMap<String, (Vec<u8>, Duration)>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl CountingSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, locator: &str, bytes: Vec<u8>) {
        self.insert_delayed(locator, bytes, Duration::ZERO);
    }

    /// Fetching `locator` takes `delay` before returning
    pub fn insert_delayed(&self, locator: &str, bytes: Vec<u8>, delay: Duration) {
        self.clips
            .lock()
            .unwrap()
            .insert(locator.to_string(), (bytes, delay));
    }

    pub fn fetches(&self, locator: &str) -> usize {
        self.fetches.lock().unwrap().get(locator).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ClipSource for CountingSource {
    async fn fetch(&self, locator: &str) -> Result<ByteSource> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(locator.to_string())
            .or_insert(0) += 1;

        let entry = self.clips.lock().unwrap().get(locator).cloned();
        let (bytes, delay) = entry.ok_or_else(|| Error::NotFound(locator.to_string()))?;

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(ByteSource::Memory {
            bytes,
            hint: Some("wav".to_string()),
        })
    }
}
