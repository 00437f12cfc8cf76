//! Playback backends
//!
//! A backend turns a decoded clip into sound. The session manager owns at most
//! one voice at a time and always releases it before starting another, so
//! backends only need to honor `release` promptly and never leave a voice
//! behind after a failed `start`.

use crate::audio::types::PcmBuffer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// One backend playback resource, identified by the owning session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub Uuid);

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "voice-{}", self.0)
    }
}

/// Why a backend refused to start a voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    /// Platform autoplay policy requires a user gesture first
    AutoplayBlocked,
    /// Any other failure; the backend holds no resource for the voice
    Failed(String),
}

/// Asynchronous notifications from a running voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The voice played through its last frame
    Ended(VoiceId),
    /// The underlying stream or device failed mid-playback
    Failed { voice: VoiceId, message: String },
}

pub type BackendEventSender = mpsc::UnboundedSender<BackendEvent>;

/// Output side of the playback session manager
pub trait PlaybackBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Unlock audio output from within a user-gesture handler
    fn prime(&self);

    /// Begin playing `clip` as `voice`, reporting end/failure on `events`
    fn start(
        &self,
        voice: VoiceId,
        clip: Arc<PcmBuffer>,
        events: BackendEventSender,
    ) -> Result<(), StartError>;

    fn pause(&self, voice: VoiceId);

    fn resume(&self, voice: VoiceId);

    /// Stop and free the voice. Unknown or already released voices are ignored.
    fn release(&self, voice: VoiceId);
}

struct ClockVoice {
    paused_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Headless backend that "plays" a clip by waiting out its duration on the
/// tokio clock.
///
/// Used by the CLI when no audio device is compiled in, and by tests with a
/// paused runtime clock. `with_autoplay_lock` makes every `start` fail with
/// `AutoplayBlocked` until `prime` is called, like a constrained platform.
pub struct ClockBackend {
    voices: Mutex<HashMap<VoiceId, ClockVoice>>,
    locked: AtomicBool,
}

impl ClockBackend {
    pub fn new() -> Self {
        Self {
            voices: Mutex::new(HashMap::new()),
            locked: AtomicBool::new(false),
        }
    }

    pub fn with_autoplay_lock() -> Self {
        Self {
            voices: Mutex::new(HashMap::new()),
            locked: AtomicBool::new(true),
        }
    }

    /// Voices currently started and not paused
    pub fn audible_voices(&self) -> usize {
        self.lock_voices()
            .values()
            .filter(|v| !*v.paused_tx.borrow() && !v.task.is_finished())
            .count()
    }

    /// Voices held, audible or not
    pub fn held_voices(&self) -> usize {
        self.lock_voices().len()
    }

    fn lock_voices(&self) -> std::sync::MutexGuard<'_, HashMap<VoiceId, ClockVoice>> {
        // A poisoned map still holds valid handles
        self.voices.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ClockBackend {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_clock_voice(
    voice: VoiceId,
    duration: Duration,
    mut paused_rx: watch::Receiver<bool>,
    events: BackendEventSender,
) {
    let mut remaining = duration;

    loop {
        if *paused_rx.borrow_and_update() {
            if paused_rx.changed().await.is_err() {
                return;
            }
            continue;
        }

        let started = tokio::time::Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(remaining) => {
                trace!("{} reached end of clip", voice);
                let _ = events.send(BackendEvent::Ended(voice));
                return;
            }
            changed = paused_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                remaining = remaining.saturating_sub(started.elapsed());
            }
        }
    }
}

impl PlaybackBackend for ClockBackend {
    fn name(&self) -> &'static str {
        "clock"
    }

    fn prime(&self) {
        if self.locked.swap(false, Ordering::SeqCst) {
            debug!("Clock backend unlocked by user gesture");
        }
    }

    fn start(
        &self,
        voice: VoiceId,
        clip: Arc<PcmBuffer>,
        events: BackendEventSender,
    ) -> Result<(), StartError> {
        if self.locked.load(Ordering::SeqCst) {
            return Err(StartError::AutoplayBlocked);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StartError::Failed(format!("No async runtime: {}", e)))?;

        let duration = Duration::from_secs_f64(clip.duration_seconds());
        let (paused_tx, paused_rx) = watch::channel(false);
        let task = runtime.spawn(run_clock_voice(voice, duration, paused_rx, events));

        if let Some(previous) = self.lock_voices().insert(voice, ClockVoice { paused_tx, task }) {
            warn!("{} started twice; replacing previous voice", voice);
            previous.task.abort();
        }

        debug!("{} started ({:.3}s)", voice, duration.as_secs_f64());
        Ok(())
    }

    fn pause(&self, voice: VoiceId) {
        if let Some(v) = self.lock_voices().get(&voice) {
            let _ = v.paused_tx.send(true);
        }
    }

    fn resume(&self, voice: VoiceId) {
        if let Some(v) = self.lock_voices().get(&voice) {
            let _ = v.paused_tx.send(false);
        }
    }

    fn release(&self, voice: VoiceId) {
        if let Some(v) = self.lock_voices().remove(&voice) {
            v.task.abort();
            trace!("{} released", voice);
        }
    }
}
