//! Playback Session Manager
//!
//! Owns the single current playback session and drives it through
//! `Idle → Loading → Ready → Playing ⇄ Paused → Ended`, with `BlockedPending`
//! when the platform refuses to start audio and `Error` on failure.
//!
//! **Concurrency:**
//! - Every operation takes the `inner` mutex, so transitions are serialized
//! - Fetch + decode run outside the lock; a generation number and a
//!   cancellation token let a newer `play`/`stop` discard the stale result
//! - The backend voice is always released before a new one is started, so at
//!   most one voice is ever audible

use crate::audio::decoder::DecodeAdapter;
use crate::audio::types::PcmBuffer;
use crate::error::{Error, Result};
use crate::playback::backend::{BackendEvent, BackendEventSender, PlaybackBackend, StartError, VoiceId};
use crate::playback::capability::{AutoplayStrategy, CapabilityProbe, PlatformProbe};
use crate::playback::session::{transition_allowed, PlaybackSession};
use crate::store::ClipSource;
use clipdeck_common::events::{ClipDeckEvent, EventBus, SessionState};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct ActiveSession {
    session: PlaybackSession,
    generation: u64,
    clip: Option<Arc<PcmBuffer>>,
    voice_held: bool,
    pause_queued: bool,
    load_cancel: Option<CancellationToken>,
}

impl ActiveSession {
    fn voice(&self) -> VoiceId {
        VoiceId(self.session.session_id)
    }
}

struct Inner {
    generation: u64,
    current: Option<ActiveSession>,
}

/// Builder for `PlaybackSessionManager`
pub struct ManagerBuilder {
    backend: Arc<dyn PlaybackBackend>,
    source: Arc<dyn ClipSource>,
    decoder: DecodeAdapter,
    events: EventBus,
    strategy: Option<AutoplayStrategy>,
}

impl ManagerBuilder {
    pub fn decoder(mut self, decoder: DecodeAdapter) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Pick the autoplay strategy from a capability probe
    pub fn probe(mut self, probe: &dyn CapabilityProbe) -> Self {
        self.strategy = Some(AutoplayStrategy::select(probe));
        self
    }

    pub fn strategy(mut self, strategy: AutoplayStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Build the manager and spawn its backend event pump.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Arc<PlaybackSessionManager> {
        let strategy = self
            .strategy
            .unwrap_or_else(|| AutoplayStrategy::select(&PlatformProbe::detect()));
        let (backend_tx, backend_rx) = mpsc::unbounded_channel();

        let manager = Arc::new(PlaybackSessionManager {
            inner: Mutex::new(Inner {
                generation: 0,
                current: None,
            }),
            backend: self.backend,
            source: self.source,
            decoder: self.decoder,
            strategy,
            events: self.events,
            backend_tx,
        });

        tokio::spawn(pump_backend_events(Arc::downgrade(&manager), backend_rx));

        info!(
            "Playback session manager ready (backend: {}, autoplay strategy: {:?})",
            manager.backend.name(),
            strategy
        );
        manager
    }
}

async fn pump_backend_events(
    manager: Weak<PlaybackSessionManager>,
    mut rx: mpsc::UnboundedReceiver<BackendEvent>,
) {
    while let Some(event) = rx.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.handle_backend_event(event).await;
    }
    debug!("Backend event pump stopped");
}

/// The single owner of "what is sounding now"
pub struct PlaybackSessionManager {
    inner: Mutex<Inner>,
    backend: Arc<dyn PlaybackBackend>,
    source: Arc<dyn ClipSource>,
    decoder: DecodeAdapter,
    strategy: AutoplayStrategy,
    events: EventBus,
    backend_tx: BackendEventSender,
}

impl PlaybackSessionManager {
    pub fn builder(backend: Arc<dyn PlaybackBackend>, source: Arc<dyn ClipSource>) -> ManagerBuilder {
        ManagerBuilder {
            backend,
            source,
            decoder: DecodeAdapter::new(),
            events: EventBus::default(),
            strategy: None,
        }
    }

    pub fn autoplay_strategy(&self) -> AutoplayStrategy {
        self.strategy
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClipDeckEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the current (or most recent) session
    pub async fn current(&self) -> Option<PlaybackSession> {
        self.inner.lock().await.current.as_ref().map(|a| a.session.clone())
    }

    /// `Idle` when no session was ever started
    pub async fn state(&self) -> SessionState {
        self.inner
            .lock()
            .await
            .current
            .as_ref()
            .map(|a| a.session.state)
            .unwrap_or(SessionState::Idle)
    }

    /// Play `locator` as `clip_id`, replacing whatever is playing.
    ///
    /// Calling again with the same locator while the session waits for a user
    /// gesture retries the start without decoding again.
    ///
    /// Returns the session snapshot: `Playing`, `Paused` (pause queued while
    /// loading), `BlockedPending` (autoplay refused), or `Ended` when a newer
    /// `play`/`stop` superseded this one during loading.
    ///
    /// # Errors
    /// Fetch and decode errors, and `Playback` when the backend fails to
    /// start; the session is left in `Error`.
    pub async fn play(&self, clip_id: &str, locator: &str) -> Result<PlaybackSession> {
        let (generation, token, mut snapshot) = {
            let mut inner = self.inner.lock().await;

            if let Some(active) = inner.current.as_mut() {
                if active.session.source_locator == locator
                    && active.session.state.is_ready()
                    && active.clip.is_some()
                {
                    debug!("Retrying start of session {}", active.session.session_id);
                    self.start_voice(active)?;
                    return Ok(active.session.clone());
                }
            }

            self.terminate_current(&mut inner);

            inner.generation += 1;
            let generation = inner.generation;
            let token = CancellationToken::new();

            let mut active = ActiveSession {
                session: PlaybackSession::new(clip_id, locator),
                generation,
                clip: None,
                voice_held: false,
                pause_queued: false,
                load_cancel: Some(token.clone()),
            };
            self.transition(&mut active, SessionState::Loading);
            let snapshot = active.session.clone();
            inner.current = Some(active);

            (generation, token, snapshot)
        };

        let loaded = tokio::select! {
            _ = token.cancelled() => None,
            result = self.load(locator) => Some(result),
        };

        let mut inner = self.inner.lock().await;
        let active = match inner.current.as_mut() {
            Some(active)
                if active.generation == generation
                    && active.session.state == SessionState::Loading =>
            {
                active
            }
            _ => {
                debug!("Discarding superseded load of {}", locator);
                snapshot.state = SessionState::Ended;
                return Ok(snapshot);
            }
        };
        active.load_cancel = None;

        let Some(loaded) = loaded else {
            // Cancelled without a newer generation taking over
            snapshot.state = SessionState::Ended;
            return Ok(snapshot);
        };

        match loaded {
            Ok(clip) => {
                active.clip = Some(Arc::new(clip));
                self.transition(active, SessionState::Ready);
                self.start_voice(active)?;
                Ok(active.session.clone())
            }
            Err(e) => {
                self.fail(active, &e);
                Err(e)
            }
        }
    }

    /// `Playing → Paused`. During `Loading` the pause is queued; elsewhere a no-op.
    pub async fn pause(&self) -> Option<PlaybackSession> {
        let mut inner = self.inner.lock().await;
        let active = inner.current.as_mut()?;

        match active.session.state {
            SessionState::Loading => {
                debug!("Queueing pause for loading session {}", active.session.session_id);
                active.pause_queued = true;
            }
            SessionState::Playing => {
                self.backend.pause(active.voice());
                self.transition(active, SessionState::Paused);
            }
            _ => {}
        }

        Some(active.session.clone())
    }

    /// `Paused → Playing`. During `Loading` clears a queued pause; elsewhere a no-op.
    pub async fn resume(&self) -> Result<Option<PlaybackSession>> {
        let mut inner = self.inner.lock().await;
        let Some(active) = inner.current.as_mut() else {
            return Ok(None);
        };

        match active.session.state {
            SessionState::Loading => active.pause_queued = false,
            SessionState::Paused if active.voice_held => {
                self.backend.resume(active.voice());
                self.transition(active, SessionState::Playing);
            }
            SessionState::Paused => self.start_voice(active)?,
            _ => {}
        }

        Ok(Some(active.session.clone()))
    }

    /// Terminate the current session and release its resources
    pub async fn stop(&self) -> Option<PlaybackSession> {
        let mut inner = self.inner.lock().await;
        self.terminate_current(&mut inner);
        inner.current.as_ref().map(|a| a.session.clone())
    }

    /// Unlock audio from a user-gesture handler and retry a blocked session
    pub async fn prime_audio(&self) -> Result<Option<PlaybackSession>> {
        self.backend.prime();

        let mut inner = self.inner.lock().await;
        let Some(active) = inner.current.as_mut() else {
            return Ok(None);
        };

        if active.session.state == SessionState::BlockedPending {
            debug!("Audio primed; retrying blocked session {}", active.session.session_id);
            self.start_voice(active)?;
        }

        Ok(Some(active.session.clone()))
    }

    /// Stop everything on application shutdown
    pub async fn shutdown(&self) {
        if let Some(session) = self.stop().await {
            info!("Playback stopped for shutdown (last session {})", session.session_id);
        }
    }

    async fn load(&self, locator: &str) -> Result<PcmBuffer> {
        let source = self.source.fetch(locator).await?;
        self.decoder.decode(source).await
    }

    /// Start (or retry) the backend voice for a decoded session.
    ///
    /// A queued pause leaves the session `Paused` without a voice.
    fn start_voice(&self, active: &mut ActiveSession) -> Result<()> {
        let Some(clip) = active.clip.clone() else {
            return Err(Error::Internal("start requested before decode".to_string()));
        };

        if active.pause_queued {
            active.pause_queued = false;
            self.transition(active, SessionState::Paused);
            return Ok(());
        }

        let voice = active.voice();
        let first_attempt = active.session.state != SessionState::BlockedPending;

        let mut attempt = self.backend.start(voice, clip.clone(), self.backend_tx.clone());
        if attempt == Err(StartError::AutoplayBlocked)
            && first_attempt
            && self.strategy == AutoplayStrategy::ImmediateRetry
        {
            debug!("Autoplay blocked for {}; retrying once", voice);
            attempt = self.backend.start(voice, clip, self.backend_tx.clone());
        }

        match attempt {
            Ok(()) => {
                active.voice_held = true;
                self.transition(active, SessionState::Playing);
                Ok(())
            }
            Err(StartError::AutoplayBlocked) => {
                debug!(
                    "Autoplay blocked for session {}; waiting for user gesture",
                    active.session.session_id
                );
                if active.session.state != SessionState::BlockedPending {
                    self.transition(active, SessionState::BlockedPending);
                }
                self.events.emit_lossy(ClipDeckEvent::AutoplayBlocked {
                    session_id: active.session.session_id,
                    clip_id: active.session.clip_id.clone(),
                    timestamp: chrono::Utc::now(),
                });
                Ok(())
            }
            Err(StartError::Failed(message)) => {
                self.backend.release(voice);
                let e = Error::Playback(message);
                self.fail(active, &e);
                Err(e)
            }
        }
    }

    fn terminate_current(&self, inner: &mut Inner) {
        let Some(active) = inner.current.as_mut() else {
            return;
        };
        if active.session.state.is_terminal() {
            return;
        }

        if let Some(token) = active.load_cancel.take() {
            token.cancel();
        }
        if active.voice_held {
            self.backend.release(active.voice());
            active.voice_held = false;
        }
        active.clip = None;
        self.transition(active, SessionState::Ended);
    }

    fn fail(&self, active: &mut ActiveSession, e: &Error) {
        if active.voice_held {
            self.backend.release(active.voice());
            active.voice_held = false;
        }
        active.clip = None;

        error!("Playback session {} failed: {}", active.session.session_id, e);
        active.session.last_error = Some(e.to_string());
        self.transition(active, SessionState::Error);

        self.events.emit_lossy(ClipDeckEvent::PlaybackFailed {
            session_id: active.session.session_id,
            clip_id: active.session.clip_id.clone(),
            message: e.user_message(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn transition(&self, active: &mut ActiveSession, new_state: SessionState) {
        let old_state = active.session.state;
        if !transition_allowed(old_state, new_state) {
            warn!(
                "Ignoring illegal transition {} -> {} for session {}",
                old_state, new_state, active.session.session_id
            );
            return;
        }

        active.session.state = new_state;
        debug!(
            "Session {} ({}): {} -> {}",
            active.session.session_id, active.session.clip_id, old_state, new_state
        );

        self.events.emit_lossy(ClipDeckEvent::SessionStateChanged {
            session_id: active.session.session_id,
            clip_id: active.session.clip_id.clone(),
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    async fn handle_backend_event(&self, event: BackendEvent) {
        let mut inner = self.inner.lock().await;
        let Some(active) = inner.current.as_mut() else {
            return;
        };

        match event {
            BackendEvent::Ended(voice) if voice == active.voice() && active.voice_held => {
                self.backend.release(voice);
                active.voice_held = false;
                active.clip = None;
                self.transition(active, SessionState::Ended);
            }
            BackendEvent::Failed { voice, message }
                if voice == active.voice() && !active.session.state.is_terminal() =>
            {
                self.fail(active, &Error::Playback(message));
            }
            stale => debug!("Ignoring backend event for stale voice: {:?}", stale),
        }
    }
}

impl Drop for PlaybackSessionManager {
    fn drop(&mut self) {
        if let Some(active) = self.inner.get_mut().current.as_ref() {
            if active.voice_held {
                self.backend.release(active.voice());
            }
        }
    }
}
