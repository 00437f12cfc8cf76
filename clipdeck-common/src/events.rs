//! Event types for the clipdeck event system
//!
//! Provides the shared event enum and an `EventBus` built on
//! `tokio::sync::broadcast`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Playback session state
///
/// `Idle → Loading → Ready → Playing ⇄ Paused → Ended`, with `BlockedPending`
/// as a sub-state of `Ready` and `Error` reachable from `Loading`, `Ready`
/// and `Playing`. `Ended` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Loading,
    Ready,
    /// Decoded and ready, waiting for a user gesture to lift the autoplay block
    BlockedPending,
    Playing,
    Paused,
    Ended,
    Error,
}

impl SessionState {
    /// `Ended` and `Error` end a session; a new `play` creates a fresh one
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended | SessionState::Error)
    }

    /// `Ready` or its `BlockedPending` sub-state
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::BlockedPending)
    }

    /// Whether a backend voice may be producing sound in this state
    pub fn is_audible(&self) -> bool {
        matches!(self, SessionState::Playing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::Ready => "ready",
            SessionState::BlockedPending => "blocked_pending",
            SessionState::Playing => "playing",
            SessionState::Paused => "paused",
            SessionState::Ended => "ended",
            SessionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// clipdeck event types
///
/// Broadcast via `EventBus`; serializable so a host UI can forward them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClipDeckEvent {
    /// A playback session changed state
    SessionStateChanged {
        session_id: Uuid,
        clip_id: String,
        old_state: SessionState,
        new_state: SessionState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback start was refused by the platform autoplay policy.
    ///
    /// Expected on constrained platforms; the host should prompt for a gesture.
    AutoplayBlocked {
        session_id: Uuid,
        clip_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A session failed; `message` is suitable for display
    PlaybackFailed {
        session_id: Uuid,
        clip_id: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The sound catalog cache was reloaded from the store
    CatalogRefreshed {
        count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ClipDeckEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            ClipDeckEvent::SessionStateChanged { .. } => "SessionStateChanged",
            ClipDeckEvent::AutoplayBlocked { .. } => "AutoplayBlocked",
            ClipDeckEvent::PlaybackFailed { .. } => "PlaybackFailed",
            ClipDeckEvent::CatalogRefreshed { .. } => "CatalogRefreshed",
        }
    }
}

/// Central event distribution bus
///
/// Non-blocking publish; slow subscribers observe `Lagged` instead of
/// blocking producers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClipDeckEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ClipDeckEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ClipDeckEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for event");
        }
    }

    /// Channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
