//! Playback session snapshot and its transition table

use chrono::{DateTime, Utc};
use clipdeck_common::events::SessionState;
use serde::Serialize;
use uuid::Uuid;

/// Point-in-time view of one playback session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSession {
    pub session_id: Uuid,
    pub clip_id: String,
    pub state: SessionState,
    pub source_locator: String,
    pub started_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl PlaybackSession {
    pub(crate) fn new(clip_id: &str, source_locator: &str) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            clip_id: clip_id.to_string(),
            state: SessionState::Idle,
            source_locator: source_locator.to_string(),
            started_at: Utc::now(),
            last_error: None,
        }
    }
}

/// Whether the session state machine permits `from -> to`.
///
/// `Paused` is reachable from `Ready` when a pause was queued during loading;
/// such a session has no voice yet and may still hit the autoplay block on
/// resume.
pub fn transition_allowed(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;

    match (from, to) {
        (Idle, Loading) => true,
        (Loading, Ready) | (Loading, Error) => true,
        (Ready, Playing) | (Ready, Paused) | (Ready, BlockedPending) | (Ready, Error) => true,
        (BlockedPending, Playing) | (BlockedPending, Error) => true,
        (Playing, Paused) | (Playing, Error) => true,
        (Paused, Playing) | (Paused, BlockedPending) | (Paused, Error) => true,
        (from, Ended) => !from.is_terminal(),
        _ => false,
    }
}
