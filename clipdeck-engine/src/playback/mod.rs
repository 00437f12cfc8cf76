//! Playback sessions, backends, and platform capability detection

pub mod backend;
pub mod capability;
pub mod manager;
pub mod session;

pub use backend::{BackendEvent, ClockBackend, PlaybackBackend, StartError, VoiceId};
pub use capability::{AutoplayStrategy, CapabilityProbe, PlatformClass, PlatformProbe, StaticProbe};
pub use manager::{ManagerBuilder, PlaybackSessionManager};
pub use session::PlaybackSession;
