//! # clipdeck Common Library
//!
//! Shared code for the clipdeck crates:
//! - Error type
//! - Sound catalog models (`SoundRecord`, `MimeType`)
//! - Event types (`ClipDeckEvent`) and the broadcast `EventBus`
//! - Configuration file and root folder resolution

pub mod config;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use models::{MimeType, SoundRecord};
