//! HTTP surface for the caption-to-speech service: image upload, audio
//! retrieval, and server-sent event log streaming.

pub mod app;
pub mod config;
pub mod error;
pub mod logs;
pub mod templates;
pub mod validation;

pub use app::{router, AppState, Captioner, SpeechSynth};
pub use config::ServerConfig;
pub use logs::{Consumed, LogBroadcaster};
