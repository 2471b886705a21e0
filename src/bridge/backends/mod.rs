//! Platform-specific bridge backends

// Platform TTS through the tts crate (cross-platform)
pub mod native;

pub use native::TtsBridge;
