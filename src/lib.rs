//! synthbridge - speech synthesis over the platform TTS service
//!
//! Exposes the device's text-to-speech engine to application code through a
//! client shaped like the browser speech-synthesis API. The client talks to
//! the native layer only through the asynchronous command protocol in
//! [`bridge`].

pub mod bridge;
pub mod config;
pub mod error;
pub mod speech;

pub use error::{BridgeError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "synthbridge";
