//! Error types for synthbridge

use thiserror::Error;

/// Main error type for synthbridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Native bridge error in {action}: {message}")]
    Native { action: String, message: String },

    #[error("Command not supported by this bridge: {0}")]
    Unsupported(String),

    #[error("Bridge is not attached")]
    Detached,

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Failure reported by the native layer for a given action
    pub fn native(action: &str, message: impl Into<String>) -> Self {
        BridgeError::Native {
            action: action.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for synthbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
