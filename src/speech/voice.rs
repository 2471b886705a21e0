//! Voice and engine records reported by the native layer

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named voice configuration usable by an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub name: String,

    /// BCP 47 language tag
    #[serde(default)]
    pub lang: String,

    #[serde(default, rename = "voiceURI", skip_serializing_if = "Option::is_none")]
    pub voice_uri: Option<String>,

    /// The platform's default voice for its language
    #[serde(default)]
    pub default: bool,

    #[serde(default)]
    pub local_service: bool,

    /// Native fields this crate does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
            voice_uri: None,
            default: false,
            local_service: true,
            extra: Map::new(),
        }
    }
}

/// A selectable text-to-speech engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engine {
    pub name: String,

    /// Human-readable label, when the platform has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Engine {
    pub fn new(name: impl Into<String>, label: Option<String>) -> Self {
        Self {
            name: name.into(),
            label,
            extra: Map::new(),
        }
    }
}
