//! Configuration management

use crate::{BridgeError, Result};
use ini::Ini;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Service name the native side registers the speech plugin under
pub const DEFAULT_SERVICE: &str = "SpeechSynthesis";

/// Client configuration
///
/// Holds the bridge service name, an optional engine to switch to after
/// startup, and defaults applied to utterances that leave them unset.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path (~/.synthbridge.cfg), `None` for in-memory configs
    path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ini: Self::default_config(),
            path: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path, creating it if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(path)
                .map_err(|e| BridgeError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(path)
                .map_err(|e| BridgeError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self {
            ini,
            path: Some(path.to_path_buf()),
        })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| BridgeError::Config("In-memory config has no path".to_string()))?;
        debug!("Saving config to {:?}", path);
        self.ini
            .write_to_file(path)
            .map_err(|e| BridgeError::Config(format!("Failed to save config: {}", e)))
    }

    fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| BridgeError::Config("Could not find home directory".to_string()))?;
        Ok(home.join(".synthbridge.cfg"))
    }

    /// Expose the config file path for display
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("bridge"))
            .set("service", DEFAULT_SERVICE)
            .set("preferred_engine", "");

        ini.with_section(Some("utterance"))
            .set("lang", "")
            .set("rate", "")
            .set("pitch", "")
            .set("volume", "");

        ini
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    fn get_non_empty(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get_from(Some(section), key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn get_float(&self, section: &str, key: &str) -> Option<f32> {
        self.get_non_empty(section, key)
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|v| v.is_finite())
    }

    /// Service name used for every request sent over the bridge
    pub fn service(&self) -> String {
        self.get_non_empty("bridge", "service")
            .unwrap_or_else(|| DEFAULT_SERVICE.to_string())
    }

    /// Engine to switch to once the startup reply has arrived
    pub fn preferred_engine(&self) -> Option<String> {
        self.get_non_empty("bridge", "preferred_engine")
    }

    /// Default BCP 47 language tag for utterances
    pub fn lang(&self) -> Option<String> {
        self.get_non_empty("utterance", "lang")
    }

    /// Default speaking rate (1.0 is normal, 0.1-10.0)
    pub fn rate(&self) -> Option<f32> {
        self.get_float("utterance", "rate")
            .filter(|r| (0.1..=10.0).contains(r))
    }

    /// Default pitch (1.0 is normal, 0.0-2.0)
    pub fn pitch(&self) -> Option<f32> {
        self.get_float("utterance", "pitch")
            .filter(|p| (0.0..=2.0).contains(p))
    }

    /// Default volume (0.0-1.0)
    pub fn volume(&self) -> Option<f32> {
        self.get_float("utterance", "volume")
            .filter(|v| (0.0..=1.0).contains(v))
    }
}
