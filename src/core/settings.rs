//! Persisted client connection settings
//!
//! Stored as a small JSON object, `{"ip": "...", "port": "..."}`. The port is
//! kept as text so whatever the user typed survives a save/load cycle; it is
//! validated only when a connection is attempted.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Error, Result, DEFAULT_PORT};

/// Default settings file name, relative to the working directory
pub const SETTINGS_FILE: &str = "client_settings.json";

/// Last used server address and port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: String,
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            ip: default_ip(),
            port: default_port(),
        }
    }
}

impl ClientSettings {
    /// Loads settings, falling back to defaults if the file is missing or unreadable
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("using default settings, {}: {}", path.display(), e);
                ClientSettings::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("Invalid settings file: {}", e)))
    }

    /// Writes settings, replacing any existing file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string(self)
            .map_err(|e| Error::config(format!("Failed to encode settings: {}", e)))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// The stored port as a number
    pub fn port(&self) -> Result<u16> {
        self.port
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("Invalid port: {:?}", self.port)))
    }
}
