//! Client configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Configuration for the chat client core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the engagement platform REST API.
    pub api_base_url: String,
    /// Websocket URL of the realtime service.
    pub realtime_url: String,
    /// Directory holding the persisted session record (`user.json`, `token`).
    pub session_dir: PathBuf,
    /// Per-request timeout in seconds, applied at the HTTP client level.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let session_dir = dirs::data_dir()
            .map(|p| p.join("meridian").join("session"))
            .unwrap_or_else(|| PathBuf::from(".meridian/session"));
        Self {
            api_base_url: "https://api.meridianaudit.app".to_string(),
            realtime_url: "wss://realtime.meridianaudit.app/socket".to_string(),
            session_dir,
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Load configuration: coded defaults, overlaid by an optional TOML
    /// file, overlaid by `MERIDIAN_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&ClientConfig::default())
                .map_err(|e| ChatError::Config(format!("Defaults: {}", e)))?,
        );

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder
            .add_source(config::Environment::with_prefix("MERIDIAN").try_parsing(true))
            .build()
            .map_err(|e| ChatError::Config(format!("Load: {}", e)))?
            .try_deserialize()
            .map_err(|e| ChatError::Config(format!("Parse: {}", e)))
    }
}
