//! Local session state: the persisted sign-in record and bearer token.
//!
//! The desktop shell writes `user.json` and `token` into the session
//! directory at sign-in; this core only reads them. Every read fails soft:
//! a missing or malformed record reads as signed-out, never as an error.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Read-only view of the locally persisted session.
pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    /// Session directory under the platform data dir.
    pub fn open_default() -> Self {
        let base_dir = dirs::data_dir()
            .map(|p| p.join("meridian").join("session"))
            .unwrap_or_else(|| PathBuf::from(".meridian/session"));
        Self::new(&base_dir)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Durable identifier of the signed-in user, or `None` when no usable
    /// session record exists.
    pub fn current_user_id(&self) -> Option<String> {
        let raw = fs::read_to_string(self.base_dir.join("user.json")).ok()?;
        let user: serde_json::Value = serde_json::from_str(&raw).ok()?;
        let id = user.get("id")?.as_str()?;
        Some(canonical_user_id(id))
    }

    /// Bearer credential for the API and the realtime service.
    pub fn bearer_token(&self) -> Option<String> {
        let token = fs::read_to_string(self.base_dir.join("token")).ok()?;
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }
}

/// Pre-migration accounts stored their identifier base64-encoded. A value
/// that already parses as a UUID passes through unchanged; otherwise one
/// decode attempt is made, falling back to the raw value.
pub fn canonical_user_id(raw: &str) -> String {
    if uuid::Uuid::try_parse(raw).is_ok() {
        return raw.to_string();
    }
    match BASE64.decode(raw) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}
