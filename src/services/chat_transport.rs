//! REST access to rooms, message history, sends, and uploads.
//!
//! Sends are dual-path: a primary low-latency [`DirectWrite`] strategy is
//! tried first, and any primary failure falls back to the plain REST
//! endpoint with the same payload. Callers see an error only when both
//! paths fail.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::chat_types::{ChatRoom, OutgoingMessage, RawMessageRecord, RoomContext, RoomSummary};
use super::config::ClientConfig;
use crate::error::{ChatError, Result};
use crate::identity::SessionStore;

/// Primary low-latency write path evaluated before the REST fallback.
#[async_trait]
pub trait DirectWrite: Send + Sync {
    async fn insert_message(
        &self,
        room_id: &str,
        message: &OutgoingMessage,
    ) -> Result<RawMessageRecord>;
}

/// Standard `{ data: ... }` response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct UploadPayload {
    url: Option<String>,
    #[serde(rename = "fileUrl")]
    file_url: Option<String>,
}

/// Chat operations against the engagement platform API.
pub struct ChatTransport {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
    direct: Option<Arc<dyn DirectWrite>>,
}

impl ChatTransport {
    pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self> {
        let base = url::Url::parse(&config.api_base_url)
            .map_err(|e| ChatError::Config(format!("API base URL: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ChatError::Transport(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            session,
            direct: None,
        })
    }

    /// Attach the primary send path.
    pub fn with_direct_write(mut self, direct: Arc<dyn DirectWrite>) -> Self {
        self.direct = Some(direct);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Resolve the room bound to an engagement.
    pub async fn room_for_engagement(&self, engagement_id: &str) -> Result<RoomSummary> {
        let url = self.url(&format!("engagements/{}/chat-room", engagement_id));
        let resp = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| ChatError::RoomResolution(format!("Engagement {}: {}", engagement_id, e)))?;

        if !resp.status().is_success() {
            return Err(ChatError::RoomResolution(format!(
                "Engagement {}: HTTP {}",
                engagement_id,
                resp.status()
            )));
        }

        let envelope: Envelope<RoomSummary> = resp
            .json()
            .await
            .map_err(|e| ChatError::RoomResolution(format!("Parse room: {}", e)))?;
        Ok(envelope.data)
    }

    /// Fetch full room details, including members.
    pub async fn room_by_id(&self, room_id: &str) -> Result<ChatRoom> {
        let url = self.url(&format!("chat/rooms/{}", room_id));
        let resp = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("Fetch room {}: {}", room_id, e)))?;

        if !resp.status().is_success() {
            return Err(ChatError::Transport(format!(
                "Fetch room {}: HTTP {}",
                room_id,
                resp.status()
            )));
        }

        let envelope: Envelope<ChatRoom> = resp
            .json()
            .await
            .map_err(|e| ChatError::Transport(format!("Parse room: {}", e)))?;
        Ok(envelope.data)
    }

    /// List the rooms visible to the current user.
    pub async fn rooms(&self) -> Result<Vec<RoomSummary>> {
        let url = self.url("chat/rooms");
        let resp = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("List rooms: {}", e)))?;

        if !resp.status().is_success() {
            return Err(ChatError::Transport(format!(
                "List rooms: HTTP {}",
                resp.status()
            )));
        }

        let envelope: Envelope<Vec<RoomSummary>> = resp
            .json()
            .await
            .map_err(|e| ChatError::Transport(format!("Parse rooms: {}", e)))?;
        Ok(envelope.data)
    }

    /// Create (or re-resolve) a direct room with a partner.
    ///
    /// Member IDs are sorted before send so both initiation directions map
    /// to the same room identity on the backend.
    pub async fn create_direct_room(
        &self,
        partner_id: &str,
        title: Option<&str>,
    ) -> Result<ChatRoom> {
        let me = self
            .session
            .current_user_id()
            .ok_or(ChatError::Unauthenticated)?;

        let mut member_ids = vec![me, partner_id.to_string()];
        member_ids.sort();

        let body = serde_json::json!({
            "title": title.unwrap_or("Direct chat"),
            "contextType": RoomContext::Direct,
            "memberIds": member_ids,
        });

        let url = self.url("chat/rooms");
        let resp = self
            .authorize(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("Create room: {}", e)))?;

        if !resp.status().is_success() {
            return Err(ChatError::Transport(format!(
                "Create room: HTTP {}",
                resp.status()
            )));
        }

        let envelope: Envelope<ChatRoom> = resp
            .json()
            .await
            .map_err(|e| ChatError::Transport(format!("Parse room: {}", e)))?;
        Ok(envelope.data)
    }

    /// Add members to an existing room.
    pub async fn add_members(&self, room_id: &str, user_ids: &[String]) -> Result<()> {
        let url = self.url(&format!("chat/rooms/{}/members", room_id));
        let resp = self
            .authorize(self.http.post(&url))
            .json(&serde_json::json!({ "userIds": user_ids }))
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("Add members: {}", e)))?;

        if !resp.status().is_success() {
            return Err(ChatError::Transport(format!(
                "Add members: HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Initial history page for a room, raw off the wire.
    pub async fn messages(&self, room_id: &str) -> Result<Vec<RawMessageRecord>> {
        let url = self.url(&format!("chat/rooms/{}/messages", room_id));
        let resp = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("Fetch history: {}", e)))?;

        if !resp.status().is_success() {
            return Err(ChatError::Transport(format!(
                "Fetch history: HTTP {}",
                resp.status()
            )));
        }

        let envelope: Envelope<Vec<RawMessageRecord>> = resp
            .json()
            .await
            .map_err(|e| ChatError::Transport(format!("Parse history: {}", e)))?;
        Ok(envelope.data)
    }

    /// Send a message: primary direct write first, REST fallback on any
    /// primary failure. Both paths carry the same payload and return the
    /// same record shape.
    pub async fn send_message(
        &self,
        room_id: &str,
        message: &OutgoingMessage,
    ) -> Result<RawMessageRecord> {
        if let Some(direct) = &self.direct {
            match direct.insert_message(room_id, message).await {
                Ok(record) => return Ok(record),
                Err(e) => {
                    log::warn!("Direct send failed, falling back to REST: {}", e);
                }
            }
        }
        self.send_message_rest(room_id, message).await
    }

    async fn send_message_rest(
        &self,
        room_id: &str,
        message: &OutgoingMessage,
    ) -> Result<RawMessageRecord> {
        let url = self.url(&format!("chat/rooms/{}/messages", room_id));
        let resp = self
            .authorize(self.http.post(&url))
            .json(message)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("Send message: {}", e)))?;

        if !resp.status().is_success() {
            return Err(ChatError::Transport(format!(
                "Send message: HTTP {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| ChatError::Transport(format!("Parse sent message: {}", e)))
    }

    /// Upload a file and return its URL. The response carries the URL under
    /// `url` or `fileUrl` depending on backend version; `url` wins.
    pub async fn upload_file(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ChatError::Upload(format!("Read {}: {}", path.display(), e)))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.as_ref())
            .map_err(|e| ChatError::Upload(format!("Mime: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = self.url("chat/upload");
        let resp = self
            .authorize(self.http.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChatError::Upload(format!("Upload: {}", e)))?;

        if !resp.status().is_success() {
            return Err(ChatError::Upload(format!("Upload: HTTP {}", resp.status())));
        }

        let envelope: Envelope<UploadPayload> = resp
            .json()
            .await
            .map_err(|e| ChatError::Upload(format!("Parse upload response: {}", e)))?;

        envelope
            .data
            .url
            .or(envelope.data.file_url)
            .ok_or_else(|| ChatError::Upload("Upload response carried no URL".to_string()))
    }

    /// Mark messages as read up to `up_to_message_id`.
    ///
    /// Deliberate no-op: the backend has no read-receipt endpoint yet. The
    /// intended contract is idempotent mark-as-read up to the given ID.
    pub async fn mark_as_read(&self, room_id: &str, up_to_message_id: Option<&str>) -> Result<()> {
        log::debug!(
            "mark_as_read({}, {:?}) skipped: read receipts not wired on the backend",
            room_id,
            up_to_message_id
        );
        Ok(())
    }
}
