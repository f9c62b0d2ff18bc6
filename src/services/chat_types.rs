use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Wire protocol types ────────────────────────────────────────

/// Room context classification. Wire values are upper-case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomContext {
    Direct,
    Engagement,
}

/// Message body classification. In-memory values are lower-case; the wire
/// contract uses upper-case (`TEXT`, `IMAGE`, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Document,
    Gif,
}

impl MessageKind {
    /// Parse a wire `type` value. Unknown or missing values read as text.
    pub fn from_wire(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "image" => MessageKind::Image,
            "document" => MessageKind::Document,
            "gif" => MessageKind::Gif,
            _ => MessageKind::Text,
        }
    }

    /// Upper-case value expected by the backend.
    pub fn wire_value(&self) -> &'static str {
        match self {
            MessageKind::Text => "TEXT",
            MessageKind::Image => "IMAGE",
            MessageKind::Document => "DOCUMENT",
            MessageKind::Gif => "GIF",
        }
    }

    pub(crate) fn serialize_wire<S>(kind: &MessageKind, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(kind.wire_value())
    }
}

/// Delivery status of a message in the local timeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
}

/// A normalized chat message as held in the in-memory timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned ID once persisted; `temp-{n}` before confirmation.
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub kind: MessageKind,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
    /// Canonical UTC send time.
    pub sent_at: DateTime<Utc>,
    /// Milliseconds since epoch derived from `sent_at`. Sort key and
    /// edit-window input.
    pub sent_at_ms: i64,
    /// Set by the backend when a message was edited. Edits are not issued
    /// by this client core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

/// A chat room with full details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub context_type: RoomContext,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

/// Reduced room payload returned by lookups and listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A message record as it arrives off the wire, before normalization.
///
/// The backend emits both camelCase and snake_case field names depending on
/// which service produced the record, so every optional field appears here
/// under both spellings. `normalize` prefers the camelCase one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMessageRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "senderId", skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(rename = "sender_id", skip_serializing_if = "Option::is_none")]
    pub sender_id_snake: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "message_text", skip_serializing_if = "Option::is_none")]
    pub message_text: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "message_type", skip_serializing_if = "Option::is_none")]
    pub kind_snake: Option<String>,
    #[serde(rename = "fileUrl", skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(rename = "file_url", skip_serializing_if = "Option::is_none")]
    pub file_url_snake: Option<String>,
    #[serde(rename = "fileName", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(rename = "file_name", skip_serializing_if = "Option::is_none")]
    pub file_name_snake: Option<String>,
    #[serde(rename = "fileSize", skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(rename = "file_size", skip_serializing_if = "Option::is_none")]
    pub file_size_snake: Option<u64>,
    #[serde(rename = "replyToMessageId", skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
    #[serde(
        rename = "reply_to_message_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub reply_to_message_id_snake: Option<String>,
    #[serde(rename = "sentAt", skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    #[serde(rename = "sent_at", skip_serializing_if = "Option::is_none")]
    pub sent_at_snake: Option<String>,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Outbound message payload. Serializes to the wire contract: camelCase
/// fields, upper-case `type`, reply reference only when present.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(rename = "type", serialize_with = "MessageKind::serialize_wire")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
}

impl OutgoingMessage {
    /// A plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            file_url: None,
            kind: MessageKind::Text,
            file_name: None,
            file_size: None,
            reply_to_message_id: None,
        }
    }

    /// A file message referencing an already-uploaded URL.
    pub fn file(kind: MessageKind, url: impl Into<String>) -> Self {
        Self {
            text: None,
            file_url: Some(url.into()),
            kind,
            file_name: None,
            file_size: None,
            reply_to_message_id: None,
        }
    }

    pub fn with_reply(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to_message_id = Some(message_id.into());
        self
    }
}
