//! Canonicalizes heterogeneous wire-format message records.
//!
//! The backend is inconsistent in two ways this module papers over: field
//! names arrive in either camelCase or snake_case depending on which
//! service produced the record, and send timestamps sometimes omit the
//! timezone suffix. Both are compatibility shims over backend quirks, not
//! part of the contract.

use chrono::{DateTime, Utc};

use super::chat_types::{Message, MessageKind, MessageStatus, RawMessageRecord};

/// Canonicalize a raw wire record into a [`Message`]. Never fails: missing
/// fields default, unparseable timestamps fall back to the current instant.
pub fn normalize(raw: RawMessageRecord) -> Message {
    let sent_at = raw
        .sent_at
        .or(raw.sent_at_snake)
        .or(raw.created_at)
        .map(|ts| parse_timestamp(&ts))
        .unwrap_or_else(Utc::now);

    let kind = raw
        .kind
        .or(raw.kind_snake)
        .map(|k| MessageKind::from_wire(&k))
        .unwrap_or(MessageKind::Text);

    Message {
        id: raw.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        sender_id: raw.sender_id.or(raw.sender_id_snake).unwrap_or_default(),
        text: raw.text.or(raw.message_text).unwrap_or_default(),
        kind,
        status: MessageStatus::Sent,
        file_url: raw.file_url.or(raw.file_url_snake),
        file_name: raw.file_name.or(raw.file_name_snake),
        file_size: raw.file_size.or(raw.file_size_snake),
        reply_to_message_id: raw.reply_to_message_id.or(raw.reply_to_message_id_snake),
        sent_at,
        sent_at_ms: sent_at.timestamp_millis(),
        edited_at: None,
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    let corrected = force_utc_suffix(raw);
    match DateTime::parse_from_rfc3339(&corrected) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            log::warn!("Unparseable message timestamp '{}': {}", raw, e);
            Utc::now()
        }
    }
}

/// Append `Z` when a timestamp string carries no explicit UTC or offset
/// marker (`Z`, a `+`, or a trailing `-HH:MM`). The backend sometimes omits
/// the zone on send timestamps, which would otherwise parse as local time.
///
/// Limitation: a non-standard suffix that is none of the markers above is
/// silently treated as a missing zone and forced to UTC.
fn force_utc_suffix(raw: &str) -> String {
    if has_zone_marker(raw) {
        raw.to_string()
    } else {
        format!("{}Z", raw)
    }
}

fn has_zone_marker(raw: &str) -> bool {
    if raw.contains('Z') || raw.contains('+') {
        return true;
    }
    // Trailing negative offset: ...-HH:MM
    let bytes = raw.as_bytes();
    if bytes.len() < 6 {
        return false;
    }
    let tail = &bytes[bytes.len() - 6..];
    tail[0] == b'-'
        && tail[1].is_ascii_digit()
        && tail[2].is_ascii_digit()
        && tail[3] == b':'
        && tail[4].is_ascii_digit()
        && tail[5].is_ascii_digit()
}
