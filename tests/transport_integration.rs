//! Integration tests for the chat transport against a wiremock backend.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_test::assert_ok;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use meridian_chat::{
    ChatError, ChatTransport, ClientConfig, DirectWrite, OutgoingMessage, RawMessageRecord,
    SessionStore,
};

mockall::mock! {
    Primary {}

    #[async_trait]
    impl DirectWrite for Primary {
        async fn insert_message(
            &self,
            room_id: &str,
            message: &OutgoingMessage,
        ) -> meridian_chat::Result<RawMessageRecord>;
    }
}

fn write_user(dir: &Path, id: &str) {
    std::fs::write(dir.join("user.json"), format!(r#"{{"id":"{}"}}"#, id)).unwrap();
    std::fs::write(dir.join("token"), "bearer-test-token").unwrap();
}

fn make_transport(server: &MockServer, user_id: Option<&str>) -> (ChatTransport, TempDir) {
    let tmp = TempDir::new().unwrap();
    if let Some(id) = user_id {
        write_user(tmp.path(), id);
    }
    let store = Arc::new(SessionStore::new(tmp.path()));
    let mut config = ClientConfig::default();
    config.api_base_url = server.uri();
    config.session_dir = tmp.path().to_path_buf();
    (ChatTransport::new(&config, store).unwrap(), tmp)
}

const USER_A: &str = "11111111-1111-4111-8111-111111111111";
const USER_B: &str = "22222222-2222-4222-8222-222222222222";

fn room_payload(id: &str) -> serde_json::Value {
    json!({
        "data": {
            "id": id,
            "title": "Q2 inventory",
            "contextType": "DIRECT",
            "memberIds": [USER_A, USER_B],
        }
    })
}

#[tokio::test]
async fn create_direct_room_sorts_member_ids() {
    let server = MockServer::start().await;
    let (transport, _tmp) = make_transport(&server, Some(USER_A));

    Mock::given(method("POST"))
        .and(path("/chat/rooms"))
        .and(body_json(json!({
            "title": "Q2 inventory",
            "contextType": "DIRECT",
            "memberIds": [USER_A, USER_B],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(room_payload("r-dm")))
        .expect(1)
        .mount(&server)
        .await;

    let room = transport
        .create_direct_room(USER_B, Some("Q2 inventory"))
        .await
        .unwrap();
    assert_eq!(room.id, "r-dm");
}

#[tokio::test]
async fn create_direct_room_is_direction_independent() {
    // Same request body when the partner sorts before the caller.
    let server = MockServer::start().await;
    let (transport, _tmp) = make_transport(&server, Some(USER_B));

    Mock::given(method("POST"))
        .and(path("/chat/rooms"))
        .and(body_json(json!({
            "title": "Q2 inventory",
            "contextType": "DIRECT",
            "memberIds": [USER_A, USER_B],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(room_payload("r-dm")))
        .expect(1)
        .mount(&server)
        .await;

    transport
        .create_direct_room(USER_A, Some("Q2 inventory"))
        .await
        .unwrap();
}

#[tokio::test]
async fn create_direct_room_requires_identity() {
    let server = MockServer::start().await;
    let (transport, _tmp) = make_transport(&server, None);

    let err = transport.create_direct_room(USER_B, None).await.unwrap_err();
    assert!(matches!(err, ChatError::Unauthenticated));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn send_falls_back_to_rest_when_primary_fails() {
    let server = MockServer::start().await;
    let (transport, _tmp) = make_transport(&server, Some(USER_A));

    let mut primary = MockPrimary::new();
    primary
        .expect_insert_message()
        .times(1)
        .returning(|_, _| Err(ChatError::Realtime("socket down".to_string())));
    let transport = transport.with_direct_write(Arc::new(primary));

    Mock::given(method("POST"))
        .and(path("/chat/rooms/r1/messages"))
        .and(body_json(json!({ "text": "hello", "type": "TEXT" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m-rest", "senderId": USER_A, "text": "hello", "type": "TEXT",
            "sentAt": "2024-03-01T08:00:00Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = transport
        .send_message("r1", &OutgoingMessage::text("hello"))
        .await
        .unwrap();
    assert_eq!(record.id.as_deref(), Some("m-rest"));
}

#[tokio::test]
async fn send_skips_rest_when_primary_succeeds() {
    let server = MockServer::start().await;
    let (transport, _tmp) = make_transport(&server, Some(USER_A));

    let mut primary = MockPrimary::new();
    primary.expect_insert_message().times(1).returning(|_, _| {
        Ok(RawMessageRecord {
            id: Some("m-direct".to_string()),
            ..Default::default()
        })
    });
    let transport = transport.with_direct_write(Arc::new(primary));

    let record = transport
        .send_message("r1", &OutgoingMessage::text("hello"))
        .await
        .unwrap();
    assert_eq!(record.id.as_deref(), Some("m-direct"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn send_surfaces_error_when_both_paths_fail() {
    let server = MockServer::start().await;
    let (transport, _tmp) = make_transport(&server, Some(USER_A));

    let mut primary = MockPrimary::new();
    primary
        .expect_insert_message()
        .times(1)
        .returning(|_, _| Err(ChatError::Realtime("socket down".to_string())));
    let transport = transport.with_direct_write(Arc::new(primary));

    Mock::given(method("POST"))
        .and(path("/chat/rooms/r1/messages"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = transport
        .send_message("r1", &OutgoingMessage::text("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Transport(_)));
}

#[tokio::test]
async fn reply_reference_is_omitted_unless_present() {
    let server = MockServer::start().await;
    let (transport, _tmp) = make_transport(&server, Some(USER_A));

    Mock::given(method("POST"))
        .and(path("/chat/rooms/r1/messages"))
        .and(body_json(json!({
            "text": "threaded",
            "type": "TEXT",
            "replyToMessageId": "m-0",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m-1" })))
        .expect(1)
        .mount(&server)
        .await;

    transport
        .send_message("r1", &OutgoingMessage::text("threaded").with_reply("m-0"))
        .await
        .unwrap();
}

#[tokio::test]
async fn history_returns_raw_records_from_envelope() {
    let server = MockServer::start().await;
    let (transport, _tmp) = make_transport(&server, Some(USER_A));

    Mock::given(method("GET"))
        .and(path("/chat/rooms/r1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "m-1", "senderId": "u-1", "text": "camel", "sentAt": "2024-03-01T08:00:00Z" },
                { "id": "m-2", "sender_id": "u-2", "text": "snake", "sent_at": "2024-03-01T08:01:00Z" },
            ]
        })))
        .mount(&server)
        .await;

    let records = transport.messages("r1").await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].sender_id.as_deref(), Some("u-1"));
    assert!(records[0].sender_id_snake.is_none());
    assert_eq!(records[1].sender_id_snake.as_deref(), Some("u-2"));
    assert!(records[1].sender_id.is_none());
}

#[tokio::test]
async fn upload_prefers_url_over_file_url() {
    let server = MockServer::start().await;
    let (transport, tmp) = make_transport(&server, Some(USER_A));

    Mock::given(method("POST"))
        .and(path("/chat/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "url": "https://files.test/one.pdf", "fileUrl": "https://files.test/other.pdf" }
        })))
        .mount(&server)
        .await;

    let file = tmp.path().join("workpapers.pdf");
    std::fs::write(&file, b"%PDF-1.7").unwrap();

    let url = transport.upload_file(&file).await.unwrap();
    assert_eq!(url, "https://files.test/one.pdf");
}

#[tokio::test]
async fn upload_accepts_legacy_file_url_field() {
    let server = MockServer::start().await;
    let (transport, tmp) = make_transport(&server, Some(USER_A));

    Mock::given(method("POST"))
        .and(path("/chat/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "fileUrl": "https://files.test/legacy.png" }
        })))
        .mount(&server)
        .await;

    let file = tmp.path().join("evidence.png");
    std::fs::write(&file, b"png-bytes").unwrap();

    let url = transport.upload_file(&file).await.unwrap();
    assert_eq!(url, "https://files.test/legacy.png");
}

#[tokio::test]
async fn room_for_engagement_unwraps_envelope() {
    let server = MockServer::start().await;
    let (transport, _tmp) = make_transport(&server, Some(USER_A));

    Mock::given(method("GET"))
        .and(path("/engagements/eng-9/chat-room"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "id": "r9", "title": "FY24 audit" } })),
        )
        .mount(&server)
        .await;

    let summary = transport.room_for_engagement("eng-9").await.unwrap();
    assert_eq!(summary.id, "r9");
    assert_eq!(summary.title.as_deref(), Some("FY24 audit"));
}

#[tokio::test]
async fn mark_as_read_sends_nothing() {
    let server = MockServer::start().await;
    let (transport, _tmp) = make_transport(&server, Some(USER_A));

    tokio_test::assert_ok!(transport.mark_as_read("r1", Some("m-5")).await);
    assert!(server.received_requests().await.unwrap().is_empty());
}
