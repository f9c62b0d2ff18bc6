//! Live message feed over the realtime websocket service.
//!
//! The service multiplexes named channels (`room:{roomId}`) over one
//! socket. Row-insert events for the subscribed room arrive as `insert`
//! frames; publishing an `insert` with a correlation `ref` is the
//! low-latency write path acknowledged by an `ack` frame. Authorization is
//! a bearer credential sent as an `auth` frame before subscribing so
//! server-side row filters evaluate against the right user.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::chat_transport::DirectWrite;
use super::chat_types::{OutgoingMessage, RawMessageRecord};
use crate::error::{ChatError, Result};

/// Wire frames exchanged with the realtime service.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Frame {
    Auth {
        token: String,
    },
    Subscribe {
        channel: String,
    },
    Unsubscribe {
        channel: String,
    },
    Insert {
        channel: String,
        record: serde_json::Value,
        #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
        reference: Option<u64>,
    },
    Ack {
        #[serde(rename = "ref")]
        reference: u64,
        record: serde_json::Value,
    },
    Error {
        #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
        reference: Option<u64>,
        message: String,
    },
}

/// Insert events for one room, plus the means to stop them.
///
/// Dropping the handle closes its channel (best effort), so an abandoned
/// subscription never keeps feeding a dead session.
pub struct RealtimeSubscription {
    room_id: String,
    id: u64,
    events: Option<mpsc::UnboundedReceiver<RawMessageRecord>>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl RealtimeSubscription {
    pub fn new(
        room_id: impl Into<String>,
        id: u64,
        events: mpsc::UnboundedReceiver<RawMessageRecord>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            id,
            events: Some(events),
            on_close: None,
        }
    }

    pub fn with_close(mut self, on_close: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(on_close));
        self
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Hand the event receiver to a consumer task. Yields `None` after the
    /// first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<RawMessageRecord>> {
        self.events.take()
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}

impl fmt::Debug for RealtimeSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeSubscription")
            .field("room_id", &self.room_id)
            .field("id", &self.id)
            .finish()
    }
}

/// The live insert feed for chat rooms.
#[async_trait]
pub trait RealtimeFeed: Send + Sync {
    /// Refresh the feed's authorization with the session's current bearer
    /// credential. Call before `subscribe`.
    async fn set_auth(&self, token: &str) -> Result<()>;

    /// Open the insert feed for a room. At most one subscription is live
    /// per feed; opening a new one closes any prior channel first.
    async fn subscribe(&self, room_id: &str) -> Result<RealtimeSubscription>;

    /// Close a subscription. Best effort: failures are logged, never
    /// surfaced.
    async fn unsubscribe(&self, subscription: RealtimeSubscription);
}

struct ActiveSub {
    id: u64,
    channel: String,
    events: mpsc::UnboundedSender<RawMessageRecord>,
}

type ActiveSlot = Arc<RwLock<Option<ActiveSub>>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<RawMessageRecord>>>>>;

struct Connection {
    out_tx: mpsc::UnboundedSender<WsMessage>,
    active: ActiveSlot,
    pending: PendingMap,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Websocket implementation of [`RealtimeFeed`] and the primary
/// [`DirectWrite`] send path. Connects lazily on first use.
pub struct WsRealtimeFeed {
    url: String,
    conn: Mutex<Option<Connection>>,
    next_id: AtomicU64,
}

impl WsRealtimeFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            conn: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    async fn ensure_connected(
        &self,
    ) -> Result<(mpsc::UnboundedSender<WsMessage>, ActiveSlot, PendingMap)> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            if !conn.out_tx.is_closed() {
                return Ok((conn.out_tx.clone(), conn.active.clone(), conn.pending.clone()));
            }
        }

        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ChatError::Realtime(format!("Connect {}: {}", self.url, e)))?;
        log::info!("Realtime connection established to {}", self.url);

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
        let active: ActiveSlot = Arc::new(RwLock::new(None));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let reader_active = active.clone();
        let reader_pending = pending.clone();
        let pong_tx = out_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                match next {
                    Ok(WsMessage::Text(text)) => {
                        dispatch(&text, &reader_active, &reader_pending).await;
                    }
                    Ok(WsMessage::Ping(payload)) => {
                        let _ = pong_tx.send(WsMessage::Pong(payload));
                    }
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            // Connection gone: anything still waiting resolves as closed,
            // and the active feed stops.
            reader_pending.lock().await.clear();
            reader_active.write().await.take();
            log::debug!("Realtime connection closed");
        });

        *guard = Some(Connection {
            out_tx: out_tx.clone(),
            active: active.clone(),
            pending: pending.clone(),
            reader,
            writer,
        });
        Ok((out_tx, active, pending))
    }
}

async fn dispatch(text: &str, active: &ActiveSlot, pending: &PendingMap) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("Unparseable realtime frame: {}", e);
            return;
        }
    };

    match frame {
        Frame::Insert { channel, record, .. } => {
            let guard = active.read().await;
            if let Some(sub) = guard.as_ref() {
                if sub.channel == channel {
                    let record: RawMessageRecord =
                        serde_json::from_value(record).unwrap_or_default();
                    if sub.events.send(record).is_err() {
                        log::debug!("Insert for {} dropped: subscriber gone", channel);
                    }
                    return;
                }
            }
            log::debug!("Insert for inactive channel {} ignored", channel);
        }
        Frame::Ack { reference, record } => {
            if let Some(ack_tx) = pending.lock().await.remove(&reference) {
                let record: RawMessageRecord = serde_json::from_value(record).unwrap_or_default();
                let _ = ack_tx.send(Ok(record));
            }
        }
        Frame::Error {
            reference: Some(reference),
            message,
        } => {
            if let Some(ack_tx) = pending.lock().await.remove(&reference) {
                let _ = ack_tx.send(Err(ChatError::Realtime(message)));
            }
        }
        Frame::Error {
            reference: None,
            message,
        } => {
            log::warn!("Realtime service error: {}", message);
        }
        Frame::Auth { .. } | Frame::Subscribe { .. } | Frame::Unsubscribe { .. } => {}
    }
}

fn encode(frame: &Frame) -> Result<WsMessage> {
    let json = serde_json::to_string(frame)
        .map_err(|e| ChatError::Realtime(format!("Encode frame: {}", e)))?;
    Ok(WsMessage::Text(json.into()))
}

#[async_trait]
impl RealtimeFeed for WsRealtimeFeed {
    async fn set_auth(&self, token: &str) -> Result<()> {
        let (out_tx, _, _) = self.ensure_connected().await?;
        out_tx
            .send(encode(&Frame::Auth {
                token: token.to_string(),
            })?)
            .map_err(|_| ChatError::Realtime("connection closed".to_string()))
    }

    async fn subscribe(&self, room_id: &str) -> Result<RealtimeSubscription> {
        let (out_tx, active, _) = self.ensure_connected().await?;
        let channel = format!("room:{}", room_id);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        {
            let mut slot = active.write().await;
            // One live channel per connection: close any prior one first.
            if let Some(prev) = slot.take() {
                let _ = out_tx.send(encode(&Frame::Unsubscribe {
                    channel: prev.channel,
                })?);
            }
            *slot = Some(ActiveSub {
                id,
                channel: channel.clone(),
                events: events_tx,
            });
        }

        out_tx
            .send(encode(&Frame::Subscribe {
                channel: channel.clone(),
            })?)
            .map_err(|_| ChatError::Realtime("connection closed".to_string()))?;
        log::info!("Subscribed to {}", channel);

        let close_tx = out_tx.clone();
        Ok(RealtimeSubscription::new(room_id, id, events_rx).with_close(move || {
            match encode(&Frame::Unsubscribe { channel }) {
                Ok(msg) => {
                    if close_tx.send(msg).is_err() {
                        log::debug!("Unsubscribe skipped: connection already closed");
                    }
                }
                Err(e) => log::debug!("Unsubscribe encode: {}", e),
            }
        }))
    }

    async fn unsubscribe(&self, subscription: RealtimeSubscription) {
        let guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            let mut slot = conn.active.write().await;
            if slot.as_ref().is_some_and(|sub| sub.id == subscription.id()) {
                slot.take();
            }
        }
        // Dropping the handle sends the unsubscribe frame.
        drop(subscription);
    }
}

#[async_trait]
impl DirectWrite for WsRealtimeFeed {
    async fn insert_message(
        &self,
        room_id: &str,
        message: &OutgoingMessage,
    ) -> Result<RawMessageRecord> {
        let (out_tx, _, pending) = self.ensure_connected().await?;
        let reference = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = serde_json::to_value(message)
            .map_err(|e| ChatError::Realtime(format!("Encode message: {}", e)))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        pending.lock().await.insert(reference, ack_tx);

        let frame = Frame::Insert {
            channel: format!("room:{}", room_id),
            record,
            reference: Some(reference),
        };
        if out_tx.send(encode(&frame)?).is_err() {
            pending.lock().await.remove(&reference);
            return Err(ChatError::Realtime("connection closed".to_string()));
        }

        // No client-side timeout: the pending entry resolves on ack, on a
        // correlated error frame, or when the connection closes.
        match ack_rx.await {
            Ok(result) => result,
            Err(_) => Err(ChatError::Realtime(
                "connection closed before acknowledgement".to_string(),
            )),
        }
    }
}

impl Drop for WsRealtimeFeed {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.conn.try_lock() {
            if let Some(conn) = guard.take() {
                conn.reader.abort();
                conn.writer.abort();
            }
        }
    }
}
