use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use async_trait::async_trait;
use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Extension, Query},
    response::Response,
    routing::get,
    Router,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Deserialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::chatroom::parse_room;
use crate::{
    bridge::{QueueBridge, StockRequest, Topic},
    error::{unauthorized, AppResult, HubError},
    hub::{ChatroomId, Connection, Envelope, FrameSink},
    state::{Hub, JwtSecret, Shutdown},
    store::Store,
    utils::jwt,
};

pub const STOCK_COMMAND: &str = "/stock=";

#[derive(Deserialize)]
struct WsQuery { token: Option<String>, chatroom_id: Option<String> }

/// Inbound frame body.
#[derive(Deserialize)]
struct Inbound { content: String }

pub fn router() -> Router {
    Router::new().route("/ws", get(ws_handler))
}

/* ---------------- upgrade ---------------- */
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(q): Query<WsQuery>,
    Extension(secret): Extension<JwtSecret>,
    Extension(store): Extension<Store>,
    Extension(hub): Extension<Hub>,
    Extension(bridge): Extension<QueueBridge>,
    Extension(Shutdown(stop)): Extension<Shutdown>,
) -> AppResult<Response> {
    // Auth happens before the upgrade: a bad token never reaches the registry.
    let token = q.token.filter(|t| !t.is_empty()).ok_or_else(|| unauthorized("missing token"))?;
    let claims = jwt::verify(&token, &secret.0)?;
    let room = parse_room(q.chatroom_id.as_deref())?;

    let session = ChatSession {
        room,
        user_id: claims.sub,
        username: claims.username,
        store,
        hub,
        bridge,
        stop,
    };
    Ok(ws.on_upgrade(move |sock| session.run(sock)))
}

/* ---------------- write half ---------------- */
/// Serialised writer over the socket's sink half.
pub struct WsSink {
    inner:  Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
}

impl WsSink {
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner: Mutex::new(inner), closed: AtomicBool::new(false) }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&self, text: &str) -> Result<(), HubError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HubError::Closed);
        }
        self.inner
            .lock()
            .await
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| HubError::Write(e.to_string()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut sink = self.inner.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}

/* ---------------- per connection ---------------- */
#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    /// `/stock=<code>`; the code is passed on untouched.
    Stock(&'a str),
    Chat(&'a str),
}

pub fn classify(content: &str) -> Route<'_> {
    match content.strip_prefix(STOCK_COMMAND) {
        Some(code) => Route::Stock(code),
        None       => Route::Chat(content),
    }
}

struct ChatSession {
    room:     ChatroomId,
    user_id:  i64,
    username: String,
    store:    Store,
    hub:      Hub,
    bridge:   QueueBridge,
    stop:     watch::Receiver<bool>,
}

impl ChatSession {
    async fn run(self, sock: WebSocket) {
        let (sink, mut stream) = sock.split();
        let conn = Connection::new(Arc::new(WsSink::new(sink)));
        let registry = self.hub.registry().clone();

        /* 進房 */
        registry.add(self.room, conn.clone()).await;
        info!(room = self.room, user = self.user_id, conn = conn.id(), "joined");

        let mut stop = self.stop.clone();
        loop {
            let frame = tokio::select! {
                frame = stream.next() => frame,
                _ = stop.wait_for(|s| *s) => {
                    debug!(room = self.room, conn = conn.id(), "shutdown");
                    break;
                }
            };
            match frame {
                Some(Ok(Message::Text(raw))) => self.on_text(&raw).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_))                  => {}
                Some(Err(e)) => {
                    debug!(room = self.room, conn = conn.id(), "read error: {e}");
                    break;
                }
            }
        }

        /* 離房 */
        registry.remove(self.room, &conn).await;
        conn.close().await;
        info!(room = self.room, user = self.user_id, conn = conn.id(), "left");
    }

    async fn on_text(&self, raw: &str) {
        let content = match serde_json::from_str::<Inbound>(raw) {
            Ok(m)  => m.content,
            Err(e) => {
                warn!(room = self.room, user = self.user_id, "malformed frame: {e}");
                return;
            }
        };

        match classify(&content) {
            Route::Stock(code) => {
                let req = StockRequest { chatroom_id: self.room, stock_code: code.to_string() };
                self.bridge.publish_json(Topic::StockRequests, &req).await;
            }
            Route::Chat(text) => {
                let msg = match self.store.append_message(self.room, self.user_id, text).await {
                    Ok(m)  => m,
                    Err(e) => {
                        warn!(room = self.room, "failed to store message: {e}");
                        return;
                    }
                };
                self.hub.broadcast_envelope(&Envelope::for_message(&msg, &self.username)).await;
            }
        }
    }
}
