use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::registry::{ChatroomId, Connection, ConnectionRegistry};
use crate::store::Message;

pub const BOT_USER_ID: i64 = 0;
pub const BOT_USERNAME: &str = "StockBot";

/// Every outbound frame has this shape, chat text and bot replies alike.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub chatroom_id: ChatroomId,
    pub user_id:     i64,
    pub username:    String,
    pub content:     String,
    pub timestamp:   DateTime<Utc>,
}

impl Envelope {
    /// Frame for a message that was just persisted; keeps its stored timestamp.
    pub fn for_message(msg: &Message, username: &str) -> Self {
        Self {
            chatroom_id: msg.chatroom_id,
            user_id: msg.user_id,
            username: username.to_string(),
            content: msg.content.clone(),
            timestamp: msg.timestamp,
        }
    }

    pub fn bot(room: ChatroomId, content: &str) -> Self {
        Self {
            chatroom_id: room,
            user_id: BOT_USER_ID,
            username: BOT_USERNAME.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of one fan-out. Informational only; callers are never blocked on it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub evicted:   usize,
}

pub struct BroadcastHub {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastHub {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self { Self { registry } }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> { &self.registry }

    /// Sequential best-effort fan-out. A recipient whose write fails is closed
    /// and removed from the room; the rest still get the message.
    pub async fn broadcast(&self, room: ChatroomId, text: &str) -> Delivery {
        let members = self.registry.snapshot(room).await;
        let mut report = Delivery::default();
        let mut failed: Vec<Connection> = Vec::new();

        for conn in members {
            match conn.send_text(text).await {
                Ok(())  => report.delivered += 1,
                Err(e)  => {
                    warn!(room, conn = conn.id(), "broadcast write failed, evicting: {e}");
                    failed.push(conn);
                }
            }
        }

        for conn in failed {
            conn.close().await;
            if self.registry.remove(room, &conn).await {
                report.evicted += 1;
            }
        }

        debug!(room, delivered = report.delivered, evicted = report.evicted, "broadcast done");
        report
    }

    pub async fn broadcast_envelope(&self, env: &Envelope) -> Delivery {
        match serde_json::to_string(env) {
            Ok(text) => self.broadcast(env.chatroom_id, &text).await,
            Err(e)   => {
                warn!("envelope encode failed: {e}");
                Delivery::default()
            }
        }
    }
}
