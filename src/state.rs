use std::sync::Arc;
use tokio::sync::watch;

use crate::{
    bridge::QueueBridge,
    hub::{BroadcastHub, ConnectionRegistry},
    store::Store,
};

/* ------------ WebSocket 房間 ------------ */
pub type Hub = Arc<BroadcastHub>;

pub fn new_hub() -> Hub {
    Arc::new(BroadcastHub::new(Arc::new(ConnectionRegistry::new())))
}

/* ------------ Extension 包裝 ------------ */
#[derive(Clone)]
pub struct JwtSecret(pub Arc<str>);

#[derive(Clone, Copy)]
pub struct HistoryLimit(pub i64);

/// Process-wide stop flag; sessions end when it turns `true`.
#[derive(Clone)]
pub struct Shutdown(pub watch::Receiver<bool>);

/// Everything the chat router needs; split into Extension layers in `routes::app`.
#[derive(Clone)]
pub struct AppState {
    pub store:   Store,
    pub hub:     Hub,
    pub bridge:  QueueBridge,
    pub secret:  JwtSecret,
    pub history: HistoryLimit,
    pub stop:    Shutdown,
}
