//! Queue-mediated path between the chat process and the quote worker.
//!
//! Two topics carry JSON: `stock_requests` ({chatroom_id, stock_code}) and
//! `stock_responses` ({chatroom_id, content}). Responses are routed back by
//! chatroom id only, so two requests for the same room may be answered in
//! either order.

pub mod memory;
pub mod nats;

use std::{future::Future, sync::Arc};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{error::BridgeError, hub::ChatroomId};

pub use memory::MemoryTransport;
pub use nats::NatsTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    StockRequests,
    StockResponses,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::StockRequests, Topic::StockResponses];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::StockRequests  => "stock_requests",
            Topic::StockResponses => "stock_responses",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockRequest {
    pub chatroom_id: ChatroomId,
    pub stock_code:  String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockResponse {
    pub chatroom_id: ChatroomId,
    pub content:     String,
}

pub type PayloadStream = BoxStream<'static, Result<Bytes, BridgeError>>;

/// A durable topic channel. Consumption acknowledges on receipt, so a crash
/// between receive and handling loses that message.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Idempotent.
    async fn declare(&self, topic: Topic) -> Result<(), BridgeError>;
    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<(), BridgeError>;
    /// Infinite until the transport shuts down.
    async fn consume(&self, topic: Topic) -> Result<PayloadStream, BridgeError>;
    async fn shutdown(&self) {}
}

#[derive(Clone)]
pub struct QueueBridge {
    transport: Arc<dyn QueueTransport>,
}

impl QueueBridge {
    /// Declares both topics before handing the bridge out.
    pub async fn open(transport: Arc<dyn QueueTransport>) -> Result<Self, BridgeError> {
        for topic in Topic::ALL {
            transport.declare(topic).await?;
        }
        Ok(Self { transport })
    }

    pub async fn publish(&self, topic: Topic, payload: Bytes) -> Result<(), BridgeError> {
        self.transport.publish(topic, payload).await
    }

    /// Fire-and-forget. Failures are logged and dropped; the return value only
    /// says whether the transport accepted the message.
    pub async fn publish_json<T: Serialize>(&self, topic: Topic, msg: &T) -> bool {
        let payload = match serde_json::to_vec(msg).map_err(BridgeError::Encode) {
            Ok(p)  => Bytes::from(p),
            Err(e) => {
                warn!(topic = topic.as_str(), "{e}");
                return false;
            }
        };
        match self.publish(topic, payload).await {
            Ok(())  => true,
            Err(e)  => {
                warn!("{e}");
                false
            }
        }
    }

    /// Pulls from `topic` until shutdown is signalled or the transport closes.
    /// Per-message errors are logged and skipped.
    pub async fn run_consumer<F, Fut>(
        &self,
        topic: Topic,
        mut shutdown: watch::Receiver<bool>,
        mut handle: F,
    ) -> Result<(), BridgeError>
    where
        F: FnMut(Bytes) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut stream = self.transport.consume(topic).await?;
        info!(topic = topic.as_str(), "consumer ready");

        if *shutdown.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    info!(topic = topic.as_str(), "consumer received shutdown signal");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(payload)) => {
                        debug!(topic = topic.as_str(), bytes = payload.len(), "received");
                        handle(payload).await;
                    }
                    Some(Err(e)) => warn!("{e}"),
                    None => {
                        info!(topic = topic.as_str(), "transport closed, consumer exiting");
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    /// Same as `run_consumer`, decoding each payload as JSON first.
    /// Undecodable payloads are dropped.
    pub async fn run_json_consumer<T, F, Fut>(
        &self,
        topic: Topic,
        shutdown: watch::Receiver<bool>,
        mut handle: F,
    ) -> Result<(), BridgeError>
    where
        T: DeserializeOwned,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        self.run_consumer(topic, shutdown, |payload| {
            let decoded = serde_json::from_slice::<T>(&payload).map_err(BridgeError::Decode);
            let fut = match decoded {
                Ok(msg) => Some(handle(msg)),
                Err(e)  => {
                    warn!(topic = topic.as_str(), "{e}");
                    None
                }
            };
            async move {
                if let Some(fut) = fut { fut.await }
            }
        })
        .await
    }

    pub async fn shutdown(&self) {
        self.transport.shutdown().await
    }
}
