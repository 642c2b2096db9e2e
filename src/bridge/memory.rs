//! In-process transport for single-node runs and tests.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{mpsc, Mutex};

use super::{PayloadStream, QueueTransport, Topic};
use crate::error::BridgeError;

struct Channel {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Bytes>>>,
}

/// One unbounded queue per topic. Messages published before anyone consumes
/// are buffered; concurrent consumers on one topic compete for messages.
#[derive(Default)]
pub struct MemoryTransport {
    topics: Mutex<HashMap<Topic, Channel>>,
}

impl MemoryTransport {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl QueueTransport for MemoryTransport {
    async fn declare(&self, topic: Topic) -> Result<(), BridgeError> {
        self.topics.lock().await.entry(topic).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            Channel { tx, rx: Arc::new(Mutex::new(rx)) }
        });
        Ok(())
    }

    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<(), BridgeError> {
        let topics = self.topics.lock().await;
        let ch = topics.get(&topic).ok_or_else(|| BridgeError::Publish {
            topic: topic.as_str(),
            reason: "topic not declared".into(),
        })?;
        ch.tx.send(payload).map_err(|e| BridgeError::Publish {
            topic: topic.as_str(),
            reason: e.to_string(),
        })
    }

    async fn consume(&self, topic: Topic) -> Result<PayloadStream, BridgeError> {
        let rx = self
            .topics
            .lock()
            .await
            .get(&topic)
            .map(|ch| ch.rx.clone())
            .ok_or_else(|| BridgeError::Consume {
                topic: topic.as_str(),
                reason: "topic not declared".into(),
            })?;

        let payloads = stream::unfold(rx, |rx| async move {
            let next = rx.lock().await.recv().await;
            next.map(|payload| (Ok(payload), rx))
        });
        Ok(payloads.boxed())
    }

    /// Drops every sender; open consume streams drain what is buffered and end.
    async fn shutdown(&self) {
        self.topics.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_before_consume_is_buffered() {
        let t = MemoryTransport::new();
        t.declare(Topic::StockRequests).await.unwrap();
        t.declare(Topic::StockRequests).await.unwrap();
        t.publish(Topic::StockRequests, Bytes::from_static(b"a")).await.unwrap();
        t.publish(Topic::StockRequests, Bytes::from_static(b"b")).await.unwrap();

        let mut s = t.consume(Topic::StockRequests).await.unwrap();
        assert_eq!(s.next().await.unwrap().unwrap(), Bytes::from_static(b"a"));
        assert_eq!(s.next().await.unwrap().unwrap(), Bytes::from_static(b"b"));
    }

    #[tokio::test]
    async fn topics_do_not_leak_into_each_other() {
        let t = MemoryTransport::new();
        for topic in Topic::ALL { t.declare(topic).await.unwrap(); }
        t.publish(Topic::StockResponses, Bytes::from_static(b"r")).await.unwrap();

        let mut requests = t.consume(Topic::StockRequests).await.unwrap();
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            requests.next(),
        ).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn undeclared_topic_rejects_publish() {
        let t = MemoryTransport::new();
        let err = t.publish(Topic::StockResponses, Bytes::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Publish { topic: "stock_responses", .. }));
    }

    #[tokio::test]
    async fn shutdown_drains_then_ends() {
        let t = MemoryTransport::new();
        t.declare(Topic::StockResponses).await.unwrap();
        let mut s = t.consume(Topic::StockResponses).await.unwrap();
        t.publish(Topic::StockResponses, Bytes::from_static(b"last")).await.unwrap();
        t.shutdown().await;

        assert_eq!(s.next().await.unwrap().unwrap(), Bytes::from_static(b"last"));
        assert!(s.next().await.is_none());
    }
}
