//! NATS JetStream transport.
//!
//! Each topic gets its own work-queue stream (`STOCK_REQUESTS` capturing
//! subject `stock_requests`, likewise for responses) on file storage, so a
//! published message survives until some consumer takes it.

use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, PullConsumer},
    stream::{RetentionPolicy, StorageType},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use tracing::{info, warn};

use super::{PayloadStream, QueueTransport, Topic};
use crate::error::BridgeError;

pub struct NatsTransport {
    client:    async_nats::Client,
    jetstream: jetstream::Context,
    /// Prefix of the durable consumer name, e.g. `chat` or `bot`.
    consumer:  String,
}

impl NatsTransport {
    pub async fn connect(url: &str, consumer: &str) -> Result<Self, BridgeError> {
        info!("Connecting to NATS at {}", url);
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BridgeError::Connect(e.to_string()))?;
        let jetstream = jetstream::new(client.clone());
        Ok(Self { client, jetstream, consumer: consumer.to_string() })
    }

    fn stream_name(topic: Topic) -> String {
        topic.as_str().to_uppercase()
    }

    fn durable_name(&self, topic: Topic) -> String {
        format!("{}-{}", self.consumer, topic.as_str())
    }
}

#[async_trait]
impl QueueTransport for NatsTransport {
    async fn declare(&self, topic: Topic) -> Result<(), BridgeError> {
        let name = Self::stream_name(topic);
        self.jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name:      name.clone(),
                subjects:  vec![topic.as_str().to_string()],
                retention: RetentionPolicy::WorkQueue,
                storage:   StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| BridgeError::Declare { topic: topic.as_str(), reason: e.to_string() })?;
        info!("Stream '{}' ready", name);
        Ok(())
    }

    async fn publish(&self, topic: Topic, payload: Bytes) -> Result<(), BridgeError> {
        let fail = |e: String| BridgeError::Publish { topic: topic.as_str(), reason: e };
        self.jetstream
            .publish(topic.as_str().to_string(), payload)
            .await
            .map_err(|e| fail(e.to_string()))?
            .await
            .map_err(|e| fail(e.to_string()))?;
        Ok(())
    }

    async fn consume(&self, topic: Topic) -> Result<PayloadStream, BridgeError> {
        let fail = |e: String| BridgeError::Consume { topic: topic.as_str(), reason: e };

        let stream = self
            .jetstream
            .get_stream(Self::stream_name(topic))
            .await
            .map_err(|e| fail(e.to_string()))?;

        let durable = self.durable_name(topic);
        let consumer: PullConsumer = stream
            .get_or_create_consumer(&durable, pull::Config {
                durable_name: Some(durable.clone()),
                ack_policy:   AckPolicy::Explicit,
                ..Default::default()
            })
            .await
            .map_err(|e| fail(e.to_string()))?;

        let messages = consumer.messages().await.map_err(|e| fail(e.to_string()))?;
        info!(topic = topic.as_str(), consumer = %durable, "pull consumer attached");

        // Ack before handing the payload on: at-most-once.
        let payloads = messages.then(move |next| async move {
            match next {
                Ok(msg) => {
                    if let Err(e) = msg.ack().await {
                        warn!(topic = topic.as_str(), "ack failed: {e}");
                    }
                    Ok(msg.message.payload.clone())
                }
                Err(e) => Err(BridgeError::Consume { topic: topic.as_str(), reason: e.to_string() }),
            }
        });
        Ok(payloads.boxed())
    }

    async fn shutdown(&self) {
        if let Err(e) = self.client.flush().await {
            warn!("NATS flush on shutdown failed: {e}");
        }
    }
}
