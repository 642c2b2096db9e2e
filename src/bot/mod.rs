//! Stock bot worker: `stock_requests` in, `stock_responses` out.

pub mod quote;

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::{
    bridge::{QueueBridge, StockRequest, StockResponse, Topic},
    error::BridgeError,
};
pub use quote::{HttpQuoteSource, QuoteOutcome, QuoteResolver, QuoteSource};

/// Resolve one request into its response.
pub async fn answer<S: QuoteSource>(resolver: &QuoteResolver<S>, req: &StockRequest) -> StockResponse {
    StockResponse {
        chatroom_id: req.chatroom_id,
        content:     resolver.resolve_text(&req.stock_code).await,
    }
}

/// Runs until `shutdown` flips or the transport closes. Requests are handled
/// one at a time, in arrival order.
pub async fn run<S: QuoteSource>(
    bridge: QueueBridge,
    resolver: Arc<QuoteResolver<S>>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), BridgeError> {
    info!("Bot is ready to receive messages...");
    let out = bridge.clone();
    bridge
        .run_json_consumer(Topic::StockRequests, shutdown, |req: StockRequest| {
            let out = out.clone();
            let resolver = resolver.clone();
            async move {
                info!(room = req.chatroom_id, code = %req.stock_code, "processing stock request");
                let resp = answer(&resolver, &req).await;
                out.publish_json(Topic::StockResponses, &resp).await;
            }
        })
        .await
}
