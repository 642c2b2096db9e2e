//! Chat-side consumer: `stock_responses` → room broadcast.

use tokio::sync::watch;
use tracing::info;

use crate::{
    bridge::{QueueBridge, StockResponse, Topic},
    error::BridgeError,
    hub::Envelope,
    state::Hub,
};

pub async fn run(
    bridge: QueueBridge,
    hub: Hub,
    shutdown: watch::Receiver<bool>,
) -> Result<(), BridgeError> {
    bridge
        .run_json_consumer(Topic::StockResponses, shutdown, |resp: StockResponse| {
            let hub = hub.clone();
            async move {
                let report = hub.broadcast_envelope(&Envelope::bot(resp.chatroom_id, &resp.content)).await;
                info!(room = resp.chatroom_id, delivered = report.delivered, "stock response relayed");
            }
        })
        .await
}
