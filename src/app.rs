//! Process composition: which loops run where, and how they stop.

use std::{sync::Arc, time::Duration};
use anyhow::{bail, Context};
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tracing::{error, info, warn};

use crate::{
    bot::{self, HttpQuoteSource, QuoteResolver},
    bridge::{MemoryTransport, NatsTransport, QueueBridge, QueueTransport},
    config::{App, Config},
    error::BridgeError,
    relay, routes,
    state::{self, AppState, HistoryLimit, Hub, JwtSecret, Shutdown},
    store::Store,
};

/// How long the chat server waits for open sessions to close after a stop.
const SESSION_DRAIN: Duration = Duration::from_secs(5);

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = stop_tx.send(true);
        }
    });

    match cfg.app {
        App::Text => {
            info!("Starting Text Application...");
            run_text(&cfg, stop_rx).await?;
        }
        App::Bot  => {
            info!("Starting Bot Application...");
            let bridge = open_bridge(&cfg).await?;
            let worker = spawn_bot(&cfg, bridge.clone(), stop_rx);
            join("bot", worker).await;
            bridge.shutdown().await;
        }
        App::Chat => {
            info!("Starting Chat Application...");
            let bridge = open_bridge(&cfg).await?;
            run_chat(&cfg, bridge.clone(), stop_rx).await?;
            bridge.shutdown().await;
        }
        App::All  => {
            info!("Starting Chat and Bot in one process...");
            let bridge = open_bridge(&cfg).await?;
            let worker = spawn_bot(&cfg, bridge.clone(), stop_rx.clone());
            run_chat(&cfg, bridge.clone(), stop_rx).await?;
            join("bot", worker).await;
            bridge.shutdown().await;
        }
    }
    Ok(())
}

async fn open_bridge(cfg: &Config) -> anyhow::Result<QueueBridge> {
    let transport = open_transport(cfg).await?;
    QueueBridge::open(transport).await.context("declare queue topics")
}

async fn open_transport(cfg: &Config) -> anyhow::Result<Arc<dyn QueueTransport>> {
    match (&cfg.nats_url, cfg.app) {
        (Some(url), app) => {
            let t = NatsTransport::connect(url, app.as_str()).await.context("connect to NATS")?;
            Ok(Arc::new(t))
        }
        (None, App::All) => {
            warn!("NATS_URL not set, using in-process queue");
            Ok(Arc::new(MemoryTransport::new()))
        }
        (None, app) => bail!("NATS_URL is required for --app {}", app.as_str()),
    }
}

fn spawn_bot(
    cfg: &Config,
    bridge: QueueBridge,
    stop: watch::Receiver<bool>,
) -> JoinHandle<Result<(), BridgeError>> {
    let resolver = Arc::new(QuoteResolver::new(HttpQuoteSource::new(cfg.quote_url.clone())));
    tokio::spawn(bot::run(bridge, resolver, stop))
}

async fn run_chat(
    cfg: &Config,
    bridge: QueueBridge,
    stop: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let secret = cfg.jwt_secret.clone().context("JWT_SECRET is required for the chat server")?;
    let store = Store::connect(&cfg.database_url).await.context("open database")?;
    let hub = state::new_hub();

    let relay_task = tokio::spawn(relay::run(bridge.clone(), hub.clone(), stop.clone()));

    let app = routes::app(
        AppState {
            store,
            hub: hub.clone(),
            bridge,
            secret: JwtSecret(secret.into()),
            history: HistoryLimit(cfg.history_limit),
            stop: Shutdown(stop.clone()),
        },
        &cfg.static_dir,
    );

    let listener = tokio::net::TcpListener::bind(cfg.bind.as_str()).await?;
    info!("Chat server is running on http://{}", listener.local_addr()?);
    serve_until(listener, app, stop).await?;

    // Upgraded sockets outlive `serve`; they see the same flag and deregister.
    drain_sessions(&hub).await;
    join("relay", relay_task).await;
    Ok(())
}

async fn run_text(cfg: &Config, stop: watch::Receiver<bool>) -> anyhow::Result<()> {
    let store = Store::connect(&cfg.database_url).await.context("open database")?;
    let listener = tokio::net::TcpListener::bind(cfg.text_bind.as_str()).await?;
    info!("Text server is running on http://{}", listener.local_addr()?);
    serve_until(listener, routes::text_app(store), stop).await
}

async fn serve_until(
    listener: tokio::net::TcpListener,
    app: axum::Router,
    mut stop: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = stop.wait_for(|s| *s).await;
        })
        .await?;
    Ok(())
}

async fn drain_sessions(hub: &Hub) {
    let deadline = Instant::now() + SESSION_DRAIN;
    while hub.registry().room_count().await > 0 {
        if Instant::now() >= deadline {
            warn!("sessions still open after {SESSION_DRAIN:?}, exiting anyway");
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    info!("all sessions closed");
}

async fn join(name: &str, task: JoinHandle<Result<(), BridgeError>>) {
    match task.await {
        Ok(Ok(()))  => info!("{name} loop stopped"),
        Ok(Err(e))  => error!("{name} loop failed: {e}"),
        Err(e)      => error!("{name} loop panicked: {e}"),
    }
}
