use clap::Parser;
use tracing_subscriber::EnvFilter;

use stock_chat::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    stock_chat::app::run(Config::parse()).await
}
