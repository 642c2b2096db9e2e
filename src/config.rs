use clap::{Parser, ValueEnum};

use crate::bot::quote::DEFAULT_QUOTE_URL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum App {
    /// HTTP + WebSocket server and the stock response relay.
    Chat,
    /// Stock quote worker.
    Bot,
    /// Both in one process.
    All,
    /// Shared text-room server, no queue involved.
    Text,
}

impl App {
    pub fn as_str(self) -> &'static str {
        match self {
            App::Chat => "chat",
            App::Bot  => "bot",
            App::All  => "all",
            App::Text => "text",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "stock_chat", version, about = "Chatrooms with an out-of-process stock quote bot")]
pub struct Config {
    /// Which process to run
    #[arg(long, value_enum, env = "CHAT_APP")]
    pub app: App,

    /// Listen address for the chat server
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Listen address for the text-room server
    #[arg(long, env = "TEXT_BIND_ADDR", default_value = "0.0.0.0:8082")]
    pub text_bind: String,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://chat.db?mode=rwc")]
    pub database_url: String,

    /// HS256 signing secret; required by the chat server
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// NATS server; without it `--app all` falls back to an in-process queue
    #[arg(long, env = "NATS_URL")]
    pub nats_url: Option<String>,

    /// Quote endpoint, `{code}` is replaced by the normalized ticker
    #[arg(long, env = "QUOTE_URL", default_value = DEFAULT_QUOTE_URL)]
    pub quote_url: String,

    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    pub static_dir: String,

    /// Messages returned by /chatroom/messages
    #[arg(long, env = "HISTORY_LIMIT", default_value_t = 50)]
    pub history_limit: i64,
}
