use axum::{http::StatusCode, response::IntoResponse};
use std::fmt::Display;

pub type AppResult<T> = Result<T, AppErr>;

/* ── HTTP / WebSocket upgrade 層 ── */
#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("Bad request: {0}")]
    Bad(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("DB: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Internal: {0}")]
    Internal(String),
}

impl IntoResponse for AppErr {
    fn into_response(self) -> axum::response::Response {
        let (code, body) = match self {
            AppErr::Bad(msg)          => (StatusCode::BAD_REQUEST, msg),
            AppErr::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppErr::NotFound(msg)     => (StatusCode::NOT_FOUND, msg),
            other                     => {
                tracing::error!("request failed: {other}");
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };
        (code, body).into_response()
    }
}

/* ── 小助手：把任何 error 轉成 Bad / Unauthorized ── */
pub fn bad<E: Display>(e: E) -> AppErr { AppErr::Bad(e.to_string()) }
pub fn unauthorized<E: Display>(e: E) -> AppErr { AppErr::Unauthorized(e.to_string()) }

/* ── 單一連線寫入失敗（broadcast 會據此踢除） ── */
#[derive(thiserror::Error, Debug)]
pub enum HubError {
    #[error("write failed: {0}")]
    Write(String),

    #[error("connection already closed")]
    Closed,
}

/* ── 佇列橋接 ── */
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("connect: {0}")]
    Connect(String),

    #[error("declare {topic}: {reason}")]
    Declare { topic: &'static str, reason: String },

    #[error("publish to {topic}: {reason}")]
    Publish { topic: &'static str, reason: String },

    #[error("consume from {topic}: {reason}")]
    Consume { topic: &'static str, reason: String },

    #[error("encode: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode: {0}")]
    Decode(#[source] serde_json::Error),
}

/* ── 報價端點 ── */
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("fetch: {0}")]
    Fetch(String),

    #[error("read: {0}")]
    Read(String),
}
