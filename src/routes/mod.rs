use axum::{extract::DefaultBodyLimit, Extension, Router};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir};

use crate::{state::AppState, store::Store};

pub mod auth;
pub mod chatroom;
pub mod text;
pub mod ws;

const BODY_LIMIT: usize = 64 * 1024;

pub fn router() -> Router {
    Router::new()
        .merge(auth::router())
        .merge(chatroom::router())
        .merge(ws::router())
}

/// Full chat-process app: API + WebSocket + static files.
pub fn app(state: AppState, static_dir: &str) -> Router {
    router()
        .fallback_service(ServeDir::new(static_dir))
        .layer(Extension(state.store))
        .layer(Extension(state.hub))
        .layer(Extension(state.bridge))
        .layer(Extension(state.secret))
        .layer(Extension(state.history))
        .layer(Extension(state.stop))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(CorsLayer::permissive())
}

/// Text-room server; its own process and port.
pub fn text_app(store: Store) -> Router {
    text::router()
        .layer(Extension(store))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(CorsLayer::permissive())
}
