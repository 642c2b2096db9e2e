//! Shared text rooms: one current body per room id, replaced wholesale.
use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    error::{bad, AppErr, AppResult},
    store::Store,
};

#[derive(Deserialize)]
struct TextInput { content: String }

pub fn router() -> Router {
    Router::new().route("/text/:room_id", get(read).post(write))
}

async fn read(
    Extension(store): Extension<Store>,
    Path(room): Path<String>,
) -> AppResult<Json<Value>> {
    let content = store
        .text_room(&room)
        .await?
        .ok_or_else(|| AppErr::NotFound("Room not found".into()))?;
    Ok(Json(json!({ "content": content })))
}

async fn write(
    Extension(store): Extension<Store>,
    Path(room): Path<String>,
    body: Result<Json<TextInput>, JsonRejection>,
) -> AppResult<StatusCode> {
    let Json(p) = body.map_err(|_| bad("Invalid request body"))?;
    store.put_text_room(&room, &p.content).await?;
    debug!(%room, "text room updated");
    Ok(StatusCode::NO_CONTENT)
}
