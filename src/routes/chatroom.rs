use axum::{
    extract::{Extension, Json, Query},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::AuthUser;
use crate::{
    error::{bad, AppErr, AppResult},
    hub::{ChatroomId, Envelope},
    state::{HistoryLimit, Hub},
    store::Store,
};

#[derive(Deserialize)]
struct CreateInput { name: String }

#[derive(Deserialize)]
struct PostInput { chatroom_id: ChatroomId, content: String }

#[derive(Deserialize)]
struct RoomQuery { chatroom_id: Option<String> }

pub fn router() -> Router {
    Router::new()
        .route("/chatroom/create", post(create))
        .route("/chatroom/list", get(list))
        .route("/chatroom/post_message", post(post_message))
        .route("/chatroom/messages", get(messages))
}

/// Positive integer room id from a query string value.
pub fn parse_room(raw: Option<&str>) -> AppResult<ChatroomId> {
    let raw = raw.filter(|s| !s.is_empty()).ok_or_else(|| bad("Missing chatroom_id"))?;
    match raw.parse::<ChatroomId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(bad("Invalid chatroom_id")),
    }
}

async fn create(
    _user: AuthUser,
    Extension(store): Extension<Store>,
    Json(p): Json<CreateInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let name = p.name.trim();
    if name.is_empty() {
        return Err(bad("Invalid request body"));
    }
    let id = store.create_chatroom(name).await?;
    Ok((StatusCode::CREATED, Json(json!({ "chatroom_id": id }))))
}

async fn list(
    _user: AuthUser,
    Extension(store): Extension<Store>,
) -> AppResult<Json<Value>> {
    let rooms = store.list_chatrooms().await?;
    Ok(Json(json!({ "chatrooms": rooms })))
}

async fn post_message(
    user: AuthUser,
    Extension(store): Extension<Store>,
    Extension(hub): Extension<Hub>,
    Json(p): Json<PostInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if p.chatroom_id <= 0 || p.content.is_empty() {
        return Err(bad("Invalid request body"));
    }
    if !store.chatroom_exists(p.chatroom_id).await? {
        return Err(AppErr::NotFound(format!("chatroom {}", p.chatroom_id)));
    }

    let msg = store.append_message(p.chatroom_id, user.id, &p.content).await?;
    hub.broadcast_envelope(&Envelope::for_message(&msg, &user.username)).await;

    Ok((StatusCode::CREATED, Json(json!({ "message": "Message posted successfully" }))))
}

async fn messages(
    _user: AuthUser,
    Extension(store): Extension<Store>,
    Extension(limit): Extension<HistoryLimit>,
    Query(q): Query<RoomQuery>,
) -> AppResult<Json<Value>> {
    let room = parse_room(q.chatroom_id.as_deref())?;
    let msgs = store.recent_messages(room, limit.0).await?;
    Ok(Json(json!({ "messages": msgs })))
}
