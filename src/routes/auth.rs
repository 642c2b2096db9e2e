//! routes/auth.rs
use axum::{
    async_trait,
    extract::{Extension, FromRequestParts, Json},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{bad, unauthorized, AppErr, AppResult},
    state::JwtSecret,
    store::Store,
    utils::jwt,
};

#[derive(Deserialize)]
struct AuthInput {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct TokenJson {
    token: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Caller identity taken from `Authorization: Bearer <jwt>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id:       i64,
    pub username: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppErr;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let secret = parts
            .extensions
            .get::<JwtSecret>()
            .cloned()
            .ok_or_else(|| AppErr::Internal("jwt secret not configured".into()))?;

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| unauthorized("missing bearer token"))?;

        let claims = jwt::verify(token, &secret.0)?;
        Ok(AuthUser { id: claims.sub, username: claims.username })
    }
}

fn check(p: &AuthInput) -> AppResult<()> {
    if p.username.trim().is_empty() || p.password.is_empty() {
        return Err(bad("username and password are required"));
    }
    Ok(())
}

/* ---------------- Register ---------------- */
async fn register(
    Extension(store): Extension<Store>,
    Json(p): Json<AuthInput>,
) -> AppResult<impl IntoResponse> {
    check(&p)?;
    let id = store.register(p.username.trim(), &p.password).await?;
    info!(user = id, "registered");
    Ok(StatusCode::CREATED)
}

/* ---------------- Login ---------------- */
async fn login(
    Extension(store): Extension<Store>,
    Extension(secret): Extension<JwtSecret>,
    Json(p): Json<AuthInput>,
) -> AppResult<Json<TokenJson>> {
    check(&p)?;
    let username = p.username.trim();
    let id = store.authenticate(username, &p.password).await?;
    let token = jwt::sign(id, username, &secret.0)?;
    Ok(Json(TokenJson { token }))
}
