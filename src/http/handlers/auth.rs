use std::sync::Arc;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::auth::Operator;
use crate::config::Context;
use crate::error::Error;
use crate::model::User;

pub fn router() -> Router<Arc<Context>> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub timeout: DateTime<Utc>,
}

/// Unauthenticated entry point; credentials are checked against the local
/// user table.
pub async fn login(
    State(ctx): State<Arc<Context>>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let mut conn = ctx.pool.conn().await?;
    let user = User::maybe_by_username(&request.username, &mut conn)
        .await?
        .ok_or(Error::Unauthenticated)?;
    drop(conn);
    user.verify_password(&request.password)?;

    let session = ctx.sessions.issue(&user).await?;
    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token: session.token,
            timeout: session.timeout,
        }),
    ))
}

/// Revokes the presented session in both tiers.
async fn logout(State(ctx): State<Arc<Context>>, headers: HeaderMap) -> Result<impl IntoResponse> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(Error::Unauthenticated)?;
    let token = header.strip_prefix("Bearer ").map(str::trim).unwrap_or(header);

    if ctx.sessions.revoke(token).await? == 0 {
        // Legacy tolerance mirrors the lookup path.
        ctx.sessions.revoke(header).await?;
    }
    Ok(Json(serde_json::json!({ "status": "logged_out" })))
}

async fn me(Operator(user): Operator) -> Json<User> {
    Json(user)
}
