use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::Result;
use crate::auth::AgentHost;
use crate::config::Context;
use crate::error::Error;
use crate::health;
use crate::logbuf::LogSubmission;
use crate::model::{Host, HostFileConfig, NewHostFileConfig};

use super::hosts::FileConfigRequest;

/// Agent-facing surface. The host name always comes from the authenticated
/// host key; agents cannot write on behalf of other hosts.
pub fn router() -> Router<Arc<Context>> {
    Router::new()
        .route("/logs", post(submit_log))
        .route("/config", get(list_configs).put(upsert_config))
        .route("/health/{tool}", post(post_health))
        .route("/status/{service}", get(service_status))
}

/// Accepts a log record into the ingest buffer. `202` is the commitment
/// point; durability follows within the flush window.
async fn submit_log(
    State(ctx): State<Arc<Context>>,
    AgentHost(host_name): AgentHost,
    Json(submission): Json<LogSubmission>,
) -> Result<impl IntoResponse> {
    let record = submission.validate(&host_name)?;
    ctx.logs.submit(record)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}

async fn list_configs(
    State(ctx): State<Arc<Context>>,
    AgentHost(host_name): AgentHost,
) -> Result<Json<Vec<HostFileConfig>>> {
    let mut conn = ctx.pool.conn().await?;
    let configs = HostFileConfig::by_host(&host_name, &mut conn).await?;
    Ok(Json(configs))
}

async fn upsert_config(
    State(ctx): State<Arc<Context>>,
    AgentHost(host_name): AgentHost,
    Json(request): Json<FileConfigRequest>,
) -> Result<Json<HostFileConfig>> {
    if request.file_name.trim().is_empty() {
        return Err(Error::validation("file_name must not be empty"));
    }
    let mut conn = ctx.pool.conn().await?;
    let config = NewHostFileConfig {
        host_name,
        file_name: request.file_name,
        content: request.content,
    }
    .upsert(&mut conn)
    .await?;
    Ok(Json(config))
}

/// Raw body: must parse as JSON but is stored as delivered.
async fn post_health(
    State(ctx): State<Arc<Context>>,
    AgentHost(host_name): AgentHost,
    Path(tool): Path<String>,
    body: String,
) -> Result<impl IntoResponse> {
    let mut conn = ctx.pool.conn().await?;
    let row = health::post(&host_name, &tool, &body, &mut conn).await?;
    // Fresh data beats whatever the read path mirrored.
    ctx.cache
        .delete(&format!("health:{host_name}:{tool}"))
        .await;
    Ok((StatusCode::OK, Json(json!({ "status": "ok", "tool": row.tool_name }))))
}

async fn service_status(
    State(ctx): State<Arc<Context>>,
    AgentHost(host_name): AgentHost,
    Path(service): Path<String>,
) -> Result<Json<serde_json::Value>> {
    // The snapshot is good enough here; agents poll this on every check.
    let host = match ctx.hosts.find(&host_name) {
        Some(host) => host,
        None => {
            let mut conn = ctx.pool.conn().await?;
            Host::by_name(&host_name, &mut conn).await?
        }
    };
    Ok(Json(json!({
        "host": host_name,
        "service": service,
        "disabled": host.component_disabled(&service),
        "wants_update_to": host.wants_update_to,
    })))
}
