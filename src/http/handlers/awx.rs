use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::Result;
use crate::auth::Operator;
use crate::awx::{LaunchRequest, LaunchResponse};
use crate::config::Context;
use crate::error::Error;
use crate::model::{Host, User};

pub fn router() -> Router<Arc<Context>> {
    Router::new()
        .route("/awx/templates", get(job_templates))
        .route("/awx/workflow-templates", get(workflow_templates))
        .route("/awx/jobs/{id}", get(job_status))
        .route("/hosts/{name}/awx-job", post(launch_job))
        .route("/hosts/{name}/awx-workflow", post(launch_workflow))
        .route("/hosts/{name}/awx-logs/{job_id}", get(job_logs))
        .route("/hosts/{name}/awx-ensure", post(ensure_host))
}

async fn job_templates(
    State(ctx): State<Arc<Context>>,
    _operator: Operator,
) -> Result<Json<Vec<Value>>> {
    Ok(Json(ctx.awx()?.job_templates().await?))
}

async fn workflow_templates(
    State(ctx): State<Arc<Context>>,
    _operator: Operator,
) -> Result<Json<Vec<Value>>> {
    Ok(Json(ctx.awx()?.workflow_templates().await?))
}

/// Upstream job JSON, passed through.
async fn job_status(
    State(ctx): State<Arc<Context>>,
    _operator: Operator,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    Ok(Json(ctx.awx()?.job_status(id).await?))
}

async fn visible_host(ctx: &Context, user: &User, name: &str) -> Result<Host> {
    let mut conn = ctx.pool.conn().await?;
    let host = Host::by_name(name, &mut conn).await?;
    if !user.can_see_inventory(&host.inventory) {
        return Err(Error::NotFound("host"));
    }
    Ok(host)
}

async fn launch_job(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(name): Path<String>,
    Json(request): Json<LaunchRequest>,
) -> Result<Json<LaunchResponse>> {
    let host = visible_host(&ctx, &user, &name).await?;
    Ok(Json(ctx.awx()?.launch_job(&host, &request).await?))
}

async fn launch_workflow(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(name): Path<String>,
    Json(request): Json<LaunchRequest>,
) -> Result<Json<LaunchResponse>> {
    let host = visible_host(&ctx, &user, &name).await?;
    Ok(Json(ctx.awx()?.launch_workflow(&host, &request).await?))
}

/// Makes sure the engine knows the host; returns the engine host id.
async fn ensure_host(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let host = visible_host(&ctx, &user, &name).await?;
    let awx_host_id = ctx.awx()?.ensure_host(&host.name, &host.ip_address).await?;
    Ok(Json(json!({ "host": host.name, "awx_host_id": awx_host_id })))
}

#[derive(Debug, Deserialize)]
pub struct JobLogParams {
    /// Defaults to on; pass `focus_host=false` for the raw engine output.
    pub focus_host: Option<bool>,
}

async fn job_logs(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path((name, job_id)): Path<(String, i64)>,
    Query(params): Query<JobLogParams>,
) -> Result<String> {
    let host = visible_host(&ctx, &user, &name).await?;
    let focus = params.focus_host.unwrap_or(true);
    ctx.awx()?.job_logs(job_id, &host.name, focus).await
}
