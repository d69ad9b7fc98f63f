use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Map, Value};

use crate::Result;
use crate::auth::Operator;
use crate::config::Context;
use crate::error::Error;
use crate::health;
use crate::model::{Host, User};

pub fn router() -> Router<Arc<Context>> {
    Router::new()
        .route("/health/tools", get(tools))
        .route("/hosts/{name}/health", get(aggregate))
        .route("/hosts/{name}/health/{tool}", get(tool))
}

/// Names of locally registered health providers.
async fn tools(_operator: Operator) -> Json<Vec<String>> {
    Json(health::list())
}

async fn check_visibility(
    ctx: &Context,
    user: &User,
    name: &str,
    conn: &mut crate::database::Conn<'_>,
) -> Result<()> {
    match Host::maybe_by_name(name, conn).await? {
        Some(host) if user.can_see_inventory(&host.inventory) => Ok(()),
        Some(_) => Err(Error::NotFound("host")),
        // The control plane's own host may not be registered; health for it
        // still resolves through local providers.
        None if ctx.is_self_host(name) => Ok(()),
        None => Err(Error::NotFound("host")),
    }
}

async fn aggregate(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(name): Path<String>,
) -> Result<Json<Map<String, Value>>> {
    let mut conn = ctx.pool.conn().await?;
    check_visibility(&ctx, &user, &name, &mut conn).await?;
    let merged = health::aggregate(&name, ctx.is_self_host(&name), &mut conn).await?;
    Ok(Json(merged))
}

async fn tool(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path((name, tool)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let mut conn = ctx.pool.conn().await?;
    check_visibility(&ctx, &user, &name, &mut conn).await?;

    let cache_key = format!("health:{name}:{tool}");
    if let Some(raw) = ctx.cache.get(&cache_key).await {
        if let Ok(value) = serde_json::from_str(&raw) {
            return Ok(Json(value));
        }
    }

    let value = health::tool(&name, &tool, ctx.is_self_host(&name), &mut conn).await?;
    ctx.cache
        .set(&cache_key, &value.to_string(), ctx.config.cache.health_ttl)
        .await;
    Ok(Json(value))
}
