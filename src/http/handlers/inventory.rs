use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::Result;
use crate::auth::Operator;
use crate::config::Context;
use crate::error::Error;
use crate::model::Inventory;
use crate::model::inventory::DEFAULT_INVENTORY;

pub fn router() -> Router<Arc<Context>> {
    Router::new()
        .route("/inventory", get(list).post(create))
        .route("/inventory/{name}", axum::routing::delete(remove))
}

async fn list(State(ctx): State<Arc<Context>>, _operator: Operator) -> Result<Json<Vec<Inventory>>> {
    let mut conn = ctx.pool.conn().await?;
    Ok(Json(Inventory::list(&mut conn).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateInventoryRequest {
    pub name: String,
}

async fn create(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Json(request): Json<CreateInventoryRequest>,
) -> Result<impl IntoResponse> {
    if !user.is_admin() {
        return Err(Error::Forbidden);
    }
    if request.name.trim().is_empty() {
        return Err(Error::validation("inventory name must not be empty"));
    }
    let mut conn = ctx.pool.conn().await?;
    if Inventory::by_name(&request.name, &mut conn).await?.is_some() {
        return Err(Error::conflict(format!(
            "inventory `{}` already exists",
            request.name
        )));
    }
    let inventory = Inventory::create(&request.name, &mut conn).await?;
    Ok((StatusCode::CREATED, Json(inventory)))
}

async fn remove(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if !user.is_admin() {
        return Err(Error::Forbidden);
    }
    if name == DEFAULT_INVENTORY {
        return Err(Error::validation("the default inventory cannot be deleted"));
    }
    let mut conn = ctx.pool.conn().await?;
    if Inventory::delete(&name, &mut conn).await? == 0 {
        return Err(Error::NotFound("inventory"));
    }
    Ok(Json(json!({ "status": "deleted", "inventory": name })))
}
