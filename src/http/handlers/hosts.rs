use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::Result;
use crate::auth::Operator;
use crate::config::Context;
use crate::error::Error;
use crate::model::group::{add_to_list, remove_from_list};
use crate::model::inventory::DEFAULT_INVENTORY;
use crate::model::{Host, HostFileConfig, HostKey, Inventory, NewHost, NewHostFileConfig, UpdateHost, User};

pub fn router() -> Router<Arc<Context>> {
    Router::new()
        .route("/hosts", get(list_all))
        .route("/hosts/assigned", get(list_assigned))
        .route("/hosts/{name}", get(get_by_name).put(update).delete(soft_delete))
        .route("/hosts/{name}/force", delete(force_delete))
        .route("/hosts/{name}/updateTo/{version}", post(update_to))
        .route("/hosts/{name}/enable/{service}", post(enable_service))
        .route("/hosts/{name}/disable/{service}", post(disable_service))
        .route("/hosts/{name}/status/{service}", get(service_status))
        .route(
            "/hosts/{name}/config",
            get(list_configs).post(upsert_config).put(upsert_config),
        )
        .route("/hosts/{name}/config/{filename}", delete(delete_config))
}

/// Host as shown to operators: `status` is the computed label, not the raw
/// agent-reported string.
#[derive(Debug, Serialize)]
pub struct HostView {
    pub id: i64,
    pub name: String,
    pub ip_address: String,
    pub os: String,
    pub inventory: String,
    pub groups: String,
    pub installed_components: String,
    pub disabled_components: String,
    pub monokit_version: String,
    pub wants_update_to: String,
    pub status: String,
    pub up_for_deletion: bool,
    pub awx_host_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HostView {
    fn from_host(host: Host, now: DateTime<Utc>) -> Self {
        let status = host.display_status(now);
        HostView {
            id: host.id,
            name: host.name,
            ip_address: host.ip_address,
            os: host.os,
            inventory: host.inventory,
            groups: host.groups,
            installed_components: host.installed_components,
            disabled_components: host.disabled_components,
            monokit_version: host.monokit_version,
            wants_update_to: host.wants_update_to,
            status,
            up_for_deletion: host.up_for_deletion,
            awx_host_id: host.awx_host_id,
            created_at: host.created_at,
            updated_at: host.updated_at,
        }
    }
}

/// Listing visibility: engine-only mirror hosts are never shown, and
/// non-admins only see hosts in their inventories.
fn can_list(user: &User, host: &Host) -> bool {
    !host.awx_only && user.can_see_inventory(&host.inventory)
}

/// Readers take the current snapshot; the store is only consulted when the
/// snapshot has nothing to offer (first request after a failed refresh).
async fn snapshot_hosts(ctx: &Context) -> Result<Vec<Host>> {
    let snapshot = ctx.hosts.snapshot();
    if !snapshot.is_empty() {
        return Ok(snapshot.as_ref().clone());
    }
    let mut conn = ctx.pool.conn().await?;
    Host::list_all(&mut conn).await
}

/// Single-host read: snapshot first, then the cache mirror, then the store.
async fn find_host(ctx: &Context, name: &str) -> Result<Host> {
    if let Some(host) = ctx.hosts.find(name) {
        return Ok(host);
    }
    let cached = ctx
        .cache
        .get(&format!("host:{name}"))
        .await
        .and_then(|raw| serde_json::from_str::<Host>(&raw).ok());
    if let Some(host) = cached {
        return Ok(host);
    }
    let mut conn = ctx.pool.conn().await?;
    Host::by_name(name, &mut conn).await
}

#[derive(Debug, Deserialize)]
pub struct RegisterHostRequest {
    pub name: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub inventory: Option<String>,
    #[serde(default)]
    pub groups: Option<String>,
    #[serde(default)]
    pub installed_components: Option<String>,
    #[serde(default)]
    pub disabled_components: Option<String>,
    #[serde(default)]
    pub monokit_version: Option<String>,
    #[serde(default)]
    pub wants_update_to: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub awx_only: Option<bool>,
    #[serde(default)]
    pub awx_host_id: Option<String>,
}

/// Name-keyed register-or-update. New names mint a host key; existing names
/// must prove ownership with theirs. `id` and `up_for_deletion` survive
/// updates, and an omitted inventory carries over.
pub async fn register(
    State(ctx): State<Arc<Context>>,
    headers: HeaderMap,
    Json(request): Json<RegisterHostRequest>,
) -> Result<impl IntoResponse> {
    if request.name.trim().is_empty() {
        return Err(Error::validation("host name must not be empty"));
    }

    let mut conn = ctx.pool.conn().await?;
    if let Some(existing) = Host::maybe_by_name(&request.name, &mut conn).await? {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(Error::Unauthenticated)?;
        if !HostKey::grants(token, &existing.name, &mut conn).await? {
            return Err(Error::Unauthenticated);
        }

        if let Some(inventory) = &request.inventory {
            Inventory::ensure(inventory, &mut conn).await?;
        }
        let update = UpdateHost {
            ip_address: request.ip_address,
            os: request.os,
            inventory: request.inventory,
            groups: request.groups,
            installed_components: request.installed_components,
            disabled_components: request.disabled_components,
            monokit_version: request.monokit_version,
            wants_update_to: request.wants_update_to,
            status: request.status,
            awx_only: request.awx_only,
            awx_host_id: request.awx_host_id,
            updated_at: Utc::now(),
        };
        let host = update.apply(&existing.name, &mut conn).await?;
        ctx.hosts.refresh(&mut conn).await?;
        return Ok((StatusCode::OK, Json(json!({ "host": host }))));
    }

    let inventory = request
        .inventory
        .unwrap_or_else(|| DEFAULT_INVENTORY.to_string());
    Inventory::ensure(&inventory, &mut conn).await?;

    let host = NewHost {
        name: request.name,
        ip_address: request.ip_address.unwrap_or_default(),
        os: request.os.unwrap_or_default(),
        inventory,
        groups: request.groups.unwrap_or_else(|| "nil".to_string()),
        installed_components: request.installed_components.unwrap_or_default(),
        disabled_components: request
            .disabled_components
            .unwrap_or_else(|| "nil".to_string()),
        monokit_version: request.monokit_version.unwrap_or_default(),
        wants_update_to: request.wants_update_to.unwrap_or_default(),
        status: request.status.unwrap_or_else(|| "Online".to_string()),
        up_for_deletion: false,
        awx_only: request.awx_only.unwrap_or(false),
        awx_host_id: request.awx_host_id.unwrap_or_default(),
    }
    .create(&mut conn)
    .await?;

    let key = HostKey::mint(&host.name, &mut conn).await?;
    ctx.hosts.refresh(&mut conn).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "host": host, "host_key": key.token })),
    ))
}

/// Full fleet listing. Doubles as the scheduled-deletion sweep: hosts
/// marked for deletion whose heartbeat went stale are removed first, then
/// the refreshed snapshot serves the read.
async fn list_all(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
) -> Result<Json<Vec<HostView>>> {
    {
        let mut conn = ctx.pool.conn().await?;
        let swept = Host::sweep_scheduled(&mut conn).await?;
        if !swept.is_empty() {
            tracing::info!("swept {} hosts scheduled for deletion: {swept:?}", swept.len());
            ctx.hosts.refresh(&mut conn).await?;
        }
    }

    let now = Utc::now();
    let hosts = snapshot_hosts(&ctx)
        .await?
        .into_iter()
        .filter(|host| can_list(&user, host))
        .map(|host| HostView::from_host(host, now))
        .collect();
    Ok(Json(hosts))
}

async fn list_assigned(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
) -> Result<Json<Vec<HostView>>> {
    let now = Utc::now();
    let hosts = snapshot_hosts(&ctx)
        .await?
        .into_iter()
        .filter(|host| can_list(&user, host))
        .map(|host| HostView::from_host(host, now))
        .collect();
    Ok(Json(hosts))
}

async fn get_by_name(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(name): Path<String>,
) -> Result<Json<HostView>> {
    let host = find_host(&ctx, &name).await?;
    if !user.can_see_inventory(&host.inventory) {
        return Err(Error::NotFound("host"));
    }
    Ok(Json(HostView::from_host(host, Utc::now())))
}

#[derive(Debug, Deserialize)]
pub struct UpdateHostRequest {
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub inventory: Option<String>,
    #[serde(default)]
    pub groups: Option<String>,
    #[serde(default)]
    pub installed_components: Option<String>,
    #[serde(default)]
    pub disabled_components: Option<String>,
    #[serde(default)]
    pub monokit_version: Option<String>,
    #[serde(default)]
    pub wants_update_to: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

async fn update(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(name): Path<String>,
    Json(request): Json<UpdateHostRequest>,
) -> Result<Json<Host>> {
    let mut conn = ctx.pool.conn().await?;
    let host = Host::by_name(&name, &mut conn).await?;
    if !user.can_see_inventory(&host.inventory) {
        return Err(Error::NotFound("host"));
    }
    if let Some(inventory) = &request.inventory {
        if Inventory::by_name(inventory, &mut conn).await?.is_none() {
            return Err(Error::NotFound("inventory"));
        }
    }

    let update = UpdateHost {
        ip_address: request.ip_address,
        os: request.os,
        inventory: request.inventory,
        groups: request.groups,
        installed_components: request.installed_components,
        disabled_components: request.disabled_components,
        monokit_version: request.monokit_version,
        wants_update_to: request.wants_update_to,
        status: request.status,
        awx_only: None,
        awx_host_id: None,
        updated_at: Utc::now(),
    };
    let host = update.apply(&name, &mut conn).await?;
    ctx.hosts.refresh(&mut conn).await?;
    Ok(Json(host))
}

async fn soft_delete(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = ctx.pool.conn().await?;
    let host = Host::by_name(&name, &mut conn).await?;
    if !user.can_see_inventory(&host.inventory) {
        return Err(Error::NotFound("host"));
    }
    Host::delete(&name, &mut conn).await?;
    ctx.hosts.refresh(&mut conn).await?;
    Ok(Json(json!({ "status": "deleted", "host": name })))
}

/// Cascading unscoped delete: host row, keys, and file configs all go,
/// soft-deleted or not.
async fn force_delete(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = ctx.pool.conn().await?;
    let host = Host::by_name_any(&name, &mut conn)
        .await?
        .ok_or(Error::NotFound("host"))?;
    if !user.can_see_inventory(&host.inventory) {
        return Err(Error::NotFound("host"));
    }
    Host::force_delete(&name, &mut conn).await?;
    ctx.hosts.refresh(&mut conn).await?;
    Ok(Json(json!({ "status": "deleted", "host": name })))
}

async fn update_to(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path((name, version)): Path<(String, String)>,
) -> Result<Json<Host>> {
    let mut conn = ctx.pool.conn().await?;
    let host = Host::by_name(&name, &mut conn).await?;
    if !user.can_see_inventory(&host.inventory) {
        return Err(Error::NotFound("host"));
    }
    let host = Host::set_wanted_version(&name, &version, &mut conn).await?;
    ctx.hosts.refresh(&mut conn).await?;
    Ok(Json(host))
}

async fn enable_service(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path((name, service)): Path<(String, String)>,
) -> Result<Json<Host>> {
    set_service_state(&ctx, &user, &name, &service, true).await
}

async fn disable_service(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path((name, service)): Path<(String, String)>,
) -> Result<Json<Host>> {
    set_service_state(&ctx, &user, &name, &service, false).await
}

/// Component state lives in the `::`-joined `disabled_components` string;
/// removing the last entry resets it to `nil`.
async fn set_service_state(
    ctx: &Context,
    user: &User,
    name: &str,
    service: &str,
    enable: bool,
) -> Result<Json<Host>> {
    let mut conn = ctx.pool.conn().await?;
    let host = Host::by_name(name, &mut conn).await?;
    if !user.can_see_inventory(&host.inventory) {
        return Err(Error::NotFound("host"));
    }

    let disabled = if enable {
        remove_from_list(&host.disabled_components, service, ':', "::")
    } else {
        add_to_list(&host.disabled_components, service, ':', "::")
    };
    let host = Host::set_disabled_components(name, &disabled, &mut conn).await?;
    ctx.hosts.refresh(&mut conn).await?;
    Ok(Json(host))
}

async fn service_status(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path((name, service)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = ctx.pool.conn().await?;
    let host = Host::by_name(&name, &mut conn).await?;
    if !user.can_see_inventory(&host.inventory) {
        return Err(Error::NotFound("host"));
    }
    Ok(Json(json!({
        "host": name,
        "service": service,
        "disabled": host.component_disabled(&service),
    })))
}

async fn list_configs(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(name): Path<String>,
) -> Result<Json<Vec<HostFileConfig>>> {
    let mut conn = ctx.pool.conn().await?;
    let host = Host::by_name(&name, &mut conn).await?;
    if !user.can_see_inventory(&host.inventory) {
        return Err(Error::NotFound("host"));
    }
    let configs = HostFileConfig::by_host(&name, &mut conn).await?;
    Ok(Json(configs))
}

#[derive(Debug, Deserialize)]
pub struct FileConfigRequest {
    pub file_name: String,
    pub content: String,
}

async fn upsert_config(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(name): Path<String>,
    Json(request): Json<FileConfigRequest>,
) -> Result<Json<HostFileConfig>> {
    if request.file_name.trim().is_empty() {
        return Err(Error::validation("file_name must not be empty"));
    }
    let mut conn = ctx.pool.conn().await?;
    let host = Host::by_name(&name, &mut conn).await?;
    if !user.can_see_inventory(&host.inventory) {
        return Err(Error::NotFound("host"));
    }
    let config = NewHostFileConfig {
        host_name: name,
        file_name: request.file_name,
        content: request.content,
    }
    .upsert(&mut conn)
    .await?;
    Ok(Json(config))
}

async fn delete_config(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path((name, filename)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = ctx.pool.conn().await?;
    let host = Host::by_name(&name, &mut conn).await?;
    if !user.can_see_inventory(&host.inventory) {
        return Err(Error::NotFound("host"));
    }
    if HostFileConfig::delete(&name, &filename, &mut conn).await? == 0 {
        return Err(Error::NotFound("config"));
    }
    Ok(Json(json!({ "status": "deleted", "file_name": filename })))
}
