use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::Result;
use crate::auth::Operator;
use crate::config::Context;
use crate::error::Error;
use crate::model::group::{add_to_list, remove_from_list};
use crate::model::user::hash_password;
use crate::model::{Group, Host, Inventory, NewUser, UpdateUser, User, UserRole};

/// Admin-only surface; the `require_admin` gate wraps the whole router.
pub fn router() -> Router<Arc<Context>> {
    Router::new()
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/{name}", delete(delete_group))
        .route(
            "/groups/{name}/hosts/{host}",
            post(add_host_to_group).delete(remove_host_from_group),
        )
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{username}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{username}/groups", put(update_user_groups))
        .route("/hosts/{name}/schedule", post(schedule_deletion))
        .route("/hosts/{name}/move/{inventory}", post(move_to_inventory))
}

async fn list_groups(State(ctx): State<Arc<Context>>) -> Result<Json<Vec<Group>>> {
    let mut conn = ctx.pool.conn().await?;
    Ok(Json(Group::list(&mut conn).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

async fn create_group(
    State(ctx): State<Arc<Context>>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse> {
    if request.name.trim().is_empty() {
        return Err(Error::validation("group name must not be empty"));
    }
    let mut conn = ctx.pool.conn().await?;
    let group = Group::create(&request.name, &mut conn).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteGroupParams {
    #[serde(rename = "withHosts", default)]
    pub with_hosts: bool,
}

/// Deletes the group, rewriting every member host's groups string; with
/// `withHosts=true` the member hosts are removed as well.
async fn delete_group(
    State(ctx): State<Arc<Context>>,
    Path(name): Path<String>,
    Query(params): Query<DeleteGroupParams>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = ctx.pool.conn().await?;
    if Group::delete(&name, params.with_hosts, &mut conn).await? == 0 {
        return Err(Error::NotFound("group"));
    }
    ctx.hosts.refresh(&mut conn).await?;
    Ok(Json(json!({ "status": "deleted", "group": name })))
}

async fn add_host_to_group(
    State(ctx): State<Arc<Context>>,
    Path((name, host)): Path<(String, String)>,
) -> Result<Json<Host>> {
    let mut conn = ctx.pool.conn().await?;
    Group::by_name(&name, &mut conn).await?;
    let existing = Host::by_name(&host, &mut conn).await?;
    let groups = add_to_list(&existing.groups, &name, ',', ",");
    Host::set_groups(&host, &groups, &mut conn).await?;
    let updated = Host::by_name(&host, &mut conn).await?;
    ctx.hosts.refresh(&mut conn).await?;
    Ok(Json(updated))
}

async fn remove_host_from_group(
    State(ctx): State<Arc<Context>>,
    Path((name, host)): Path<(String, String)>,
) -> Result<Json<Host>> {
    let mut conn = ctx.pool.conn().await?;
    let existing = Host::by_name(&host, &mut conn).await?;
    let groups = remove_from_list(&existing.groups, &name, ',', ",");
    Host::set_groups(&host, &groups, &mut conn).await?;
    let updated = Host::by_name(&host, &mut conn).await?;
    ctx.hosts.refresh(&mut conn).await?;
    Ok(Json(updated))
}

async fn list_users(State(ctx): State<Arc<Context>>) -> Result<Json<Vec<User>>> {
    let mut conn = ctx.pool.conn().await?;
    Ok(Json(User::list(&mut conn).await?))
}

async fn get_user(
    State(ctx): State<Arc<Context>>,
    Path(username): Path<String>,
) -> Result<Json<User>> {
    let mut conn = ctx.pool.conn().await?;
    Ok(Json(User::by_username(&username, &mut conn).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub groups: Option<String>,
    #[serde(default)]
    pub inventories: Option<String>,
}

async fn create_user(
    State(ctx): State<Arc<Context>>,
    Json(request): Json<CreateUserRequest>,
) -> Result<impl IntoResponse> {
    if request.username.trim().is_empty() {
        return Err(Error::validation("username must not be empty"));
    }
    let role: UserRole = request.role.as_deref().unwrap_or("user").parse()?;

    let mut conn = ctx.pool.conn().await?;
    if User::maybe_by_username(&request.username, &mut conn).await?.is_some() {
        return Err(Error::conflict(format!(
            "username `{}` already exists",
            request.username
        )));
    }

    let mut user = NewUser::new(&request.username, &request.password, &request.email, role)?;
    if let Some(groups) = request.groups {
        user.groups = groups;
    }
    if let Some(inventories) = request.inventories {
        user.inventories = inventories;
    }
    let created = user.create(&mut conn).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub groups: Option<String>,
    pub inventories: Option<String>,
}

async fn update_user(
    State(ctx): State<Arc<Context>>,
    Path(username): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    let mut conn = ctx.pool.conn().await?;
    let current = User::by_username(&username, &mut conn).await?;

    if request.username.is_none()
        && request.password.is_none()
        && request.email.is_none()
        && request.role.is_none()
        && request.groups.is_none()
        && request.inventories.is_none()
    {
        return Ok(Json(current));
    }

    // A rename must not steal an existing username.
    if let Some(new_name) = request.username.as_deref() {
        if new_name != username
            && User::maybe_by_username(new_name, &mut conn).await?.is_some()
        {
            return Err(Error::conflict(format!(
                "username `{new_name}` already exists"
            )));
        }
    }
    if let Some(role) = request.role.as_deref() {
        role.parse::<UserRole>()?;
    }

    let update = UpdateUser {
        username: request.username,
        password_hash: request.password.as_deref().map(hash_password).transpose()?,
        email: request.email,
        role: request.role,
        groups: request.groups,
        inventories: request.inventories,
    };
    Ok(Json(update.apply(&username, &mut conn).await?))
}

async fn delete_user(
    State(ctx): State<Arc<Context>>,
    Operator(acting): Operator,
    Path(username): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if acting.username == username {
        return Err(Error::Forbidden);
    }
    let mut conn = ctx.pool.conn().await?;
    if User::delete(&username, &mut conn).await? == 0 {
        return Err(Error::NotFound("user"));
    }
    Ok(Json(json!({ "status": "deleted", "user": username })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserGroupsRequest {
    pub groups: String,
}

async fn update_user_groups(
    State(ctx): State<Arc<Context>>,
    Path(username): Path<String>,
    Json(request): Json<UpdateUserGroupsRequest>,
) -> Result<Json<User>> {
    let mut conn = ctx.pool.conn().await?;
    Ok(Json(
        User::set_groups(&username, &request.groups, &mut conn).await?,
    ))
}

/// First phase of scheduled deletion; the sweep in list-all finishes the
/// job once the host goes quiet.
async fn schedule_deletion(
    State(ctx): State<Arc<Context>>,
    Path(name): Path<String>,
) -> Result<Json<Host>> {
    let mut conn = ctx.pool.conn().await?;
    let host = Host::schedule_deletion(&name, &mut conn).await?;
    ctx.hosts.refresh(&mut conn).await?;
    Ok(Json(host))
}

/// Reassigns the host's inventory. Unknown inventories are a 404 here, in
/// contrast to agent registration which auto-creates them.
async fn move_to_inventory(
    State(ctx): State<Arc<Context>>,
    Path((name, inventory)): Path<(String, String)>,
) -> Result<Json<Host>> {
    let mut conn = ctx.pool.conn().await?;
    if Inventory::by_name(&inventory, &mut conn).await?.is_none() {
        return Err(Error::NotFound("inventory"));
    }
    let host = Host::move_to_inventory(&name, &inventory, &mut conn).await?;
    ctx.hosts.refresh(&mut conn).await?;
    Ok(Json(host))
}
