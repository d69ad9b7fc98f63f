pub mod keycloak;
pub mod session;

pub use keycloak::{FederatedAuthDisabled, FederatedIdentity, Keycloak, TokenValidator};
pub use session::SessionStore;

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use rand::RngCore;

use crate::config::Context;
use crate::error::Error;
use crate::model::{Host, HostKey, NewUser, User, UserRole};

/// Who a request acts as, attached to the request by the auth middleware.
#[derive(Clone, Debug)]
pub enum Principal {
    Operator(User),
    Agent { host_name: String },
}

impl Principal {
    pub fn name(&self) -> &str {
        match self {
            Principal::Operator(user) => &user.username,
            Principal::Agent { host_name } => host_name,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Operator(user) if user.is_admin())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Error> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(Error::Unauthenticated)
    }
}

/// Extractor for the authenticated agent's host name on `/host/*` routes.
#[derive(Clone, Debug)]
pub struct AgentHost(pub String);

impl<S: Send + Sync> FromRequestParts<S> for AgentHost {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Error> {
        match parts.extensions.get::<Principal>() {
            Some(Principal::Agent { host_name }) => Ok(AgentHost(host_name.clone())),
            _ => Err(Error::Unauthenticated),
        }
    }
}

/// Extractor for the authenticated operator. Agent credentials never
/// authenticate an operator endpoint.
#[derive(Clone, Debug)]
pub struct Operator(pub User);

impl<S: Send + Sync> FromRequestParts<S> for Operator {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Error> {
        match parts.extensions.get::<Principal>() {
            Some(Principal::Operator(user)) => Ok(Operator(user.clone())),
            _ => Err(Error::Unauthenticated),
        }
    }
}

/// Operator authentication chain, run as a request-extension middleware:
/// validators run in order, the first success attaches the principal, and
/// handlers reject through the [`Operator`] / [`AgentHost`] extractors when
/// nothing was attached. The chain:
///
/// 1. an already-attached principal passes through,
/// 2. a `Bearer` value goes to the federated validator when one is enabled
///    (success skips the session tiers entirely; rejection with local auth
///    disabled ends the chain),
/// 3. the opaque value is tried as a session token,
/// 4. for bearers, the full `Bearer …` value is retried against the session
///    store as legacy tolerance.
pub async fn authenticate(
    State(ctx): State<Arc<Context>>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<Principal>().is_some() {
        return next.run(request).await;
    }
    if let Some(user) = operator_for_request(&ctx, &request).await {
        request.extensions_mut().insert(Principal::Operator(user));
    }
    next.run(request).await
}

async fn operator_for_request(ctx: &Context, request: &Request) -> Option<User> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)?;

    let bearer = header.strip_prefix("Bearer ").map(str::trim);

    if let Some(bearer) = bearer {
        if ctx.validator.enabled() {
            match ctx.validator.validate(bearer).await {
                Ok(Some(identity)) => match fetch_or_provision(ctx, identity).await {
                    Ok(user) => return Some(user),
                    Err(err) => {
                        tracing::error!("cannot map federated identity: {err:?}");
                        return None;
                    }
                },
                Ok(None) if !ctx.config.auth.local_auth_enabled => return None,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!("federated validation unavailable: {err}");
                    if !ctx.config.auth.local_auth_enabled {
                        return None;
                    }
                }
            }
        }
    }

    let raw = bearer.unwrap_or(header.as_str());
    match ctx.sessions.lookup(raw).await {
        Ok(Some((_, user))) => return Some(user),
        Ok(None) => {}
        Err(err) => {
            tracing::error!("session lookup failed: {err:?}");
            return None;
        }
    }

    // Legacy clients stored the whole `Bearer …` string as their session
    // token; tolerate that, but complain.
    if bearer.is_some() {
        if let Ok(Some((_, user))) = ctx.sessions.lookup(&header).await {
            tracing::warn!(
                user = %user.username,
                "deprecated: session token matched with its `Bearer ` prefix"
            );
            return Some(user);
        }
    }

    None
}

/// Gate for `/admin/*`: operators below admin get `403`, everything else
/// (no principal, agent keys) stays `401`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, Error> {
    match request.extensions().get::<Principal>() {
        Some(principal) if principal.is_admin() => Ok(next.run(request).await),
        Some(Principal::Operator(_)) => Err(Error::Forbidden),
        _ => Err(Error::Unauthenticated),
    }
}

/// Agent counterpart of [`authenticate`]: attaches the host principal when
/// the `Authorization` value matches a host key whose host still exists.
pub async fn authenticate_host(
    State(ctx): State<Arc<Context>>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<Principal>().is_some() {
        return next.run(request).await;
    }
    if let Some(host_name) = agent_for_request(&ctx, &request).await {
        request.extensions_mut().insert(Principal::Agent { host_name });
    }
    next.run(request).await
}

async fn agent_for_request(ctx: &Context, request: &Request) -> Option<String> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    let result = async {
        let mut conn = ctx.pool.conn().await?;
        let Some(key) = HostKey::by_token(token, &mut conn).await? else {
            return Ok(None);
        };
        if Host::maybe_by_name(&key.host_name, &mut conn).await?.is_none() {
            return Ok(None);
        }
        Ok::<_, Error>(Some(key.host_name))
    }
    .await;

    match result {
        Ok(host_name) => host_name,
        Err(err) => {
            tracing::error!("host key lookup failed: {err:?}");
            None
        }
    }
}

/// Federated identities map onto local users by username, provisioning a
/// user-role row on first sight.
async fn fetch_or_provision(ctx: &Context, identity: FederatedIdentity) -> Result<User, Error> {
    let mut conn = ctx.pool.conn().await?;
    if let Some(user) = User::maybe_by_username(&identity.username, &mut conn).await? {
        return Ok(user);
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let user = NewUser::new(
        &identity.username,
        &hex::encode(bytes),
        &identity.email,
        UserRole::User,
    )?
    .create(&mut conn)
    .await?;
    tracing::info!(user = %user.username, "provisioned user from federated identity");
    Ok(user)
}
