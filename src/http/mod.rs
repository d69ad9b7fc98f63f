pub mod api_log;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::post;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::config::Context;

/// Builds the full `/api/v1` surface.
///
/// Principals are attached by two lenient middlewares (operator chain, then
/// host keys) and enforced by the handler extractors, so routes with their
/// own auth rules — `/auth/login`, and `POST /hosts` which checks host keys
/// for re-registration — live in the same tree. `/admin/*` adds the admin
/// gate on top.
pub fn server(ctx: Arc<Context>) -> Router {
    let api = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .merge(handlers::auth::router())
        .route("/hosts", post(handlers::hosts::register))
        .merge(handlers::hosts::router())
        .merge(handlers::logs::router())
        .merge(handlers::health::router())
        .merge(handlers::inventory::router())
        .merge(handlers::awx::router())
        .nest(
            "/admin",
            handlers::admin::router().layer(middleware::from_fn(auth::require_admin)),
        )
        .nest("/host", handlers::agent::router())
        // Innermost first: the api log sees the principals both auth
        // layers attach.
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            |state, req, next| api_log::record(state, req, next),
        ))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            |state, req, next| auth::authenticate_host(state, req, next),
        ))
        .layer(middleware::from_fn_with_state(ctx.clone(), |state, req, next| {
            auth::authenticate(state, req, next)
        }));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(ctx)
}
