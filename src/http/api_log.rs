use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::Principal;
use crate::config::Context;
use crate::model::NewApiLogEntry;

/// Records mutating operator requests into `api_log_entry`, after the
/// response and off the request path. Failures are logged and dropped; the
/// audit trail never costs a request.
pub async fn record(State(ctx): State<Arc<Context>>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    // Agent traffic (log submits, health posts) is high-volume and has its
    // own tables; the audit trail covers the operator surface.
    let agent = matches!(
        request.extensions().get::<Principal>(),
        Some(Principal::Agent { .. })
    );
    let principal = request
        .extensions()
        .get::<Principal>()
        .map(|principal| principal.name().to_string())
        .unwrap_or_default();

    let response = next.run(request).await;

    if is_mutating(&method) && !agent {
        let entry = NewApiLogEntry {
            method: method.to_string(),
            path,
            principal,
            status: i32::from(response.status().as_u16()),
        };
        let pool = ctx.pool.clone();
        tokio::spawn(async move {
            let result = async {
                let mut conn = pool.conn().await?;
                entry.create(&mut conn).await
            }
            .await;
            if let Err(err) = result {
                tracing::warn!("api log write failed: {err:?}");
            }
        });
    }

    response
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}
