use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use diesel::result::DatabaseErrorKind;
use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("invalid authentication credentials")]
    Unauthenticated,

    #[error("insufficient permission")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    /// A non-2xx reply from the automation engine. The response mirrors the
    /// upstream status and carries the upstream body through unchanged.
    #[error("automation engine returned {status}")]
    Upstream {
        status: StatusCode,
        body: serde_json::Value,
    },

    /// Orchestrator failures with a stable machine-readable `code`.
    #[error("{detail}")]
    Awx { code: &'static str, detail: String },

    #[error("store error: {0}")]
    Store(#[from] diesel::result::Error),

    #[error("database error: {0}")]
    Database(#[from] crate::database::Error),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl std::fmt::Display) -> Self {
        Self::Validation(msg.to_string())
    }

    pub fn conflict(msg: impl std::fmt::Display) -> Self {
        Self::Conflict(msg.to_string())
    }

    pub fn awx(code: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Awx {
            code,
            detail: detail.to_string(),
        }
    }

    /// Parses an upstream error body as JSON where possible, keeping the raw
    /// string otherwise.
    pub fn upstream(status: StatusCode, body: &str) -> Self {
        let body = serde_json::from_str(body)
            .unwrap_or_else(|_| serde_json::Value::String(body.to_owned()));
        Self::Upstream { status, body }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Upstream { status, .. } => *status,
            Error::Awx { code, .. } => awx_status(code),
            Error::Store(diesel::result::Error::NotFound) => StatusCode::NOT_FOUND,
            Error::Store(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            )) => StatusCode::CONFLICT,
            Error::Store(_) | Error::Database(_) | Error::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Stable orchestrator error codes. Handlers and clients match on these, so
/// changing one is a breaking API change.
pub mod code {
    pub const AWX_NOT_ENABLED: &str = "AWX_NOT_ENABLED";
    pub const MISSING_INVENTORY_ID: &str = "MISSING_INVENTORY_ID";
    pub const MISSING_TEMPLATE_INFO: &str = "MISSING_TEMPLATE_INFO";
    pub const WORKFLOW_TEMPLATE_NOT_FOUND: &str = "WORKFLOW_TEMPLATE_NOT_FOUND";
    pub const INVENTORY_NOT_FOUND: &str = "INVENTORY_NOT_FOUND";
    pub const TEMPLATE_NOT_FOUND: &str = "TEMPLATE_NOT_FOUND";
    pub const TEMPLATE_NAME_CONFLICT: &str = "TEMPLATE_NAME_CONFLICT";
    pub const QUEUE_FULL: &str = "QUEUE_FULL";
    pub const AWX_API_ERROR: &str = "AWX_API_ERROR";
}

fn awx_status(code: &str) -> StatusCode {
    match code {
        self::code::AWX_NOT_ENABLED => StatusCode::SERVICE_UNAVAILABLE,
        self::code::MISSING_INVENTORY_ID | self::code::MISSING_TEMPLATE_INFO => {
            StatusCode::BAD_REQUEST
        }
        self::code::WORKFLOW_TEMPLATE_NOT_FOUND
        | self::code::INVENTORY_NOT_FOUND
        | self::code::TEMPLATE_NOT_FOUND => StatusCode::NOT_FOUND,
        self::code::TEMPLATE_NAME_CONFLICT => StatusCode::CONFLICT,
        self::code::QUEUE_FULL => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{self:?}");
        }

        // Upstream errors pass the engine body through under the engine's
        // own status code.
        if let Error::Upstream { body, .. } = &self {
            let body = ErrorBody {
                error: "automation engine error".to_string(),
                title: None,
                code: Some(code::AWX_API_ERROR.to_string()),
                detail: Some(body.to_string()),
            };
            return (status, Json(body)).into_response();
        }

        let body = match &self {
            Error::Awx { code, detail } => ErrorBody {
                error: detail.clone(),
                title: None,
                code: Some((*code).to_string()),
                detail: None,
            },
            Error::Store(_) | Error::Database(_) | Error::Unexpected(_)
                if status.is_server_error() =>
            {
                ErrorBody {
                    error: "internal error".to_string(),
                    title: None,
                    code: None,
                    detail: None,
                }
            }
            other => ErrorBody {
                error: other.to_string(),
                title: None,
                code: None,
                detail: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    write!(f, "{e}")?;
    let mut current = e.source();
    while let Some(cause) = current {
        write!(f, "\n\tCaused by: {cause}")?;
        current = cause.source();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_http_statuses() {
        let not_found = Error::Store(diesel::result::Error::NotFound);
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        assert_eq!(
            Error::Forbidden.status_code(),
            StatusCode::FORBIDDEN,
        );
        assert_eq!(
            Error::validation("bad level").status_code(),
            StatusCode::BAD_REQUEST,
        );
    }

    #[test]
    fn upstream_keeps_parsed_json_body() {
        let err = Error::upstream(StatusCode::BAD_REQUEST, r#"{"detail":"no such inventory"}"#);
        let Error::Upstream { status, body } = err else {
            panic!("expected upstream error");
        };
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "no such inventory");
    }

    #[test]
    fn upstream_falls_back_to_raw_string() {
        let err = Error::upstream(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        let Error::Upstream { body, .. } = err else {
            panic!("expected upstream error");
        };
        assert_eq!(body, serde_json::Value::String("<html>oops</html>".into()));
    }
}
