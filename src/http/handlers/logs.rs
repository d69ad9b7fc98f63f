use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::Result;
use crate::auth::Operator;
use crate::config::Context;
use crate::error::Error;
use crate::model::host_log::{HOURLY_BUCKETS, LevelCounts, hourly_buckets, parse_rfc3339_lenient};
use crate::model::{HostLog, LogFilter, LogPage};

pub fn router() -> Router<Arc<Context>> {
    Router::new()
        .route("/logs", get(list))
        .route("/logs/hourly", get(hourly))
        .route("/logs/search", post(search))
        // GET lists by host name, DELETE removes by record id.
        .route("/logs/{target}", get(list_by_host).delete(remove))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogsPage {
    pub logs: Vec<HostLog>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl LogsPage {
    fn new(total: i64, logs: Vec<HostLog>, page: LogPage) -> Self {
        LogsPage {
            logs,
            total,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages(total),
        }
    }
}

async fn list(
    State(ctx): State<Arc<Context>>,
    _operator: Operator,
    Query(params): Query<PageParams>,
) -> Result<Json<LogsPage>> {
    let page = LogPage::clamped(params.page, params.page_size);
    let mut conn = ctx.pool.conn().await?;
    let (total, logs) = HostLog::list(page, &mut conn).await?;
    Ok(Json(LogsPage::new(total, logs, page)))
}

async fn list_by_host(
    State(ctx): State<Arc<Context>>,
    _operator: Operator,
    Path(hostname): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<LogsPage>> {
    let page = LogPage::clamped(params.page, params.page_size);
    let mut conn = ctx.pool.conn().await?;
    let (total, logs) = HostLog::list_by_host(&hostname, page, &mut conn).await?;
    Ok(Json(LogsPage::new(total, logs, page)))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    pub host_name: Option<String>,
    pub level: Option<String>,
    pub component: Option<String>,
    /// Case-sensitive substring over the message.
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub log_type: Option<String>,
    /// RFC3339; silently ignored when unparseable.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl SearchRequest {
    fn filter(&self) -> LogFilter {
        LogFilter {
            host_name: self.host_name.clone().filter(|s| !s.is_empty()),
            level: self.level.clone().filter(|s| !s.is_empty()),
            component: self.component.clone().filter(|s| !s.is_empty()),
            message_substr: self.message.clone().filter(|s| !s.is_empty()),
            log_type: self.log_type.clone().filter(|s| !s.is_empty()),
            start_time: parse_rfc3339_lenient(self.start_time.as_deref()),
            end_time: parse_rfc3339_lenient(self.end_time.as_deref()),
        }
    }
}

async fn search(
    State(ctx): State<Arc<Context>>,
    _operator: Operator,
    Json(request): Json<SearchRequest>,
) -> Result<Json<LogsPage>> {
    let page = LogPage::clamped(request.page, request.page_size);
    let filter = request.filter();
    let mut conn = ctx.pool.conn().await?;
    let (total, logs) = HostLog::search(&filter, page, &mut conn).await?;
    Ok(Json(LogsPage::new(total, logs, page)))
}

async fn remove(
    State(ctx): State<Arc<Context>>,
    Operator(user): Operator,
    Path(target): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if !user.is_admin() {
        return Err(Error::Forbidden);
    }
    let id: i64 = target
        .parse()
        .map_err(|_| Error::validation("log id must be numeric"))?;
    let mut conn = ctx.pool.conn().await?;
    if HostLog::delete(id, &mut conn).await? == 0 {
        return Err(Error::NotFound("log record"));
    }
    Ok(Json(json!({ "status": "deleted", "id": id })))
}

#[derive(Debug, Serialize)]
pub struct HourlyStats {
    /// Twelve 5-minute buckets covering the last hour, oldest first.
    pub buckets: [LevelCounts; HOURLY_BUCKETS],
}

async fn hourly(
    State(ctx): State<Arc<Context>>,
    _operator: Operator,
) -> Result<Json<HourlyStats>> {
    let now = Utc::now();
    let mut conn = ctx.pool.conn().await?;
    let entries = HostLog::levels_since(now - Duration::hours(1), &mut conn).await?;
    Ok(Json(HourlyStats {
        buckets: hourly_buckets(&entries, now),
    }))
}
