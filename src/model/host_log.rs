use chrono::{DateTime, Duration, Utc};
use diesel::dsl;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::database::Conn;

use super::schema::host_log;

/// Global retention cap over live rows. Eviction trims back down to
/// `RETENTION_KEEP` in id-batches of `EVICTION_BATCH`.
pub const RETENTION_MAX: i64 = 10_000;
pub const RETENTION_KEEP: i64 = 9_999;
pub const EVICTION_BATCH: i64 = 500;

pub const LEVELS: [&str; 4] = ["info", "warning", "error", "critical"];
pub const DEFAULT_TYPE: &str = "monokit";

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 1_000;

#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = host_log)]
pub struct HostLog {
    pub id: i64,
    pub host_name: String,
    pub level: String,
    pub component: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: String,
    #[serde(rename = "type")]
    pub log_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// An accepted, validated record waiting in the ingest buffer.
#[derive(Debug, Clone, Insertable, PartialEq)]
#[diesel(table_name = host_log)]
pub struct NewHostLog {
    pub host_name: String,
    pub level: String,
    pub component: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: String,
    pub log_type: String,
}

/// Clamped pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPage {
    pub page: i64,
    pub page_size: i64,
}

impl LogPage {
    pub fn clamped(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page = match page {
            Some(p) if p >= 1 => p,
            _ => 1,
        };
        let page_size = match page_size {
            Some(s) if s >= 1 => s.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        };
        LogPage { page, page_size }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.page_size - 1) / self.page_size
    }
}

/// Optional, conjunctive search filters.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub host_name: Option<String>,
    pub level: Option<String>,
    pub component: Option<String>,
    pub message_substr: Option<String>,
    pub log_type: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Unparseable timestamps in a search are ignored rather than rejected.
pub fn parse_rfc3339_lenient(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn filtered(filter: &LogFilter) -> host_log::BoxedQuery<'static, Pg> {
    let mut query = host_log::table
        .filter(host_log::deleted_at.is_null())
        .into_boxed();
    if let Some(host) = &filter.host_name {
        query = query.filter(host_log::host_name.ilike(host.clone()));
    }
    if let Some(level) = &filter.level {
        query = query.filter(host_log::level.eq(level.to_lowercase()));
    }
    if let Some(component) = &filter.component {
        query = query.filter(host_log::component.eq(component.clone()));
    }
    if let Some(substr) = &filter.message_substr {
        query = query.filter(host_log::message.like(format!("%{substr}%")));
    }
    if let Some(log_type) = &filter.log_type {
        query = query.filter(host_log::log_type.eq(log_type.clone()));
    }
    if let Some(start) = filter.start_time {
        query = query.filter(host_log::timestamp.ge(start));
    }
    if let Some(end) = filter.end_time {
        query = query.filter(host_log::timestamp.le(end));
    }
    query
}

impl HostLog {
    pub async fn insert_batch(batch: Vec<NewHostLog>, conn: &mut Conn<'_>) -> Result<usize> {
        let n_rows = diesel::insert_into(host_log::table)
            .values(batch)
            .execute(conn)
            .await?;
        Ok(n_rows)
    }

    /// Paginated search; total live match count comes along for the page
    /// arithmetic. Newest first, ties broken by insert order.
    pub async fn search(
        filter: &LogFilter,
        page: LogPage,
        conn: &mut Conn<'_>,
    ) -> Result<(i64, Vec<Self>)> {
        let total: i64 = filtered(filter).count().get_result(conn).await?;
        let records = filtered(filter)
            .order((host_log::timestamp.desc(), host_log::id.desc()))
            .offset(page.offset())
            .limit(page.page_size)
            .get_results(conn)
            .await?;
        Ok((total, records))
    }

    pub async fn list(page: LogPage, conn: &mut Conn<'_>) -> Result<(i64, Vec<Self>)> {
        Self::search(&LogFilter::default(), page, conn).await
    }

    pub async fn list_by_host(
        host_name: &str,
        page: LogPage,
        conn: &mut Conn<'_>,
    ) -> Result<(i64, Vec<Self>)> {
        let filter = LogFilter {
            host_name: Some(host_name.to_string()),
            ..Default::default()
        };
        Self::search(&filter, page, conn).await
    }

    /// Admin-only soft delete.
    pub async fn delete(id: i64, conn: &mut Conn<'_>) -> Result<usize> {
        let n_rows = diesel::update(
            host_log::table
                .find(id)
                .filter(host_log::deleted_at.is_null()),
        )
        .set(host_log::deleted_at.eq(Utc::now()))
        .execute(conn)
        .await?;
        Ok(n_rows)
    }

    pub async fn live_count(conn: &mut Conn<'_>) -> Result<i64> {
        let n: i64 = host_log::table
            .filter(host_log::deleted_at.is_null())
            .select(dsl::count_star())
            .get_result(conn)
            .await?;
        Ok(n)
    }

    /// Trims live rows back under the retention cap. Victim ids are
    /// pre-fetched oldest-first and deleted by `id IN (…)` to keep the
    /// delete plan away from correlated subqueries.
    pub async fn enforce_retention(conn: &mut Conn<'_>) -> Result<usize> {
        let mut count = Self::live_count(conn).await?;
        if count < RETENTION_MAX {
            return Ok(0);
        }

        let mut evicted = 0;
        while count > RETENTION_KEEP {
            let batch = EVICTION_BATCH.min(count - RETENTION_KEEP);
            let victims: Vec<i64> = host_log::table
                .filter(host_log::deleted_at.is_null())
                .order((host_log::timestamp.asc(), host_log::id.asc()))
                .limit(batch)
                .select(host_log::id)
                .get_results(conn)
                .await?;
            if victims.is_empty() {
                break;
            }
            let n_rows = diesel::delete(host_log::table.filter(host_log::id.eq_any(victims)))
                .execute(conn)
                .await?;
            if n_rows == 0 {
                break;
            }
            evicted += n_rows;
            count -= n_rows as i64;
        }
        Ok(evicted)
    }

    /// Live `(timestamp, level)` pairs newer than `since`, for the hourly
    /// stats endpoint.
    pub async fn levels_since(
        since: DateTime<Utc>,
        conn: &mut Conn<'_>,
    ) -> Result<Vec<(DateTime<Utc>, String)>> {
        let entries = host_log::table
            .filter(host_log::deleted_at.is_null())
            .filter(host_log::timestamp.gt(since))
            .select((host_log::timestamp, host_log::level))
            .get_results(conn)
            .await?;
        Ok(entries)
    }
}

pub const HOURLY_BUCKETS: usize = 12;
const BUCKET_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCounts {
    pub info: u64,
    pub warning: u64,
    pub error: u64,
    pub critical: u64,
}

impl LevelCounts {
    fn bump(&mut self, level: &str) {
        match level.to_lowercase().as_str() {
            "info" => self.info += 1,
            "warning" => self.warning += 1,
            "error" => self.error += 1,
            "critical" => self.critical += 1,
            _ => {}
        }
    }

    pub fn total(&self) -> u64 {
        self.info + self.warning + self.error + self.critical
    }
}

/// Buckets records over `(now-1h, now]` into twelve 5-minute windows. A
/// record landing exactly on a boundary belongs to the earlier bucket.
pub fn hourly_buckets(
    entries: &[(DateTime<Utc>, String)],
    now: DateTime<Utc>,
) -> [LevelCounts; HOURLY_BUCKETS] {
    let start = now - Duration::hours(1);
    let mut buckets = [LevelCounts::default(); HOURLY_BUCKETS];
    for (timestamp, level) in entries {
        let secs = (*timestamp - start).num_seconds();
        if secs <= 0 || secs > BUCKET_SECS * HOURLY_BUCKETS as i64 {
            continue;
        }
        let index = ((secs + BUCKET_SECS - 1) / BUCKET_SECS - 1) as usize;
        buckets[index].bump(level);
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamping() {
        assert_eq!(
            LogPage::clamped(None, None),
            LogPage { page: 1, page_size: 100 }
        );
        assert_eq!(
            LogPage::clamped(Some(0), Some(0)),
            LogPage { page: 1, page_size: 100 }
        );
        assert_eq!(
            LogPage::clamped(Some(-3), Some(5_000)),
            LogPage { page: 1, page_size: 1_000 }
        );
        let page = LogPage::clamped(Some(3), Some(250));
        assert_eq!(page.offset(), 500);
        assert_eq!(page.total_pages(501), 3);
        assert_eq!(page.total_pages(500), 2);
    }

    #[test]
    fn lenient_timestamp_parsing() {
        assert!(parse_rfc3339_lenient(Some("2026-07-01T10:00:00Z")).is_some());
        assert!(parse_rfc3339_lenient(Some("yesterday-ish")).is_none());
        assert!(parse_rfc3339_lenient(None).is_none());
    }

    #[test]
    fn bucket_boundaries() {
        let now = Utc::now();
        let entries = vec![
            // 4m59s ago -> last bucket
            (now - Duration::seconds(4 * 60 + 59), "error".to_string()),
            // exactly 5m ago -> previous bucket
            (now - Duration::seconds(5 * 60), "error".to_string()),
            // just over an hour ago -> dropped
            (now - Duration::seconds(60 * 60 + 1), "info".to_string()),
        ];
        let buckets = hourly_buckets(&entries, now);
        assert_eq!(buckets[11].error, 1);
        assert_eq!(buckets[10].error, 1);
        let total: u64 = buckets.iter().map(LevelCounts::total).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn bucket_levels_case_insensitive_and_unknown_dropped() {
        let now = Utc::now();
        let entries = vec![
            (now - Duration::seconds(30), "CRITICAL".to_string()),
            (now - Duration::seconds(30), "Warning".to_string()),
            (now - Duration::seconds(30), "debug".to_string()),
        ];
        let buckets = hourly_buckets(&entries, now);
        assert_eq!(buckets[11].critical, 1);
        assert_eq!(buckets[11].warning, 1);
        assert_eq!(buckets[11].total(), 2);
    }

    #[test]
    fn record_at_now_lands_in_last_bucket() {
        let now = Utc::now();
        let buckets = hourly_buckets(&[(now, "info".to_string())], now);
        assert_eq!(buckets[11].info, 1);
    }
}
