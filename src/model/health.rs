use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use crate::Result;
use crate::database::Conn;

use super::schema::host_health_data;

/// One tool's most recent health payload for one host. The raw JSON is kept
/// as delivered; decoding happens at read time.
#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = host_health_data)]
pub struct HostHealthData {
    pub id: i64,
    pub host_name: String,
    pub tool_name: String,
    pub data_json: String,
    pub last_updated: DateTime<Utc>,
}

impl HostHealthData {
    pub async fn by_host(host_name: &str, conn: &mut Conn<'_>) -> Result<Vec<Self>> {
        let rows = host_health_data::table
            .filter(host_health_data::host_name.eq(host_name))
            .order(host_health_data::tool_name.asc())
            .get_results(conn)
            .await?;
        Ok(rows)
    }

    pub async fn by_host_tool(
        host_name: &str,
        tool_name: &str,
        conn: &mut Conn<'_>,
    ) -> Result<Option<Self>> {
        let row = host_health_data::table
            .filter(host_health_data::host_name.eq(host_name))
            .filter(host_health_data::tool_name.eq(tool_name))
            .get_result(conn)
            .await
            .optional()?;
        Ok(row)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = host_health_data)]
pub struct UpsertHealthData {
    pub host_name: String,
    pub tool_name: String,
    pub data_json: String,
    pub last_updated: DateTime<Utc>,
}

impl UpsertHealthData {
    pub fn new(host_name: &str, tool_name: &str, data_json: String) -> Self {
        UpsertHealthData {
            host_name: host_name.to_string(),
            tool_name: tool_name.to_string(),
            data_json,
            last_updated: Utc::now(),
        }
    }

    pub async fn apply(self, conn: &mut Conn<'_>) -> Result<HostHealthData> {
        let row = diesel::insert_into(host_health_data::table)
            .values(&self)
            .on_conflict((
                host_health_data::host_name,
                host_health_data::tool_name,
            ))
            .do_update()
            .set((
                host_health_data::data_json.eq(&self.data_json),
                host_health_data::last_updated.eq(self.last_updated),
            ))
            .get_result(conn)
            .await?;
        Ok(row)
    }
}
