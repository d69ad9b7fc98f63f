use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use crate::Result;
use crate::database::Conn;

use super::schema::host_file_config;

#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = host_file_config)]
pub struct HostFileConfig {
    pub id: i64,
    pub host_name: String,
    pub file_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HostFileConfig {
    pub async fn by_host(host_name: &str, conn: &mut Conn<'_>) -> Result<Vec<Self>> {
        let configs = host_file_config::table
            .filter(host_file_config::host_name.eq(host_name))
            .order(host_file_config::file_name.asc())
            .get_results(conn)
            .await?;
        Ok(configs)
    }

    pub async fn delete(host_name: &str, file_name: &str, conn: &mut Conn<'_>) -> Result<usize> {
        let n_rows = diesel::delete(
            host_file_config::table
                .filter(host_file_config::host_name.eq(host_name))
                .filter(host_file_config::file_name.eq(file_name)),
        )
        .execute(conn)
        .await?;
        Ok(n_rows)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = host_file_config)]
pub struct NewHostFileConfig {
    pub host_name: String,
    pub file_name: String,
    pub content: String,
}

impl NewHostFileConfig {
    pub async fn upsert(self, conn: &mut Conn<'_>) -> Result<HostFileConfig> {
        let now = Utc::now();
        let config = diesel::insert_into(host_file_config::table)
            .values(&self)
            .on_conflict((
                host_file_config::host_name,
                host_file_config::file_name,
            ))
            .do_update()
            .set((
                host_file_config::content.eq(&self.content),
                host_file_config::updated_at.eq(now),
            ))
            .get_result(conn)
            .await?;
        Ok(config)
    }
}
