use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::Result;
use crate::database::Conn;

use super::schema::api_log_entry;

/// Best-effort audit row for mutating operator requests.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = api_log_entry)]
pub struct NewApiLogEntry {
    pub method: String,
    pub path: String,
    pub principal: String,
    pub status: i32,
}

impl NewApiLogEntry {
    pub async fn create(self, conn: &mut Conn<'_>) -> Result<usize> {
        let n_rows = diesel::insert_into(api_log_entry::table)
            .values(self)
            .execute(conn)
            .await?;
        Ok(n_rows)
    }
}
