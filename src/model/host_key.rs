use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rand::RngCore;
use serde::Serialize;

use crate::Result;
use crate::database::Conn;

use super::schema::host_key;

/// Grants the agent role for exactly one host. Revoked when the host is
/// force-deleted.
#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = host_key)]
pub struct HostKey {
    pub id: i64,
    pub token: String,
    pub host_name: String,
    pub created_at: DateTime<Utc>,
}

impl HostKey {
    pub async fn mint(host_name: &str, conn: &mut Conn<'_>) -> Result<Self> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let created = diesel::insert_into(host_key::table)
            .values((
                host_key::token.eq(token),
                host_key::host_name.eq(host_name),
            ))
            .get_result(conn)
            .await?;
        Ok(created)
    }

    pub async fn by_token(token: &str, conn: &mut Conn<'_>) -> Result<Option<Self>> {
        let found = host_key::table
            .filter(host_key::token.eq(token))
            .get_result(conn)
            .await
            .optional()?;
        Ok(found)
    }

    /// Whether `token` is a key for `host_name`.
    pub async fn grants(token: &str, host_name: &str, conn: &mut Conn<'_>) -> Result<bool> {
        let found = Self::by_token(token, conn).await?;
        Ok(found.is_some_and(|key| key.host_name == host_name))
    }
}
