use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::database::Conn;

use super::schema::session;

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = session)]
pub struct Session {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    pub timeout: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Issues a session for the user: 32 random bytes, hex-encoded.
    pub async fn issue(
        user_id: i64,
        timeout: DateTime<Utc>,
        conn: &mut Conn<'_>,
    ) -> Result<Self> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let created = diesel::insert_into(session::table)
            .values((
                session::token.eq(token),
                session::user_id.eq(user_id),
                session::timeout.eq(timeout),
            ))
            .get_result(conn)
            .await?;
        Ok(created)
    }

    pub async fn by_token(token: &str, conn: &mut Conn<'_>) -> Result<Option<Self>> {
        let found = session::table
            .filter(session::token.eq(token))
            .get_result(conn)
            .await
            .optional()?;
        Ok(found)
    }

    pub async fn revoke(token: &str, conn: &mut Conn<'_>) -> Result<usize> {
        let n_rows = diesel::delete(session::table.filter(session::token.eq(token)))
            .execute(conn)
            .await?;
        Ok(n_rows)
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.timeout
    }
}
