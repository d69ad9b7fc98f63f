use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use crate::Result;
use crate::database::Conn;

use super::schema::inventory;

pub const DEFAULT_INVENTORY: &str = "default";

#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = inventory)]
pub struct Inventory {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Inventory {
    pub async fn create(name: &str, conn: &mut Conn<'_>) -> Result<Self> {
        let created = diesel::insert_into(inventory::table)
            .values(inventory::name.eq(name))
            .get_result(conn)
            .await?;
        Ok(created)
    }

    pub async fn by_name(name: &str, conn: &mut Conn<'_>) -> Result<Option<Self>> {
        let found = inventory::table
            .filter(inventory::name.eq(name))
            .get_result(conn)
            .await
            .optional()?;
        Ok(found)
    }

    pub async fn list(conn: &mut Conn<'_>) -> Result<Vec<Self>> {
        let inventories = inventory::table
            .order(inventory::name.asc())
            .get_results(conn)
            .await?;
        Ok(inventories)
    }

    pub async fn delete(name: &str, conn: &mut Conn<'_>) -> Result<usize> {
        let n_rows = diesel::delete(inventory::table.filter(inventory::name.eq(name)))
            .execute(conn)
            .await?;
        Ok(n_rows)
    }

    /// Registration auto-creates unknown inventories.
    pub async fn ensure(name: &str, conn: &mut Conn<'_>) -> Result<Self> {
        if let Some(found) = Self::by_name(name, conn).await? {
            return Ok(found);
        }
        Self::create(name, conn).await
    }
}
