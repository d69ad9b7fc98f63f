use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::database::Conn;

use super::schema::{host, host_file_config, host_key};

/// A host with no heartbeat for this long is reported `Offline`, and is
/// eligible for the scheduled-deletion sweep once marked.
pub const STALE_HEARTBEAT: Duration = Duration::minutes(5);

/// Marker for an empty delimited list in `groups` / `disabled_components`.
pub const NIL: &str = "nil";

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = host)]
pub struct Host {
    pub id: i64,
    pub name: String,
    pub ip_address: String,
    pub os: String,
    pub inventory: String,
    pub groups: String,
    pub installed_components: String,
    pub disabled_components: String,
    pub monokit_version: String,
    pub wants_update_to: String,
    pub status: String,
    pub up_for_deletion: bool,
    pub awx_only: bool,
    pub awx_host_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Host {
    pub async fn by_name(name: &str, conn: &mut Conn<'_>) -> Result<Self> {
        let found = host::table
            .filter(host::name.eq(name))
            .filter(host::deleted_at.is_null())
            .get_result(conn)
            .await?;
        Ok(found)
    }

    pub async fn maybe_by_name(name: &str, conn: &mut Conn<'_>) -> Result<Option<Self>> {
        let found = host::table
            .filter(host::name.eq(name))
            .filter(host::deleted_at.is_null())
            .get_result(conn)
            .await
            .optional()?;
        Ok(found)
    }

    /// Unscoped lookup: also finds soft-deleted rows, which force delete
    /// must still be able to purge.
    pub async fn by_name_any(name: &str, conn: &mut Conn<'_>) -> Result<Option<Self>> {
        let found = host::table
            .filter(host::name.eq(name))
            .get_result(conn)
            .await
            .optional()?;
        Ok(found)
    }

    pub async fn list_all(conn: &mut Conn<'_>) -> Result<Vec<Self>> {
        let hosts = host::table
            .filter(host::deleted_at.is_null())
            .order(host::name.asc())
            .get_results(conn)
            .await?;
        Ok(hosts)
    }

    /// Soft delete. The row stays behind the live predicate until a force
    /// delete removes it for good.
    pub async fn delete(name: &str, conn: &mut Conn<'_>) -> Result<usize> {
        let n_rows = diesel::update(
            host::table
                .filter(host::name.eq(name))
                .filter(host::deleted_at.is_null()),
        )
        .set(host::deleted_at.eq(Utc::now()))
        .execute(conn)
        .await?;
        Ok(n_rows)
    }

    /// Unscoped cascade: removes the host row together with its keys and
    /// file configs, soft-deleted or not.
    pub async fn force_delete(name: &str, conn: &mut Conn<'_>) -> Result<usize> {
        diesel::delete(host_key::table.filter(host_key::host_name.eq(name)))
            .execute(conn)
            .await?;
        diesel::delete(host_file_config::table.filter(host_file_config::host_name.eq(name)))
            .execute(conn)
            .await?;
        let n_rows = diesel::delete(host::table.filter(host::name.eq(name)))
            .execute(conn)
            .await?;
        Ok(n_rows)
    }

    pub async fn schedule_deletion(name: &str, conn: &mut Conn<'_>) -> Result<Self> {
        let updated = diesel::update(
            host::table
                .filter(host::name.eq(name))
                .filter(host::deleted_at.is_null()),
        )
        .set(host::up_for_deletion.eq(true))
        .get_result(conn)
        .await?;
        Ok(updated)
    }

    pub async fn move_to_inventory(
        name: &str,
        inventory: &str,
        conn: &mut Conn<'_>,
    ) -> Result<Self> {
        let updated = diesel::update(
            host::table
                .filter(host::name.eq(name))
                .filter(host::deleted_at.is_null()),
        )
        .set((host::inventory.eq(inventory), host::updated_at.eq(Utc::now())))
        .get_result(conn)
        .await?;
        Ok(updated)
    }

    pub async fn set_wanted_version(
        name: &str,
        version: &str,
        conn: &mut Conn<'_>,
    ) -> Result<Self> {
        let updated = diesel::update(
            host::table
                .filter(host::name.eq(name))
                .filter(host::deleted_at.is_null()),
        )
        .set(host::wants_update_to.eq(version))
        .get_result(conn)
        .await?;
        Ok(updated)
    }

    pub async fn set_groups(name: &str, groups: &str, conn: &mut Conn<'_>) -> Result<usize> {
        let n_rows = diesel::update(host::table.filter(host::name.eq(name)))
            .set(host::groups.eq(groups))
            .execute(conn)
            .await?;
        Ok(n_rows)
    }

    pub async fn set_disabled_components(
        name: &str,
        disabled: &str,
        conn: &mut Conn<'_>,
    ) -> Result<Self> {
        let updated = diesel::update(
            host::table
                .filter(host::name.eq(name))
                .filter(host::deleted_at.is_null()),
        )
        .set(host::disabled_components.eq(disabled))
        .get_result(conn)
        .await?;
        Ok(updated)
    }

    /// Scheduled-deletion sweep: permanently removes marked hosts whose
    /// heartbeat went stale. Returns the names that were swept.
    pub async fn sweep_scheduled(conn: &mut Conn<'_>) -> Result<Vec<String>> {
        let cutoff = Utc::now() - STALE_HEARTBEAT;
        let stale: Vec<String> = host::table
            .filter(host::up_for_deletion.eq(true))
            .filter(host::updated_at.lt(cutoff))
            .select(host::name)
            .get_results(conn)
            .await?;
        for name in &stale {
            Self::force_delete(name, conn).await?;
        }
        Ok(stale)
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.updated_at > STALE_HEARTBEAT
    }

    /// Status label as shown to operators.
    pub fn display_status(&self, now: DateTime<Utc>) -> String {
        if self.up_for_deletion {
            "Scheduled for deletion".to_string()
        } else if self.is_stale(now) {
            "Offline".to_string()
        } else {
            self.status.clone()
        }
    }

    pub fn group_list(&self) -> Vec<String> {
        super::group::parse_list(&self.groups, ',')
    }

    pub fn disabled_component_list(&self) -> Vec<String> {
        super::group::parse_list(&self.disabled_components, ':')
    }

    pub fn component_disabled(&self, component: &str) -> bool {
        self.disabled_component_list().iter().any(|c| c == component)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = host)]
pub struct NewHost {
    pub name: String,
    pub ip_address: String,
    pub os: String,
    pub inventory: String,
    pub groups: String,
    pub installed_components: String,
    pub disabled_components: String,
    pub monokit_version: String,
    pub wants_update_to: String,
    pub status: String,
    pub up_for_deletion: bool,
    pub awx_only: bool,
    pub awx_host_id: String,
}

impl NewHost {
    pub async fn create(self, conn: &mut Conn<'_>) -> Result<Host> {
        let created = diesel::insert_into(host::table)
            .values(self)
            .get_result(conn)
            .await?;
        Ok(created)
    }
}

/// Field update for an existing host. `id` and `up_for_deletion` are never
/// touched here; registration preserves both.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = host)]
pub struct UpdateHost {
    pub ip_address: Option<String>,
    pub os: Option<String>,
    pub inventory: Option<String>,
    pub groups: Option<String>,
    pub installed_components: Option<String>,
    pub disabled_components: Option<String>,
    pub monokit_version: Option<String>,
    pub wants_update_to: Option<String>,
    pub status: Option<String>,
    pub awx_only: Option<bool>,
    pub awx_host_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl UpdateHost {
    pub async fn apply(self, name: &str, conn: &mut Conn<'_>) -> Result<Host> {
        let updated = diesel::update(
            host::table
                .filter(host::name.eq(name))
                .filter(host::deleted_at.is_null()),
        )
        .set(self)
        .get_result(conn)
        .await?;
        Ok(updated)
    }
}
