use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use crate::Result;
use crate::database::Conn;

use super::host::NIL;
use super::schema::{group, host};

/// Membership lives in each host's delimited `groups` string, not in a join
/// table, so group deletion has to rewrite every host row that mentions it.
#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = group)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub async fn create(name: &str, conn: &mut Conn<'_>) -> Result<Self> {
        let created = diesel::insert_into(group::table)
            .values(group::name.eq(name))
            .get_result(conn)
            .await?;
        Ok(created)
    }

    pub async fn by_name(name: &str, conn: &mut Conn<'_>) -> Result<Self> {
        let found = group::table
            .filter(group::name.eq(name))
            .get_result(conn)
            .await?;
        Ok(found)
    }

    pub async fn list(conn: &mut Conn<'_>) -> Result<Vec<Self>> {
        let groups = group::table.order(group::name.asc()).get_results(conn).await?;
        Ok(groups)
    }

    /// Deletes the group and scrubs it from every host's groups string.
    /// With `with_hosts`, member hosts are removed outright instead.
    pub async fn delete(name: &str, with_hosts: bool, conn: &mut Conn<'_>) -> Result<usize> {
        let members: Vec<(String, String)> = host::table
            .filter(host::deleted_at.is_null())
            .select((host::name, host::groups))
            .get_results(conn)
            .await?;

        for (host_name, groups) in members {
            let list = parse_list(&groups, ',');
            if !list.iter().any(|g| g == name) {
                continue;
            }
            if with_hosts {
                super::Host::force_delete(&host_name, conn).await?;
            } else {
                let rewritten = remove_from_list(&groups, name, ',', ",");
                super::Host::set_groups(&host_name, &rewritten, conn).await?;
            }
        }

        let n_rows = diesel::delete(group::table.filter(group::name.eq(name)))
            .execute(conn)
            .await?;
        Ok(n_rows)
    }
}

/// Parses a delimited membership string; the literal `nil` is the empty set.
pub fn parse_list(raw: &str, delimiter: char) -> Vec<String> {
    if raw.is_empty() || raw == NIL {
        return vec![];
    }
    // disabled_components is `::`-joined, which splits into empty segments.
    raw.split(delimiter)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_list(items: &[String], delimiter: &str) -> String {
    if items.is_empty() {
        NIL.to_string()
    } else {
        items.join(delimiter)
    }
}

pub fn add_to_list(raw: &str, item: &str, delimiter: char, join: &str) -> String {
    let mut items = parse_list(raw, delimiter);
    if !items.iter().any(|existing| existing == item) {
        items.push(item.to_string());
    }
    join_list(&items, join)
}

pub fn remove_from_list(raw: &str, item: &str, delimiter: char, join: &str) -> String {
    let items: Vec<String> = parse_list(raw, delimiter)
        .into_iter()
        .filter(|existing| existing != item)
        .collect();
    join_list(&items, join)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_means_empty() {
        assert!(parse_list("nil", ',').is_empty());
        assert!(parse_list("", ',').is_empty());
        assert_eq!(parse_list("web,db", ','), vec!["web", "db"]);
    }

    #[test]
    fn double_colon_join_round_trips() {
        let raw = "osHealth::mysqlHealth";
        assert_eq!(parse_list(raw, ':'), vec!["osHealth", "mysqlHealth"]);
        let items = parse_list(raw, ':');
        assert_eq!(join_list(&items, "::"), raw);
    }

    #[test]
    fn removing_last_member_yields_nil() {
        let one = remove_from_list("web,db", "web", ',', ",");
        assert_eq!(one, "db");
        assert_eq!(remove_from_list(&one, "db", ',', ","), "nil");
    }

    #[test]
    fn add_is_idempotent() {
        let grown = add_to_list("nil", "web", ',', ",");
        assert_eq!(grown, "web");
        assert_eq!(add_to_list(&grown, "web", ',', ","), "web");
        assert_eq!(add_to_list(&grown, "db", ',', ","), "web,db");
    }

    #[test]
    fn component_disable_uses_double_colon_join() {
        let disabled = add_to_list("nil", "osHealth", ':', "::");
        assert_eq!(disabled, "osHealth");
        let disabled = add_to_list(&disabled, "mysqlHealth", ':', "::");
        assert_eq!(disabled, "osHealth::mysqlHealth");
        assert_eq!(
            remove_from_list(&disabled, "osHealth", ':', "::"),
            "mysqlHealth"
        );
    }
}
