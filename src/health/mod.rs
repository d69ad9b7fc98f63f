//! Health data registry and local provider fallback.
//!
//! Tools post JSON health payloads which are upserted per `(host, tool)`.
//! Reads decode each payload; when the queried host is the process's own
//! host, locally registered providers fill in tools that have no stored
//! row, collected concurrently with a mutex-guarded merge.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::task::JoinSet;

use crate::Result;
use crate::database::Conn;
use crate::error::Error;
use crate::model::{Host, HostHealthData, UpsertHealthData};

/// A locally registered collector producing a structured health object for
/// a host.
#[async_trait]
pub trait HealthProvider: Send + Sync {
    async fn collect(&self, host_name: &str) -> anyhow::Result<Value>;
}

type Registry = RwLock<HashMap<String, Arc<dyn HealthProvider>>>;

static PROVIDERS: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    PROVIDERS.get_or_init(|| RwLock::new(HashMap::new()))
}

pub fn register(name: &str, provider: Arc<dyn HealthProvider>) {
    registry()
        .write()
        .expect("provider registry")
        .insert(name.to_string(), provider);
}

pub fn get(name: &str) -> Option<Arc<dyn HealthProvider>> {
    registry().read().expect("provider registry").get(name).cloned()
}

pub fn list() -> Vec<String> {
    let mut names: Vec<_> = registry()
        .read()
        .expect("provider registry")
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

pub fn all() -> HashMap<String, Arc<dyn HealthProvider>> {
    registry().read().expect("provider registry").clone()
}

/// Stores one tool's payload for a host. The payload must parse as JSON;
/// the host must exist.
pub async fn post(
    host_name: &str,
    tool_name: &str,
    payload: &str,
    conn: &mut Conn<'_>,
) -> Result<HostHealthData> {
    Host::by_name(host_name, conn).await.map_err(|_| Error::NotFound("host"))?;
    if serde_json::from_str::<Value>(payload).is_err() {
        return Err(Error::validation(format!(
            "health payload for `{tool_name}` is not valid JSON"
        )));
    }
    UpsertHealthData::new(host_name, tool_name, payload.to_string())
        .apply(conn)
        .await
}

/// All stored health for a host, decoded per tool. An empty aggregate is an
/// empty map, not an error. When `self_host` is set, registered providers
/// without a stored row are invoked to fill the gaps.
pub async fn aggregate(
    host_name: &str,
    self_host: bool,
    conn: &mut Conn<'_>,
) -> Result<Map<String, Value>> {
    let rows = HostHealthData::by_host(host_name, conn).await?;
    let mut merged = decode_rows(rows);

    if self_host {
        let missing: HashMap<_, _> = all()
            .into_iter()
            .filter(|(name, _)| !merged.contains_key(name))
            .collect();
        collect_from_providers(host_name, &mut merged, missing).await;
    }

    Ok(merged)
}

/// One tool's health for a host: store first, local provider as the
/// self-host fallback, 404 when neither yields.
pub async fn tool(
    host_name: &str,
    tool_name: &str,
    self_host: bool,
    conn: &mut Conn<'_>,
) -> Result<Value> {
    if let Some(row) = HostHealthData::by_host_tool(host_name, tool_name, conn).await? {
        return Ok(decode_payload(&row.tool_name, &row.data_json));
    }
    if self_host {
        if let Some(provider) = get(tool_name) {
            return match provider.collect(host_name).await {
                Ok(value) => Ok(value),
                Err(err) => Ok(json!({ "error": err.to_string() })),
            };
        }
    }
    Err(Error::NotFound("health data"))
}

/// Decodes stored rows into the per-tool aggregate map. Undecodable
/// payloads become an error placeholder so one bad tool cannot hide the
/// rest.
fn decode_rows(rows: Vec<HostHealthData>) -> Map<String, Value> {
    let mut merged = Map::new();
    for row in rows {
        let value = decode_payload(&row.tool_name, &row.data_json);
        merged.insert(row.tool_name, value);
    }
    merged
}

fn decode_payload(tool_name: &str, raw: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("stored health for `{tool_name}` is undecodable: {err}");
            json!({ "error": format!("stored payload is not valid JSON: {err}") })
        }
    }
}

/// Runs the given providers concurrently and merges their results into the
/// aggregate under a mutex.
async fn collect_from_providers(
    host_name: &str,
    merged: &mut Map<String, Value>,
    providers: HashMap<String, Arc<dyn HealthProvider>>,
) {
    let results = Arc::new(tokio::sync::Mutex::new(Map::new()));
    let mut tasks = JoinSet::new();
    for (name, provider) in providers {
        let results = results.clone();
        let host_name = host_name.to_string();
        tasks.spawn(async move {
            let value = match provider.collect(&host_name).await {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!("health provider `{name}` failed: {err}");
                    json!({ "error": err.to_string() })
                }
            };
            results.lock().await.insert(name, value);
        });
    }
    while tasks.join_next().await.is_some() {}

    let collected = std::mem::take(&mut *results.lock().await);
    for (name, value) in collected {
        merged.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    struct StaticProvider(Value);

    #[async_trait]
    impl HealthProvider for StaticProvider {
        async fn collect(&self, _host_name: &str) -> anyhow::Result<Value> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl HealthProvider for FailingProvider {
        async fn collect(&self, _host_name: &str) -> anyhow::Result<Value> {
            anyhow::bail!("sensor unavailable")
        }
    }

    fn row(tool: &str, payload: &str) -> HostHealthData {
        HostHealthData {
            id: 1,
            host_name: "alpha".to_string(),
            tool_name: tool.to_string(),
            data_json: payload.to_string(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn undecodable_rows_become_placeholders() {
        let merged = decode_rows(vec![
            row("osHealth", r#"{"disk": 42}"#),
            row("mysqlHealth", "not-json"),
        ]);
        assert_eq!(merged["osHealth"]["disk"], 42);
        assert!(merged["mysqlHealth"]["error"].is_string());
    }

    #[tokio::test]
    async fn providers_fill_missing_tools_only() {
        let mut merged = decode_rows(vec![row("osHealth", r#"{"disk": 42}"#)]);
        let mut providers: HashMap<String, Arc<dyn HealthProvider>> = HashMap::new();
        providers.insert(
            "osHealth".to_string(),
            Arc::new(StaticProvider(json!({"disk": 0}))),
        );
        providers.insert(
            "redisHealth".to_string(),
            Arc::new(StaticProvider(json!({"role": "master"}))),
        );
        let providers = providers
            .into_iter()
            .filter(|(name, _)| !merged.contains_key(name))
            .collect();

        collect_from_providers("alpha", &mut merged, providers).await;

        // The stored row wins over the live provider.
        assert_eq!(merged["osHealth"]["disk"], 42);
        assert_eq!(merged["redisHealth"]["role"], "master");
    }

    #[tokio::test]
    async fn failing_provider_yields_error_placeholder() {
        let mut merged = Map::new();
        let mut providers: HashMap<String, Arc<dyn HealthProvider>> = HashMap::new();
        providers.insert("pmgHealth".to_string(), Arc::new(FailingProvider));

        collect_from_providers("alpha", &mut merged, providers).await;
        assert_eq!(merged["pmgHealth"]["error"], "sensor unavailable");
    }

    #[test]
    fn registry_round_trip() {
        register("zimbraHealth", Arc::new(StaticProvider(json!({"queue": 0}))));
        assert!(get("zimbraHealth").is_some());
        assert!(list().contains(&"zimbraHealth".to_string()));
        assert!(all().contains_key("zimbraHealth"));
        assert!(get("missing").is_none());
    }
}
