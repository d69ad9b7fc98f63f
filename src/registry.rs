//! Process-wide snapshot of the host table.
//!
//! Every registry mutation publishes a fresh immutable snapshot; readers
//! grab the current `Arc` and may observe at most one mutation of lag.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::Result;
use crate::cache::{KeyValue, NoopCache};
use crate::database::Conn;
use crate::model::Host;

pub struct HostsList {
    inner: ArcSwap<Vec<Host>>,
    cache: Arc<dyn KeyValue>,
    cache_ttl: Duration,
}

impl HostsList {
    pub fn new(cache: Arc<dyn KeyValue>, cache_ttl: Duration) -> Self {
        HostsList {
            inner: ArcSwap::from_pointee(Vec::new()),
            cache,
            cache_ttl,
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Host>> {
        self.inner.load_full()
    }

    pub fn publish(&self, hosts: Vec<Host>) {
        self.inner.store(Arc::new(hosts));
    }

    /// Reloads the snapshot from the store and re-mirrors each host into
    /// the cache tier. Called by every host mutator.
    pub async fn refresh(&self, conn: &mut Conn<'_>) -> Result<()> {
        let hosts = Host::list_all(conn).await?;
        for host in &hosts {
            if let Ok(raw) = serde_json::to_string(host) {
                self.cache
                    .set(&format!("host:{}", host.name), &raw, self.cache_ttl)
                    .await;
            }
        }
        self.publish(hosts);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Host> {
        self.snapshot().iter().find(|host| host.name == name).cloned()
    }
}

impl Default for HostsList {
    fn default() -> Self {
        Self::new(Arc::new(NoopCache), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn host(name: &str) -> Host {
        Host {
            id: 1,
            name: name.to_string(),
            ip_address: "10.0.0.1".to_string(),
            os: "debian".to_string(),
            inventory: "default".to_string(),
            groups: "nil".to_string(),
            installed_components: String::new(),
            disabled_components: "nil".to_string(),
            monokit_version: "7.0.0".to_string(),
            wants_update_to: String::new(),
            status: "Online".to_string(),
            up_for_deletion: false,
            awx_only: false,
            awx_host_id: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn publish_replaces_snapshot() {
        let list = HostsList::default();
        assert!(list.snapshot().is_empty());

        let old = list.snapshot();
        list.publish(vec![host("alpha"), host("beta")]);

        // Readers holding the old snapshot are unaffected.
        assert!(old.is_empty());
        assert_eq!(list.snapshot().len(), 2);
        assert!(list.find("alpha").is_some());
        assert!(list.find("gamma").is_none());
    }
}
