//! Optional key-value tier in front of the store.
//!
//! Every operation is best-effort: failures are logged and swallowed, and
//! when the tier is disabled or unreachable a no-op implementation is
//! installed instead, so callers never branch on cache availability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::config::CacheConfig;

#[async_trait]
pub trait KeyValue: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str, ttl: Duration);
    async fn delete(&self, key: &str);
}

/// Installed when the cache is disabled or the connection failed.
pub struct NoopCache;

#[async_trait]
impl KeyValue for NoopCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) {}

    async fn delete(&self, _key: &str) {}
}

pub struct RedisCache {
    conn: ConnectionManager,
    key_prefix: String,
    write_timeout: Duration,
}

impl RedisCache {
    pub async fn connect(config: &CacheConfig) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url(config))?;
        let conn = client.get_connection_manager().await?;
        Ok(RedisCache {
            conn,
            key_prefix: config.key_prefix.clone(),
            write_timeout: config.write_timeout,
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl KeyValue for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(self.key(key)).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("cache get failed for `{key}`: {err}");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut conn = self.conn.clone();
        let full_key = self.key(key);
        let ttl_secs = ttl.as_secs().max(1);
        let write = conn.set_ex::<_, _, ()>(&full_key, value, ttl_secs);
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!("cache set failed for `{key}`: {err}"),
            Err(_) => tracing::warn!("cache set timed out for `{key}`"),
        }
    }

    async fn delete(&self, key: &str) {
        let mut conn = self.conn.clone();
        if let Err(err) = conn.del::<_, ()>(self.key(key)).await {
            tracing::warn!("cache delete failed for `{key}`: {err}");
        }
    }
}

/// Connects the configured tier, degrading to no-op when disabled or when
/// the connection cannot be established.
pub async fn connect(config: &CacheConfig) -> Arc<dyn KeyValue> {
    if !config.enabled {
        return Arc::new(NoopCache);
    }
    match RedisCache::connect(config).await {
        Ok(cache) => Arc::new(cache),
        Err(err) => {
            tracing::warn!("cache unavailable, continuing without it: {err}");
            Arc::new(NoopCache)
        }
    }
}

fn redis_url(config: &CacheConfig) -> String {
    let address = config
        .address
        .strip_prefix("redis://")
        .unwrap_or(&config.address);
    if config.password.is_empty() {
        format!("redis://{}/{}", address, config.database)
    } else {
        format!("redis://:{}@{}/{}", config.password, address, config.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_includes_password_and_database() {
        let config = CacheConfig {
            enabled: true,
            address: "cache.internal:6380".to_string(),
            password: "pw".to_string(),
            database: 3,
            ..Default::default()
        };
        assert_eq!(redis_url(&config), "redis://:pw@cache.internal:6380/3");
    }

    #[test]
    fn url_tolerates_scheme_prefix() {
        let config = CacheConfig {
            address: "redis://127.0.0.1:6379".to_string(),
            ..Default::default()
        };
        assert_eq!(redis_url(&config), "redis://127.0.0.1:6379/0");
    }

    #[tokio::test]
    async fn noop_swallows_everything() {
        let cache = NoopCache;
        cache.set("k", "v", Duration::from_secs(5)).await;
        assert_eq!(cache.get("k").await, None);
        cache.delete("k").await;
    }
}
