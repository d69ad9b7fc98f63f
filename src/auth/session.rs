use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::cache::KeyValue;
use crate::database::Pool;
use crate::model::{Session, User};

/// Operator sessions: issued against the store, mirrored into the cache
/// tier. Cache hits bypass the store entirely; misses fall through and
/// repopulate. Expired sessions are deleted wherever they are encountered.
pub struct SessionStore {
    pool: Pool,
    cache: Arc<dyn KeyValue>,
    session_lifetime: Duration,
    cache_ttl: Duration,
}

#[derive(Serialize, Deserialize)]
struct CachedSession {
    session: Session,
    user: User,
}

fn cache_key(token: &str) -> String {
    format!("session:{token}")
}

impl SessionStore {
    pub fn new(
        pool: Pool,
        cache: Arc<dyn KeyValue>,
        session_lifetime: Duration,
        cache_ttl: Duration,
    ) -> Self {
        SessionStore {
            pool,
            cache,
            session_lifetime,
            cache_ttl,
        }
    }

    pub async fn issue(&self, user: &User) -> Result<Session> {
        let timeout = Utc::now()
            + chrono::Duration::from_std(self.session_lifetime)
                .unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut conn = self.pool.conn().await?;
        let session = Session::issue(user.id, timeout, &mut conn).await?;
        drop(conn);
        self.mirror(&session, user).await;
        Ok(session)
    }

    pub async fn lookup(&self, token: &str) -> Result<Option<(Session, User)>> {
        if let Some(raw) = self.cache.get(&cache_key(token)).await {
            if let Ok(cached) = serde_json::from_str::<CachedSession>(&raw) {
                if cached.session.expired(Utc::now()) {
                    self.revoke(token).await?;
                    return Ok(None);
                }
                return Ok(Some((cached.session, cached.user)));
            }
        }

        let mut conn = self.pool.conn().await?;
        let Some(session) = Session::by_token(token, &mut conn).await? else {
            return Ok(None);
        };
        if session.expired(Utc::now()) {
            // Expire-on-encounter.
            Session::revoke(token, &mut conn).await?;
            return Ok(None);
        }
        let user = User::by_id(session.user_id, &mut conn).await?;
        drop(conn);

        self.mirror(&session, &user).await;
        Ok(Some((session, user)))
    }

    /// Purges both tiers.
    pub async fn revoke(&self, token: &str) -> Result<usize> {
        self.cache.delete(&cache_key(token)).await;
        let mut conn = self.pool.conn().await?;
        Session::revoke(token, &mut conn).await
    }

    async fn mirror(&self, session: &Session, user: &User) {
        let cached = CachedSession {
            session: session.clone(),
            user: user.clone(),
        };
        match serde_json::to_string(&cached) {
            Ok(raw) => {
                self.cache
                    .set(&cache_key(&session.token), &raw, self.cache_ttl)
                    .await;
            }
            Err(err) => tracing::warn!("cannot serialize session for cache: {err}"),
        }
    }
}
