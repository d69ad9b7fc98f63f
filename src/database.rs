use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::bb8::{Pool as Bb8Pool, PooledConnection, RunError};
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, PoolError};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use displaydoc::Display;
use thiserror::Error;

use crate::config::DatabaseConfig;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub type Conn<'a> = PooledConnection<'a, AsyncPgConnection>;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// Failed to build database pool: {0}
    BuildPool(PoolError),
    /// Failed to check out database connection: {0}
    Checkout(RunError),
    /// Failed to connect for migrations: {0}
    MigrationConnect(diesel::ConnectionError),
    /// Failed to run pending migrations: {0}
    Migration(Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Clone)]
pub struct Pool {
    inner: Bb8Pool<AsyncPgConnection>,
}

impl Pool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, Error> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.url.clone());
        let inner = Bb8Pool::builder()
            .max_size(config.max_conns)
            .min_idle(Some(config.min_conns))
            .connection_timeout(config.pool_timeout)
            .build(manager)
            .await
            .map_err(Error::BuildPool)?;
        Ok(Pool { inner })
    }

    pub async fn conn(&self) -> Result<Conn<'_>, Error> {
        self.inner.get().await.map_err(Error::Checkout)
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").finish_non_exhaustive()
    }
}

/// Runs pending migrations over a short-lived synchronous connection.
pub fn run_migrations(database_url: &str) -> Result<(), Error> {
    let mut conn = PgConnection::establish(database_url).map_err(Error::MigrationConnect)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map(|_| ())
        .map_err(Error::Migration)
}
