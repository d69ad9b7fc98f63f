use std::sync::Arc;

use displaydoc::Display;
use rand::RngCore;
use thiserror::Error;

use crate::auth::{FederatedAuthDisabled, Keycloak, SessionStore, TokenValidator, keycloak};
use crate::awx::Awx;
use crate::cache::{self, KeyValue};
use crate::database::{self, Pool};
use crate::error::code;
use crate::logbuf::LogBuffer;
use crate::model::inventory::DEFAULT_INVENTORY;
use crate::model::{Inventory, NewUser, User, UserRole};
use crate::registry::HostsList;

use super::Config;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// Failed to create automation engine client: {0}
    Awx(crate::error::Error),
    /// Failed to bootstrap initial data: {0}
    Bootstrap(crate::error::Error),
    /// Failed to create database pool: {0}
    Database(#[from] database::Error),
    /// Failed to create federated auth client: {0}
    Keycloak(#[from] keycloak::Error),
}

/// Service context handed to every handler. Each field is cheap to share;
/// external collaborators sit behind trait objects so tests can swap them.
pub struct Context {
    pub config: Arc<Config>,
    pub pool: Pool,
    pub cache: Arc<dyn KeyValue>,
    pub validator: Arc<dyn TokenValidator>,
    pub sessions: SessionStore,
    pub awx: Option<Awx>,
    pub hosts: HostsList,
    pub logs: LogBuffer,
    pub hostname: String,
}

impl Context {
    pub async fn new(config: Config) -> Result<Arc<Self>, Error> {
        let pool = Pool::new(&config.database).await?;
        let cache = cache::connect(&config.cache).await;

        let validator: Arc<dyn TokenValidator> = match &config.auth.keycloak {
            Some(keycloak) if keycloak.enabled => Arc::new(Keycloak::new(keycloak)?),
            _ => Arc::new(FederatedAuthDisabled),
        };

        let sessions = SessionStore::new(
            pool.clone(),
            cache.clone(),
            config.auth.session_timeout,
            config.cache.session_ttl,
        );

        let awx = match &config.awx {
            Some(awx) if awx.enabled => Some(Awx::new(awx.clone()).map_err(Error::Awx)?),
            _ => None,
        };

        let logs = LogBuffer::new(config.logs.clone(), Arc::new(pool.clone()));
        logs.start();

        let hostname = config.hostname();
        let hosts = HostsList::new(cache.clone(), config.cache.host_ttl);
        Ok(Arc::new(Context {
            config: Arc::new(config),
            pool,
            cache,
            validator,
            sessions,
            awx,
            hosts,
            logs,
            hostname,
        }))
    }

    /// Seeds what the rest of the system assumes exists: the default
    /// inventory, exactly one admin when the user table is empty, and the
    /// initial hosts snapshot.
    pub async fn bootstrap(&self) -> Result<(), Error> {
        let mut conn = self.pool.conn().await.map_err(Error::Database)?;

        Inventory::ensure(DEFAULT_INVENTORY, &mut conn)
            .await
            .map_err(Error::Bootstrap)?;

        let n_users = User::count(&mut conn).await.map_err(Error::Bootstrap)?;
        if n_users == 0 {
            let mut bytes = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut bytes);
            let password = hex::encode(bytes);
            NewUser::new("admin", &password, "", UserRole::Admin)
                .map_err(Error::Bootstrap)?
                .create(&mut conn)
                .await
                .map_err(Error::Bootstrap)?;
            tracing::warn!("created initial admin user with password `{password}`");
        }

        self.hosts.refresh(&mut conn).await.map_err(Error::Bootstrap)?;
        Ok(())
    }

    /// The orchestrator, or the stable `AWX_NOT_ENABLED` failure.
    pub fn awx(&self) -> crate::Result<&Awx> {
        self.awx.as_ref().ok_or_else(|| {
            crate::Error::awx(code::AWX_NOT_ENABLED, "automation engine is not configured")
        })
    }

    pub fn is_self_host(&self, host_name: &str) -> bool {
        host_name == self.hostname
    }

    /// Flushes what is still buffered and stops background work.
    pub async fn shutdown(&self) {
        self.logs.close().await;
    }
}
