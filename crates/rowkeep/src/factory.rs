//! Session factory: the bootstrap that hands out sessions over one gateway.
//!
//! # Example
//!
//! ```rust,ignore
//! use rowkeep::prelude::*;
//!
//! let factory = SessionFactory::sqlite(SqliteConfig::file("app.db"), PoolConfig::new(4))?;
//! let mut session = factory.open_session();
//! let person = session.find::<Person>(1_i64)?;
//! session.close()?;
//! ```

use std::sync::Arc;

use rowkeep_core::Result;
use rowkeep_pool::{Pool, PoolConfig};
use rowkeep_session::{Session, SessionConfig, SqlGateway, StorageGateway};
use rowkeep_sqlite::{SqliteConfig, SqliteManager};
use serde::{Deserialize, Serialize};

/// Gateway type produced by [`SessionFactory::sqlite`].
pub type SqliteGateway = SqlGateway<SqliteManager>;

/// Everything needed to bootstrap a SQLite-backed factory, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    pub sqlite: SqliteConfig,
    pub pool: PoolConfig,
    pub session: SessionConfig,
}

impl FactoryConfig {
    /// Parse a factory configuration from JSON. Missing sections keep their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            rowkeep_core::Error::Config(rowkeep_core::ConfigError {
                message: format!("invalid factory configuration: {e}"),
            })
        })
    }
}

/// Opens sessions that share one storage gateway.
pub struct SessionFactory<G: StorageGateway> {
    gateway: Arc<G>,
    config: SessionConfig,
}

impl<G: StorageGateway> SessionFactory<G> {
    /// Factory over an existing gateway with the default session configuration.
    pub fn new(gateway: G) -> Self {
        Self {
            gateway: Arc::new(gateway),
            config: SessionConfig::default(),
        }
    }

    /// Configuration applied by [`open_session`](Self::open_session).
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Open a session with the factory's configuration.
    pub fn open_session(&self) -> Session<Arc<G>> {
        self.open_session_with(self.config.clone())
    }

    /// Open a session with an explicit configuration.
    pub fn open_session_with(&self, config: SessionConfig) -> Session<Arc<G>> {
        Session::with_config(Arc::clone(&self.gateway), config)
    }
}

impl SessionFactory<SqliteGateway> {
    /// Factory over a pooled SQLite database.
    ///
    /// Each `:memory:` connection is its own private database, so in-memory
    /// factories should use a pool of one connection.
    pub fn sqlite(config: SqliteConfig, pool_config: PoolConfig) -> Result<Self> {
        if config.is_memory() && pool_config.max_connections > 1 {
            tracing::warn!(
                max_connections = pool_config.max_connections,
                "In-memory SQLite with more than one pooled connection; each connection sees its own database"
            );
        }
        let pool = Pool::new(SqliteManager::new(config), pool_config)?;
        tracing::debug!("Created SQLite session factory");
        Ok(Self::new(SqlGateway::new(Arc::new(pool))))
    }

    /// Factory from a full [`FactoryConfig`].
    pub fn from_config(config: FactoryConfig) -> Result<Self> {
        Ok(Self::sqlite(config.sqlite, config.pool)?.with_config(config.session))
    }

    /// Run a batch of SQL (schema setup, seeding) on one pooled connection.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        use rowkeep_core::Connection;

        let conn = self.gateway.pool().acquire()?;
        conn.execute_batch(sql)
    }
}

impl<G: StorageGateway> std::fmt::Debug for SessionFactory<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
