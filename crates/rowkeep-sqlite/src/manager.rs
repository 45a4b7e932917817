//! Pool integration: opens SQLite connections on demand.

use rowkeep_core::Result;
use rowkeep_pool::ConnectionManager;

use crate::connection::{SqliteConfig, SqliteConnection};

/// A [`ConnectionManager`] that opens one SQLite connection per pool slot.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    config: SqliteConfig,
}

impl SqliteManager {
    pub fn new(config: SqliteConfig) -> Self {
        if config.is_memory() {
            tracing::debug!("In-memory SQLite manager: each pooled connection sees its own database");
        }
        Self { config }
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

impl ConnectionManager for SqliteManager {
    type Connection = SqliteConnection;

    fn connect(&self) -> Result<SqliteConnection> {
        SqliteConnection::open(&self.config)
    }
}
