//! Rowkeep - a small unit-of-work persistence runtime.
//!
//! Rowkeep keeps application code talking to entities instead of SQL:
//!
//! - An identity map so one session hands out one live instance per row
//! - Snapshot-based dirty checking that writes back in-place mutations on close
//! - A FIFO action queue replayed on flush, in exactly the order it was recorded
//! - A statement builder and pooled SQLite gateway underneath
//!
//! # Quick Start
//!
//! ```ignore
//! use rowkeep::prelude::*;
//!
//! #[derive(Entity, Debug, Clone, PartialEq)]
//! #[rowkeep(table = "person")]
//! struct Person {
//!     #[rowkeep(id, generated = "identity")]
//!     id: i64,
//!     first_name: String,
//!     last_name: String,
//! }
//!
//! fn main() -> Result<()> {
//!     let factory = SessionFactory::sqlite(SqliteConfig::file("people.db"), PoolConfig::new(4))?;
//!     let mut session = factory.open_session();
//!
//!     // Loaded once, cached afterwards
//!     if let Some(ada) = session.find::<Person>(1_i64)? {
//!         ada.write().last_name = "Lovelace".to_string();
//!     }
//!
//!     // Queued, written on flush/close
//!     session.persist(&EntityRef::new(Person {
//!         id: 2,
//!         first_name: "Grace".to_string(),
//!         last_name: "Hopper".to_string(),
//!     }))?;
//!
//!     // Dirty check + flush
//!     session.close()?;
//!     Ok(())
//! }
//! ```
//!
//! Generated `Entity` impls refer to `rowkeep_core`, so crates deriving
//! `Entity` depend on `rowkeep-core` alongside `rowkeep`.

pub use rowkeep_core::{
    CodecRegistry, ColumnMapping, Connection, Entity, EntityMapping, Error, FieldInfo, FieldValues,
    GenerationStrategy, MappingError, MappingErrorKind, NotPersistedError, Result, Row, SqlType,
    StorageError, StorageErrorKind, TypeError, Value, ValueCodec,
};

pub use rowkeep_macros::Entity;

pub use rowkeep_query::{Statement, StatementBuilder, StatementKind};

pub use rowkeep_pool::{ConnectionManager, Pool, PoolConfig, PoolStats, PooledConnection};

pub use rowkeep_session::{
    ActionKind, EntityIdentity, EntityRef, FlushResult, PendingAction, Session, SessionConfig,
    SessionState, SqlGateway, StorageGateway,
};

pub use rowkeep_sqlite::{OpenFlags, SqliteConfig, SqliteConnection, SqliteManager};

pub mod factory;
pub use factory::{FactoryConfig, SessionFactory, SqliteGateway};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use rowkeep::prelude::*;
/// ```
pub mod prelude {
    pub use crate::factory::{FactoryConfig, SessionFactory};
    pub use crate::{
        Entity, EntityRef, Error, FlushResult, PoolConfig, Result, Session, SessionConfig,
        SqliteConfig, StorageGateway, Value,
    };
}
