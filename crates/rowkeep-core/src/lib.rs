//! Core types and traits for Rowkeep.
//!
//! This crate provides the foundations every other Rowkeep crate builds on:
//!
//! - `Entity` trait: the explicit per-type mapping descriptor
//! - `EntityMapping` resolution (table, columns, identifier, generation strategy)
//! - `Value`, `Row`, and `FieldValues` for moving data in and out of storage
//! - `CodecRegistry` for typed decoding of raw storage values
//! - `Connection` trait for synchronous database connections
//! - `Error` and `Result`

pub mod codec;
pub mod connection;
pub mod entity;
pub mod error;
pub mod field;
pub mod identifiers;
pub mod mapping;
pub mod row;
pub mod types;
pub mod value;

pub use codec::{CodecRegistry, ValueCodec};
pub use connection::Connection;
pub use entity::Entity;
pub use error::{
    ConfigError, Error, MappingError, MappingErrorKind, NotPersistedError, Result, StorageError,
    StorageErrorKind, TypeError,
};
pub use field::{FieldInfo, FieldValues, GenerationStrategy};
pub use identifiers::{default_name, is_plain_identifier};
pub use mapping::{ColumnMapping, EntityMapping};
pub use row::{ColumnInfo, Row};
pub use types::{SqlType, TypeInfo};
pub use value::Value;
