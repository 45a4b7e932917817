//! SQLite driver for Rowkeep.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate implements the `Connection` trait from rowkeep-core on top of
//! the SQLite C API, and a `ConnectionManager` so the blocking pool in
//! rowkeep-pool can open connections on demand. SQLite itself is compiled
//! from the amalgamation bundled with `libsqlite3-sys`.
//!
//! # Example
//!
//! ```rust,ignore
//! use rowkeep_core::{Connection, Value};
//! use rowkeep_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_batch("CREATE TABLE person (id INTEGER PRIMARY KEY, first_name TEXT)")?;
//! conn.execute("INSERT INTO person (first_name) VALUES (?)", &[Value::from("Alice")])?;
//! ```
//!
//! # Type Mapping
//!
//! | Rust Type | SQLite Type |
//! |-----------|-------------|
//! | `bool` | INTEGER (0/1) |
//! | `i8`, `i16`, `i32`, `i64` | INTEGER |
//! | `f32`, `f64` | REAL |
//! | `String` | TEXT |
//! | `Vec<u8>` | BLOB |
//! | `serde_json::Value` | TEXT |
//! | `Option<T>` | NULL or T |
//!
//! Reads come back as the widest value of each storage class (`BigInt`,
//! `Double`, `Text`, `Bytes`); the codec registry narrows them to the
//! declared field type.
//!
//! # Thread Safety
//!
//! `SqliteConnection` is `Send` and `Sync`; a mutex guards the underlying
//! handle.

pub mod connection;
pub mod ffi;
pub mod manager;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};
pub use manager::SqliteManager;

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
