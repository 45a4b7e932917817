//! SQLite connection implementation.
//!
//! This module provides safe wrappers around SQLite's C API and implements
//! the Connection trait from rowkeep-core.

#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers
#![allow(clippy::if_not_else)]

use crate::ffi;
use crate::types;
use rowkeep_core::error::StorageError;
use rowkeep_core::{ColumnInfo, Connection, Error, Result, Row, StorageErrorKind, Value};
use serde::{Deserialize, Serialize};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in multi-thread mode (connections not shared between threads).
    pub no_mutex: bool,
    /// Open in serialized mode (connections can be shared).
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    ///
    /// Every connection opened from this config gets its own private
    /// database, so a pool over it should hold a single connection.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

struct SqliteInner {
    db: *mut ffi::sqlite3,
}

// SAFETY: the handle is only ever touched while holding the Mutex in
// SqliteConnection, so it is never used from two threads at once.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
///
/// This is a thread-safe wrapper around a SQLite database handle.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::storage(
                StorageErrorKind::Connection,
                "Invalid path: contains null byte",
            )
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if !db.is_null() {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = errmsg(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            } else {
                ffi::error_string(rc).to_string()
            };

            tracing::warn!(path = %config.path, code = rc, "Failed to open SQLite database");
            return Err(Error::storage(
                StorageErrorKind::Connection,
                format!("Failed to open database {}: {}", config.path, msg),
            ));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        tracing::debug!(path = %config.path, "Opened SQLite connection");
        Ok(Self {
            inner: Mutex::new(SqliteInner { db }),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Execute SQL directly without preparing (for DDL, etc.)
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock();
        let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;

        tracing::trace!(sql, "Executing SQLite batch");
        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(inner.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let msg = if !errmsg.is_null() {
                // SAFETY: errmsg was allocated by sqlite3_exec and is freed once
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            } else {
                ffi::error_string(rc).to_string()
            };

            return Err(storage_error(error_code_to_kind(rc), sql, msg));
        }

        Ok(())
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> i32 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_changes(inner.db) }
    }

    /// Prepare and execute a query, returning all rows.
    fn query_sync(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::trace!(sql, params = params.len(), "Executing SQLite query");
        let inner = self.lock();
        let stmt = Statement::prepare(inner.db, sql)?;
        stmt.bind_all(params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.raw) };
        let mut col_names = Vec::with_capacity(col_count as usize);
        for i in 0..col_count {
            // SAFETY: stmt is valid, i is in range
            let name =
                unsafe { types::column_name(stmt.raw, i) }.unwrap_or_else(|| format!("col{}", i));
            col_names.push(name);
        }
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            let rc = unsafe { ffi::sqlite3_step(stmt.raw) };
            match rc {
                ffi::SQLITE_ROW => {
                    let mut values = Vec::with_capacity(col_count as usize);
                    for i in 0..col_count {
                        // SAFETY: stmt is valid, we just got SQLITE_ROW
                        values.push(unsafe { types::read_column(stmt.raw, i) });
                    }
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(last_error(inner.db, sql)),
            }
        }

        Ok(rows)
    }

    /// Prepare and execute a statement, returning rows affected.
    fn execute_sync(&self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::trace!(sql, params = params.len(), "Executing SQLite statement");
        let inner = self.lock();
        let stmt = Statement::prepare(inner.db, sql)?;
        stmt.bind_all(params)?;

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt.raw) };
        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid
                let changes = unsafe { ffi::sqlite3_changes(inner.db) };
                Ok(changes as u64)
            }
            _ => Err(last_error(inner.db, sql)),
        }
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid and no statement outlives the call that prepared it
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
        }
    }
}

impl Connection for SqliteConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.query_sync(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.execute_sync(sql, params)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.execute_raw(sql)
    }
}

/// A prepared statement, finalized on drop.
struct Statement {
    raw: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
    sql_text: String,
}

impl Statement {
    fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Self> {
        let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut raw,
                ptr::null_mut(),
            )
        };

        if rc != ffi::SQLITE_OK {
            return Err(last_error(db, sql));
        }

        Ok(Self {
            raw,
            db,
            sql_text: sql.to_string(),
        })
    }

    fn bind_all(&self, params: &[Value]) -> Result<()> {
        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(self.raw, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: db is valid
                let msg = unsafe { errmsg(self.db) };
                return Err(storage_error(
                    StorageErrorKind::Database,
                    &self.sql_text,
                    format!("Failed to bind parameter {}: {}", i + 1, msg),
                ));
            }
        }
        Ok(())
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: raw came from sqlite3_prepare_v2; finalize accepts null
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

/// # Safety
/// `db` must be a valid connection handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: forwarded from the caller
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn last_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (errmsg(db), ffi::sqlite3_errcode(db)) };
    storage_error(error_code_to_kind(code), sql, msg)
}

fn null_byte_error(sql: &str) -> Error {
    storage_error(StorageErrorKind::Database, sql, "SQL contains null byte")
}

fn storage_error(kind: StorageErrorKind, sql: &str, message: impl Into<String>) -> Error {
    Error::Storage(StorageError {
        kind,
        sql: Some(sql.to_string()),
        message: message.into(),
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> StorageErrorKind {
    // Extended result codes carry the primary code in the low byte.
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => StorageErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => StorageErrorKind::Busy,
        ffi::SQLITE_CANTOPEN | ffi::SQLITE_NOTADB => StorageErrorKind::Connection,
        _ => StorageErrorKind::Database,
    }
}
