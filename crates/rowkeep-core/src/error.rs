//! Error types for Rowkeep operations.

use std::fmt;

use crate::value::Value;

/// The primary error type for all Rowkeep operations.
#[derive(Debug)]
pub enum Error {
    /// Operation attempted on a session that has been closed
    SessionClosed,
    /// A session call received an unusable argument (e.g. a NULL identifier)
    InvalidArgument(String),
    /// `remove` was called on an entity the session does not track
    NotPersisted(NotPersistedError),
    /// Entity metadata could not be resolved or an entity could not be rebuilt
    Mapping(MappingError),
    /// Type conversion errors
    Type(TypeError),
    /// Failure raised by the storage gateway, driver, or pool
    Storage(StorageError),
    /// Configuration errors
    Config(ConfigError),
}

#[derive(Debug)]
pub struct NotPersistedError {
    /// Rust type name of the entity.
    pub entity: &'static str,
    /// Identifier the entity carried at the time of the call, if readable.
    pub identifier: Option<Value>,
}

#[derive(Debug)]
pub struct MappingError {
    pub kind: MappingErrorKind,
    /// Rust type name of the entity being resolved.
    pub entity: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingErrorKind {
    /// No field is marked as the identifier
    MissingIdentifier,
    /// More than one field is marked as the identifier
    MultipleIdentifiers,
    /// Table or column name is not a plain SQL identifier
    InvalidName,
    /// Two fields resolve to the same column
    DuplicateColumn,
    /// A declared field has no value (entity cannot be rebuilt or written)
    MissingField,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Could not open or reach the database
    Connection,
    /// Connection pool exhausted, timed out, or closed
    Pool,
    /// Constraint violation (unique, foreign key, not null)
    Constraint,
    /// Database locked by another writer
    Busy,
    /// Any other engine-side failure
    Database,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl Error {
    /// Build a storage fault without an underlying cause.
    pub fn storage(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Error::Storage(StorageError {
            kind,
            sql: None,
            message: message.into(),
            source: None,
        })
    }

    /// Build an `InvalidArgument` error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Is this a failure raised by the storage layer?
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    /// Is this a metadata or reconstruction problem?
    pub fn is_mapping_error(&self) -> bool {
        matches!(self, Error::Mapping(_) | Error::Type(_))
    }

    /// The storage error kind, if this is a storage fault.
    pub fn storage_kind(&self) -> Option<StorageErrorKind> {
        match self {
            Error::Storage(e) => Some(e.kind),
            _ => None,
        }
    }

    /// The SQL text that failed, if known.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Storage(e) => e.sql.as_deref(),
            _ => None,
        }
    }
}

impl MappingError {
    pub fn new(kind: MappingErrorKind, entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// A declared field was absent from a set of field values.
    pub fn missing_field(entity: impl Into<String>, field: &str) -> Self {
        Self::new(
            MappingErrorKind::MissingField,
            entity,
            format!("no value for field '{field}'"),
        )
    }
}

impl StorageError {
    /// Attach the SQL text that produced this error.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Is this a constraint violation?
    pub fn is_constraint_violation(&self) -> bool {
        self.kind == StorageErrorKind::Constraint
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SessionClosed => write!(f, "Session is closed"),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::NotPersisted(e) => write!(f, "{}", e),
            Error::Mapping(e) => write!(f, "{}", e),
            Error::Type(e) => write!(f, "{}", e),
            Error::Storage(e) => write!(f, "{}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
        }
    }
}

impl fmt::Display for NotPersistedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Some(id) => write!(
                f,
                "{} with identifier {} is not tracked by this session",
                self.entity, id
            ),
            None => write!(f, "{} is not tracked by this session", self.entity),
        }
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mapping error for {}: {}", self.entity, self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "Type error in column '{}': expected {}, found {}",
                col, self.expected, self.actual
            )
        } else {
            write!(f, "Type error: expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Storage fault ({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl std::error::Error for MappingError {}
impl std::error::Error for TypeError {}

impl From<MappingError> for Error {
    fn from(err: MappingError) -> Self {
        Error::Mapping(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Storage(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(ConfigError {
            message: err.to_string(),
        })
    }
}

/// Result type alias for Rowkeep operations.
pub type Result<T> = std::result::Result<T, Error>;
