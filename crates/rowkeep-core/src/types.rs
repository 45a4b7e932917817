//! SQL type definitions and mapping.

/// Semantic SQL type of a mapped field.
///
/// The codec registry is keyed by this type, so every field read back from
/// storage is decoded by the codec registered for its declared `SqlType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    // Integer types
    TinyInt,
    SmallInt,
    Integer,
    BigInt,

    // Floating point
    Real,
    Double,

    // Boolean
    Boolean,

    // String / binary
    Text,
    Blob,

    // JSON document
    Json,
}

impl SqlType {
    /// Get the SQL type name for this type.
    pub const fn sql_name(&self) -> &'static str {
        match self {
            SqlType::TinyInt => "TINYINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
            SqlType::Json => "JSON",
        }
    }

    /// Check if this type is an integer type.
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt
        )
    }

    /// Check if this type is numeric.
    pub const fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, SqlType::Real | SqlType::Double)
    }
}

/// Trait for types that have a corresponding SQL type.
pub trait TypeInfo {
    /// The SQL type for this Rust type.
    const SQL_TYPE: SqlType;

    /// Whether this type is nullable by default.
    const NULLABLE: bool = false;
}

impl TypeInfo for i8 {
    const SQL_TYPE: SqlType = SqlType::TinyInt;
}

impl TypeInfo for i16 {
    const SQL_TYPE: SqlType = SqlType::SmallInt;
}

impl TypeInfo for i32 {
    const SQL_TYPE: SqlType = SqlType::Integer;
}

impl TypeInfo for u32 {
    const SQL_TYPE: SqlType = SqlType::BigInt;
}

impl TypeInfo for i64 {
    const SQL_TYPE: SqlType = SqlType::BigInt;
}

impl TypeInfo for f32 {
    const SQL_TYPE: SqlType = SqlType::Real;
}

impl TypeInfo for f64 {
    const SQL_TYPE: SqlType = SqlType::Double;
}

impl TypeInfo for bool {
    const SQL_TYPE: SqlType = SqlType::Boolean;
}

impl TypeInfo for String {
    const SQL_TYPE: SqlType = SqlType::Text;
}

impl TypeInfo for Vec<u8> {
    const SQL_TYPE: SqlType = SqlType::Blob;
}

impl TypeInfo for serde_json::Value {
    const SQL_TYPE: SqlType = SqlType::Json;
}

impl<T: TypeInfo> TypeInfo for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;
}
