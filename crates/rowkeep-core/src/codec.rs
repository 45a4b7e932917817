//! Typed value codecs keyed by [`SqlType`].
//!
//! Storage engines hand back values in their own representation (SQLite has
//! no boolean, stores JSON as text, and widens every integer to 64 bits). A
//! [`CodecRegistry`] turns such raw values into the representation a field's
//! declared `SqlType` expects, the same way for every field of every entity.

use std::collections::HashMap;
use std::sync::Arc;

use crate::Result;
use crate::error::{Error, TypeError};
use crate::types::SqlType;
use crate::value::Value;

/// Decodes one raw storage value into the representation of a `SqlType`.
///
/// `decode` is never called with `Value::Null`.
pub trait ValueCodec: Send + Sync {
    fn decode(&self, raw: Value) -> Result<Value>;
}

fn mismatch(expected: &'static str, raw: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: raw.type_name().to_string(),
        column: None,
    })
}

/// Integers of any width, booleans, integral floats, and numeric text.
#[derive(Debug, Clone, Copy)]
pub struct IntegerCodec {
    target: SqlType,
}

impl IntegerCodec {
    pub const fn new(target: SqlType) -> Self {
        Self { target }
    }

    fn widen(raw: &Value) -> Option<i64> {
        match raw {
            Value::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Text(s) => s.trim().parse().ok(),
            other => other.as_i64(),
        }
    }
}

impl ValueCodec for IntegerCodec {
    fn decode(&self, raw: Value) -> Result<Value> {
        let expected = self.target.sql_name();
        let wide = Self::widen(&raw).ok_or_else(|| mismatch(expected, &raw))?;
        let out = match self.target {
            SqlType::TinyInt => i8::try_from(wide).ok().map(Value::TinyInt),
            SqlType::SmallInt => i16::try_from(wide).ok().map(Value::SmallInt),
            SqlType::Integer => i32::try_from(wide).ok().map(Value::Int),
            _ => Some(Value::BigInt(wide)),
        };
        out.ok_or_else(|| mismatch(expected, &raw))
    }
}

/// Floating point numbers from any numeric value or numeric text.
#[derive(Debug, Clone, Copy)]
pub struct RealCodec {
    target: SqlType,
}

impl RealCodec {
    pub const fn new(target: SqlType) -> Self {
        Self { target }
    }
}

impl ValueCodec for RealCodec {
    fn decode(&self, raw: Value) -> Result<Value> {
        let wide = match &raw {
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            other => other.as_f64(),
        }
        .ok_or_else(|| mismatch(self.target.sql_name(), &raw))?;
        Ok(match self.target {
            SqlType::Real => Value::Float(wide as f32),
            _ => Value::Double(wide),
        })
    }
}

/// Booleans from booleans, integers (`0` is false), and `true`/`false` text.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanCodec;

impl ValueCodec for BooleanCodec {
    fn decode(&self, raw: Value) -> Result<Value> {
        let decoded = match &raw {
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Some(true),
                "false" | "f" | "0" => Some(false),
                _ => None,
            },
            other => other.as_bool(),
        };
        decoded
            .map(Value::Bool)
            .ok_or_else(|| mismatch("BOOLEAN", &raw))
    }
}

/// Text from text or UTF-8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl ValueCodec for TextCodec {
    fn decode(&self, raw: Value) -> Result<Value> {
        match raw {
            Value::Text(s) => Ok(Value::Text(s)),
            Value::Bytes(b) => String::from_utf8(b)
                .map(Value::Text)
                .map_err(|e| mismatch("TEXT", &Value::Bytes(e.into_bytes()))),
            other => Err(mismatch("TEXT", &other)),
        }
    }
}

/// Bytes from blobs or text.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobCodec;

impl ValueCodec for BlobCodec {
    fn decode(&self, raw: Value) -> Result<Value> {
        match raw {
            Value::Bytes(b) => Ok(Value::Bytes(b)),
            Value::Text(s) => Ok(Value::Bytes(s.into_bytes())),
            other => Err(mismatch("BLOB", &other)),
        }
    }
}

/// JSON documents from JSON values or JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn decode(&self, raw: Value) -> Result<Value> {
        match raw {
            Value::Json(v) => Ok(Value::Json(v)),
            Value::Text(s) => serde_json::from_str(&s)
                .map(Value::Json)
                .map_err(|_| mismatch("JSON", &Value::Text(s))),
            other => Err(mismatch("JSON", &other)),
        }
    }
}

/// Registry of codecs, one per `SqlType`.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<SqlType, Arc<dyn ValueCodec>>,
}

impl CodecRegistry {
    /// A registry with no codecs; every non-null value is rejected.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Register (or replace) the codec for `sql_type`.
    pub fn register(&mut self, sql_type: SqlType, codec: impl ValueCodec + 'static) -> &mut Self {
        self.codecs.insert(sql_type, Arc::new(codec));
        self
    }

    pub fn contains(&self, sql_type: SqlType) -> bool {
        self.codecs.contains_key(&sql_type)
    }

    /// Decode a raw value read from `column` into the representation of
    /// `sql_type`. `Null` passes through untouched.
    pub fn decode(&self, sql_type: SqlType, column: &str, raw: Value) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let Some(codec) = self.codecs.get(&sql_type) else {
            return Err(Error::Type(TypeError {
                expected: sql_type.sql_name(),
                actual: format!("{} (no codec registered)", raw.type_name()),
                column: Some(column.to_string()),
            }));
        };
        codec.decode(raw).map_err(|err| match err {
            Error::Type(mut e) => {
                e.column = Some(column.to_string());
                Error::Type(e)
            }
            other => other,
        })
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for int in [
            SqlType::TinyInt,
            SqlType::SmallInt,
            SqlType::Integer,
            SqlType::BigInt,
        ] {
            registry.register(int, IntegerCodec::new(int));
        }
        registry
            .register(SqlType::Real, RealCodec::new(SqlType::Real))
            .register(SqlType::Double, RealCodec::new(SqlType::Double))
            .register(SqlType::Boolean, BooleanCodec)
            .register(SqlType::Text, TextCodec)
            .register(SqlType::Blob, BlobCodec)
            .register(SqlType::Json, JsonCodec);
        registry
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.codecs.keys().map(SqlType::sql_name).collect();
        types.sort_unstable();
        f.debug_struct("CodecRegistry").field("types", &types).finish()
    }
}
