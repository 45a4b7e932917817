//! Field metadata and field value sets.

use crate::Result;
use crate::error::{Error, MappingError};
use crate::types::SqlType;
use crate::value::Value;

/// How an entity's identifier value is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationStrategy {
    /// The store assigns the identifier on insert; the identifier column is
    /// left out of INSERT statements.
    Identity,
    /// The caller assigns the identifier before insert.
    #[default]
    Assigned,
}

/// Declared metadata about one entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name
    pub name: &'static str,
    /// Column name override; `None` means the lower-cased field name
    pub column: Option<&'static str>,
    /// SQL type for this field
    pub sql_type: SqlType,
    /// Whether this field is nullable
    pub nullable: bool,
    /// Whether this field is the entity identifier
    pub identifier: bool,
    /// Generation strategy, meaningful only on the identifier field
    pub generation: GenerationStrategy,
}

impl FieldInfo {
    /// Create a new field info with minimal required data.
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            column: None,
            sql_type,
            nullable: false,
            identifier: false,
            generation: GenerationStrategy::Assigned,
        }
    }

    /// Override the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column = Some(name);
        self
    }

    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Mark this field as the identifier.
    pub const fn identifier(mut self, value: bool) -> Self {
        self.identifier = value;
        self
    }

    /// Set the identifier generation strategy.
    pub const fn generation(mut self, strategy: GenerationStrategy) -> Self {
        self.generation = strategy;
        self
    }
}

/// Ordered `(field name, value)` pairs for one entity instance.
///
/// Order is declaration order as reported by `Entity::field_values`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldValues {
    entries: Vec<(&'static str, Value)>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append a field value.
    pub fn push(&mut self, field: &'static str, value: impl Into<Value>) {
        self.entries.push((field, value.into()));
    }

    /// Builder-style `push`.
    pub fn with(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.push(field, value);
        self
    }

    /// Look up a field value by field name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    /// Read a field as a typed Rust value.
    ///
    /// A missing field is a mapping error against `entity`; a value that does
    /// not convert is a type error naming the field.
    pub fn get_as<T>(&self, entity: &str, field: &str) -> Result<T>
    where
        T: TryFrom<Value, Error = Error>,
    {
        let value = self
            .get(field)
            .ok_or_else(|| MappingError::missing_field(entity, field))?;
        T::try_from(value.clone()).map_err(|err| match err {
            Error::Type(mut e) => {
                e.column = Some(field.to_string());
                Error::Type(e)
            }
            other => other,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.entries.iter().map(|(name, value)| (*name, value))
    }
}

impl FromIterator<(&'static str, Value)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (&'static str, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FieldValues {
    type Item = (&'static str, Value);
    type IntoIter = std::vec::IntoIter<(&'static str, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
