//! The `Entity` trait: an explicit per-type mapping descriptor.
//!
//! Every persistent type describes itself through this trait instead of being
//! inspected at runtime. `#[derive(Entity)]` writes the implementation from
//! `#[rowkeep(...)]` attributes, but a hand-written impl is equally valid.

use crate::Result;
use crate::field::{FieldInfo, FieldValues};
use crate::value::Value;

/// A type whose instances can be loaded, tracked, and written by a session.
///
/// # Example
///
/// ```ignore
/// use rowkeep::Entity;
///
/// #[derive(Entity)]
/// #[rowkeep(table = "person")]
/// struct Person {
///     #[rowkeep(id, generated = "identity")]
///     id: i64,
///     first_name: String,
///     last_name: String,
/// }
/// ```
pub trait Entity: Sized + Send + Sync + 'static {
    /// The Rust type name, used for the default table name and in errors.
    const TYPE_NAME: &'static str;

    /// Declared table name override.
    fn table_name() -> Option<&'static str> {
        None
    }

    /// Declared fields in declaration order. Only the type's own fields are
    /// listed; nothing is inherited.
    fn fields() -> &'static [FieldInfo];

    /// Current value of every declared field, in declaration order.
    fn field_values(&self) -> FieldValues;

    /// Rebuild an instance from a full set of field values.
    fn from_fields(values: &FieldValues) -> Result<Self>;

    /// The field marked as identifier, if exactly one is declared.
    fn identifier_field() -> Option<&'static FieldInfo> {
        let mut ids = Self::fields().iter().filter(|f| f.identifier);
        match (ids.next(), ids.next()) {
            (Some(field), None) => Some(field),
            _ => None,
        }
    }

    /// Current identifier value, or `Value::Null` when it is unset or the
    /// type declares no single identifier.
    fn identifier_value(&self) -> Value {
        Self::identifier_field()
            .and_then(|field| self.field_values().get(field.name).cloned())
            .unwrap_or(Value::Null)
    }
}
