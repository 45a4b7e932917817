//! Statement builder for Rowkeep.
//!
//! `rowkeep-query` is the **SQL text layer**. It turns a resolved
//! [`EntityMapping`] plus concrete field values into the four statements the
//! storage gateway needs: select, insert, update, and delete by identifier.
//! The functions here are pure; nothing touches a connection.

pub mod builder;

pub use builder::{Statement, StatementBuilder, StatementKind};

use rowkeep_core::{EntityMapping, FieldValues, Result, Value};

/// Build `SELECT * FROM <table> WHERE id = ?`.
pub fn select_by_id(mapping: &EntityMapping, id: &Value) -> Statement {
    StatementBuilder::new(mapping).select_by_id(id)
}

/// Build the INSERT for one entity's values.
pub fn insert(mapping: &EntityMapping, values: &FieldValues) -> Result<Statement> {
    StatementBuilder::new(mapping).insert(values)
}

/// Build the UPDATE of one entity, keyed by `id`.
pub fn update(mapping: &EntityMapping, values: &FieldValues, id: &Value) -> Result<Statement> {
    StatementBuilder::new(mapping).update(values, id)
}

/// Build the DELETE of one entity, keyed by its own identifier value.
pub fn delete(mapping: &EntityMapping, values: &FieldValues) -> Result<Statement> {
    StatementBuilder::new(mapping).delete(values)
}
