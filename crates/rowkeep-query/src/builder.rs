//! Statement builders for SELECT, INSERT, UPDATE, DELETE by identifier.

use std::fmt;

use rowkeep_core::{
    ColumnMapping, EntityMapping, FieldValues, MappingError, MappingErrorKind, Result, Value,
};
use serde::Serialize;

/// What a statement does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<Value>,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Builds identifier-keyed statements for one entity mapping.
///
/// Every statement uses `?` placeholders; no value is ever written into the
/// SQL text.
#[derive(Debug, Clone, Copy)]
pub struct StatementBuilder<'m> {
    mapping: &'m EntityMapping,
}

impl<'m> StatementBuilder<'m> {
    pub fn new(mapping: &'m EntityMapping) -> Self {
        Self { mapping }
    }

    /// `SELECT * FROM <table> WHERE <id> = ?`
    pub fn select_by_id(&self, id: &Value) -> Statement {
        Statement {
            kind: StatementKind::Select,
            sql: format!(
                "SELECT * FROM {} WHERE {} = ?",
                self.mapping.table(),
                self.mapping.identifier_column()
            ),
            params: vec![id.clone()],
        }
    }

    /// `INSERT INTO <table> (<cols>) VALUES (?, ...)`
    ///
    /// The identifier column is left out when the store generates it. With
    /// nothing left to bind the statement is `INSERT INTO <table> DEFAULT VALUES`.
    pub fn insert(&self, values: &FieldValues) -> Result<Statement> {
        let columns: Vec<&ColumnMapping> = self.mapping.insert_columns().collect();
        if columns.is_empty() {
            return Ok(Statement {
                kind: StatementKind::Insert,
                sql: format!("INSERT INTO {} DEFAULT VALUES", self.mapping.table()),
                params: Vec::new(),
            });
        }
        let params = columns
            .iter()
            .map(|c| self.value_of(values, c))
            .collect::<Result<Vec<_>>>()?;
        let names: Vec<&str> = columns.iter().map(|c| c.column.as_str()).collect();
        let placeholders = vec!["?"; names.len()];

        Ok(Statement {
            kind: StatementKind::Insert,
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.mapping.table(),
                names.join(", "),
                placeholders.join(", ")
            ),
            params,
        })
    }

    /// `UPDATE <table> SET <col> = ?, ... WHERE <id> = ?`
    ///
    /// Binds the non-identifier values in mapping order, then `id` last. A
    /// mapping with no column besides the identifier has nothing to set and is
    /// a `MappingError`.
    pub fn update(&self, values: &FieldValues, id: &Value) -> Result<Statement> {
        if self.mapping.non_identifier_columns().next().is_none() {
            return Err(MappingError::new(
                MappingErrorKind::MissingField,
                self.mapping.entity(),
                format!(
                    "table {} has no column besides the identifier to update",
                    self.mapping.table()
                ),
            )
            .into());
        }
        let mut params = Vec::with_capacity(self.mapping.columns().len());
        let mut set_clauses = Vec::with_capacity(self.mapping.columns().len());
        for column in self.mapping.non_identifier_columns() {
            params.push(self.value_of(values, column)?);
            set_clauses.push(format!("{} = ?", column.column));
        }
        params.push(id.clone());

        Ok(Statement {
            kind: StatementKind::Update,
            sql: format!(
                "UPDATE {} SET {} WHERE {} = ?",
                self.mapping.table(),
                set_clauses.join(", "),
                self.mapping.identifier_column()
            ),
            params,
        })
    }

    /// `DELETE FROM <table> WHERE <id> = ?`, binding the identifier read off
    /// the entity's own values.
    pub fn delete(&self, values: &FieldValues) -> Result<Statement> {
        let id = self.value_of(values, self.mapping.identifier())?;
        Ok(Statement {
            kind: StatementKind::Delete,
            sql: format!(
                "DELETE FROM {} WHERE {} = ?",
                self.mapping.table(),
                self.mapping.identifier_column()
            ),
            params: vec![id],
        })
    }

    fn value_of(&self, values: &FieldValues, column: &ColumnMapping) -> Result<Value> {
        values
            .get(column.field)
            .cloned()
            .ok_or_else(|| MappingError::missing_field(self.mapping.entity(), column.field).into())
    }
}
