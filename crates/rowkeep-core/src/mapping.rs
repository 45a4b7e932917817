//! Entity mapping resolution.
//!
//! Turns the declared metadata of an [`Entity`] into the table name, ordered
//! column list, identifier column, and generation strategy that the statement
//! builder and storage gateway work from.

use std::collections::HashSet;

use crate::Result;
use crate::entity::Entity;
use crate::error::{MappingError, MappingErrorKind};
use crate::field::{FieldInfo, GenerationStrategy};
use crate::identifiers::{default_name, is_plain_identifier};
use crate::types::SqlType;

/// One resolved field-to-column correspondence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Rust field name
    pub field: &'static str,
    /// Resolved column name
    pub column: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub identifier: bool,
}

/// Resolved table/column/identifier metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMapping {
    entity: &'static str,
    table: String,
    columns: Vec<ColumnMapping>,
    id_index: usize,
    generation: GenerationStrategy,
}

impl EntityMapping {
    /// Resolve the mapping of `E`.
    pub fn resolve<E: Entity>() -> Result<Self> {
        Self::from_parts(E::TYPE_NAME, E::table_name(), E::fields())
    }

    /// Resolve a mapping from raw declared metadata.
    ///
    /// The table defaults to the lower-cased type name and each column to the
    /// lower-cased field name. Exactly one field must be the identifier.
    #[tracing::instrument(level = "trace", skip(fields))]
    pub fn from_parts(
        entity: &'static str,
        table: Option<&'static str>,
        fields: &[FieldInfo],
    ) -> Result<Self> {
        let table = table.map_or_else(|| default_name(entity), str::to_string);
        if !is_plain_identifier(&table) {
            return Err(MappingError::new(
                MappingErrorKind::InvalidName,
                entity,
                format!("table name '{table}' is not a plain SQL identifier"),
            )
            .into());
        }

        let ids: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.identifier)
            .map(|(i, _)| i)
            .collect();
        let id_index = match ids.as_slice() {
            [index] => *index,
            [] => {
                return Err(MappingError::new(
                    MappingErrorKind::MissingIdentifier,
                    entity,
                    "no field is marked as identifier",
                )
                .into());
            }
            many => {
                let names: Vec<_> = many.iter().map(|&i| fields[i].name).collect();
                return Err(MappingError::new(
                    MappingErrorKind::MultipleIdentifiers,
                    entity,
                    format!("expected one identifier field, found {}", names.join(", ")),
                )
                .into());
            }
        };

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            let column = field
                .column
                .map_or_else(|| default_name(field.name), str::to_string);
            if !is_plain_identifier(&column) {
                return Err(MappingError::new(
                    MappingErrorKind::InvalidName,
                    entity,
                    format!(
                        "column name '{column}' of field '{}' is not a plain SQL identifier",
                        field.name
                    ),
                )
                .into());
            }
            if !seen.insert(column.clone()) {
                return Err(MappingError::new(
                    MappingErrorKind::DuplicateColumn,
                    entity,
                    format!("column '{column}' is mapped more than once"),
                )
                .into());
            }
            columns.push(ColumnMapping {
                field: field.name,
                column,
                sql_type: field.sql_type,
                nullable: field.nullable,
                identifier: field.identifier,
            });
        }

        let mapping = Self {
            entity,
            table,
            columns,
            id_index,
            generation: fields[id_index].generation,
        };
        tracing::trace!(
            table = %mapping.table,
            columns = mapping.columns.len(),
            generation = ?mapping.generation,
            "Resolved entity mapping"
        );
        Ok(mapping)
    }

    /// Rust type name of the mapped entity.
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// All columns in declaration order.
    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    pub fn identifier(&self) -> &ColumnMapping {
        &self.columns[self.id_index]
    }

    pub fn identifier_column(&self) -> &str {
        &self.identifier().column
    }

    pub fn generation(&self) -> GenerationStrategy {
        self.generation
    }

    /// Columns other than the identifier, in declaration order.
    pub fn non_identifier_columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter(|c| !c.identifier)
    }

    /// Columns written by INSERT: all of them, except the identifier when the
    /// store assigns it.
    pub fn insert_columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        let skip_id = self.generation == GenerationStrategy::Identity;
        self.columns
            .iter()
            .filter(move |c| !(skip_id && c.identifier))
    }

    /// Find the column mapped to a Rust field.
    pub fn column_for_field(&self, field: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    const PERSON_FIELDS: &[FieldInfo] = &[
        FieldInfo::new("id", SqlType::BigInt)
            .identifier(true)
            .generation(GenerationStrategy::Identity),
        FieldInfo::new("first_name", SqlType::Text),
        FieldInfo::new("lastName", SqlType::Text).column("last_name"),
    ];

    fn mapping_kind(err: Error) -> MappingErrorKind {
        match err {
            Error::Mapping(e) => e.kind,
            other => panic!("expected mapping error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_and_overrides() {
        let mapping = EntityMapping::from_parts("Person", None, PERSON_FIELDS).unwrap();
        assert_eq!(mapping.table(), "person");
        assert_eq!(mapping.entity(), "Person");
        let columns: Vec<_> = mapping.columns().iter().map(|c| c.column.as_str()).collect();
        assert_eq!(columns, vec!["id", "first_name", "last_name"]);
        assert_eq!(mapping.identifier_column(), "id");
        assert_eq!(mapping.generation(), GenerationStrategy::Identity);
        assert_eq!(
            mapping.column_for_field("lastName").map(|c| c.column.as_str()),
            Some("last_name")
        );
    }

    #[test]
    fn table_override() {
        let mapping = EntityMapping::from_parts("Person", Some("people"), PERSON_FIELDS).unwrap();
        assert_eq!(mapping.table(), "people");
    }

    #[test]
    fn insert_columns_follow_strategy() {
        let identity = EntityMapping::from_parts("Person", None, PERSON_FIELDS).unwrap();
        let cols: Vec<_> = identity.insert_columns().map(|c| c.field).collect();
        assert_eq!(cols, vec!["first_name", "lastName"]);

        let assigned_fields = [
            FieldInfo::new("code", SqlType::Text).identifier(true),
            FieldInfo::new("label", SqlType::Text),
        ];
        let assigned = EntityMapping::from_parts("Tag", None, &assigned_fields).unwrap();
        let cols: Vec<_> = assigned.insert_columns().map(|c| c.field).collect();
        assert_eq!(cols, vec!["code", "label"]);
        let rest: Vec<_> = assigned.non_identifier_columns().map(|c| c.field).collect();
        assert_eq!(rest, vec!["label"]);
    }

    #[test]
    fn zero_identifiers_rejected() {
        let fields = [FieldInfo::new("name", SqlType::Text)];
        let err = EntityMapping::from_parts("Note", None, &fields).unwrap_err();
        assert_eq!(mapping_kind(err), MappingErrorKind::MissingIdentifier);
    }

    #[test]
    fn multiple_identifiers_rejected() {
        let fields = [
            FieldInfo::new("a", SqlType::BigInt).identifier(true),
            FieldInfo::new("b", SqlType::BigInt).identifier(true),
        ];
        let err = EntityMapping::from_parts("Pair", None, &fields).unwrap_err();
        assert_eq!(mapping_kind(err), MappingErrorKind::MultipleIdentifiers);
    }

    #[test]
    fn unsafe_names_rejected() {
        let err = EntityMapping::from_parts("Person", Some("person; --"), PERSON_FIELDS)
            .unwrap_err();
        assert_eq!(mapping_kind(err), MappingErrorKind::InvalidName);

        let fields = [
            FieldInfo::new("id", SqlType::BigInt).identifier(true),
            FieldInfo::new("name", SqlType::Text).column("full name"),
        ];
        let err = EntityMapping::from_parts("Person", None, &fields).unwrap_err();
        assert_eq!(mapping_kind(err), MappingErrorKind::InvalidName);
    }

    #[test]
    fn duplicate_columns_rejected() {
        let fields = [
            FieldInfo::new("id", SqlType::BigInt).identifier(true),
            FieldInfo::new("Name", SqlType::Text),
            FieldInfo::new("name", SqlType::Text),
        ];
        let err = EntityMapping::from_parts("Person", None, &fields).unwrap_err();
        assert_eq!(mapping_kind(err), MappingErrorKind::DuplicateColumn);
    }
}
