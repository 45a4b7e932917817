//! Storage Gateway: the session's only route to the database.
//!
//! The session hands the gateway a resolved [`EntityMapping`] plus field
//! values and gets field values back. [`SqlGateway`] is the relational
//! implementation: every call checks one connection out of the pool, runs a
//! single statement from the statement builder, and returns the connection
//! before control goes back to the session.

use std::sync::Arc;

use rowkeep_core::{CodecRegistry, Connection, EntityMapping, FieldValues, MappingError, Result, Row, Value};
use rowkeep_pool::{ConnectionManager, Pool};

/// Executes identifier-keyed reads and writes for the session.
///
/// Every failure raised by the store itself is an `Error::Storage`.
pub trait StorageGateway {
    /// Load the row with identifier `id`, decoded into field values.
    fn select_entity(&self, mapping: &EntityMapping, id: &Value) -> Result<Option<FieldValues>>;

    /// Insert a new row.
    fn save_entity(&self, mapping: &EntityMapping, values: &FieldValues) -> Result<()>;

    /// Rewrite the row keyed by `id` with `values`.
    fn update_entity(&self, mapping: &EntityMapping, values: &FieldValues, id: &Value) -> Result<()>;

    /// Delete the row keyed by the identifier inside `values`.
    fn delete_entity(&self, mapping: &EntityMapping, values: &FieldValues) -> Result<()>;
}

impl<G: StorageGateway + ?Sized> StorageGateway for &G {
    fn select_entity(&self, mapping: &EntityMapping, id: &Value) -> Result<Option<FieldValues>> {
        (**self).select_entity(mapping, id)
    }

    fn save_entity(&self, mapping: &EntityMapping, values: &FieldValues) -> Result<()> {
        (**self).save_entity(mapping, values)
    }

    fn update_entity(&self, mapping: &EntityMapping, values: &FieldValues, id: &Value) -> Result<()> {
        (**self).update_entity(mapping, values, id)
    }

    fn delete_entity(&self, mapping: &EntityMapping, values: &FieldValues) -> Result<()> {
        (**self).delete_entity(mapping, values)
    }
}

impl<G: StorageGateway + ?Sized> StorageGateway for Arc<G> {
    fn select_entity(&self, mapping: &EntityMapping, id: &Value) -> Result<Option<FieldValues>> {
        (**self).select_entity(mapping, id)
    }

    fn save_entity(&self, mapping: &EntityMapping, values: &FieldValues) -> Result<()> {
        (**self).save_entity(mapping, values)
    }

    fn update_entity(&self, mapping: &EntityMapping, values: &FieldValues, id: &Value) -> Result<()> {
        (**self).update_entity(mapping, values, id)
    }

    fn delete_entity(&self, mapping: &EntityMapping, values: &FieldValues) -> Result<()> {
        (**self).delete_entity(mapping, values)
    }
}

/// Relational gateway over a connection pool.
pub struct SqlGateway<M: ConnectionManager> {
    pool: Arc<Pool<M>>,
    codecs: CodecRegistry,
}

impl<M: ConnectionManager> SqlGateway<M> {
    /// Gateway decoding rows with the default codecs.
    pub fn new(pool: Arc<Pool<M>>) -> Self {
        Self::with_codecs(pool, CodecRegistry::default())
    }

    pub fn with_codecs(pool: Arc<Pool<M>>, codecs: CodecRegistry) -> Self {
        Self { pool, codecs }
    }

    pub fn pool(&self) -> &Arc<Pool<M>> {
        &self.pool
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Run one write statement on its own pooled connection.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let conn = self.pool.acquire()?;
        conn.execute(sql, params)
    }

    /// Decode a row into field values through the codec registry.
    fn decode_row(&self, mapping: &EntityMapping, row: &Row) -> Result<FieldValues> {
        let mut values = FieldValues::with_capacity(mapping.columns().len());
        for column in mapping.columns() {
            let raw = row.get_by_name(&column.column).ok_or_else(|| {
                MappingError::missing_field(
                    mapping.entity(),
                    &format!("{} (column {} not in result)", column.field, column.column),
                )
            })?;
            let value = self
                .codecs
                .decode(column.sql_type, &column.column, raw.clone())?;
            values.push(column.field, value);
        }
        Ok(values)
    }
}

impl<M: ConnectionManager> StorageGateway for SqlGateway<M> {
    #[tracing::instrument(level = "trace", skip(self, mapping), fields(table = mapping.table()))]
    fn select_entity(&self, mapping: &EntityMapping, id: &Value) -> Result<Option<FieldValues>> {
        let stmt = rowkeep_query::select_by_id(mapping, id);
        let row = {
            let conn = self.pool.acquire()?;
            conn.query_one(&stmt.sql, &stmt.params)?
        };
        row.map(|row| self.decode_row(mapping, &row)).transpose()
    }

    #[tracing::instrument(level = "trace", skip_all, fields(table = mapping.table()))]
    fn save_entity(&self, mapping: &EntityMapping, values: &FieldValues) -> Result<()> {
        let stmt = rowkeep_query::insert(mapping, values)?;
        self.execute(&stmt.sql, &stmt.params)?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self, mapping, values), fields(table = mapping.table()))]
    fn update_entity(&self, mapping: &EntityMapping, values: &FieldValues, id: &Value) -> Result<()> {
        if mapping.non_identifier_columns().next().is_none() {
            tracing::trace!(id = %id, "Nothing to update besides the identifier");
            return Ok(());
        }
        let stmt = rowkeep_query::update(mapping, values, id)?;
        let affected = self.execute(&stmt.sql, &stmt.params)?;
        if affected == 0 {
            tracing::debug!(id = %id, "UPDATE matched no row");
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all, fields(table = mapping.table()))]
    fn delete_entity(&self, mapping: &EntityMapping, values: &FieldValues) -> Result<()> {
        let stmt = rowkeep_query::delete(mapping, values)?;
        let affected = self.execute(&stmt.sql, &stmt.params)?;
        if affected == 0 {
            tracing::debug!("DELETE matched no row");
        }
        Ok(())
    }
}

impl<M: ConnectionManager> std::fmt::Debug for SqlGateway<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlGateway")
            .field("pool", &self.pool.stats())
            .field("codecs", &self.codecs)
            .finish()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
