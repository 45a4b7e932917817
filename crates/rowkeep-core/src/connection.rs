//! Synchronous database connection contract.
//!
//! Drivers implement [`Connection`]; the pool hands connections out and the
//! storage gateway runs one statement per checkout through it. Every call
//! blocks until the engine answers.

use crate::Result;
use crate::row::Row;
use crate::value::Value;

/// A database connection capable of executing statements.
///
/// Parameters are always bound positionally to `?` placeholders; values are
/// never spliced into the SQL text.
///
/// # Example
///
/// ```rust,ignore
/// let rows = conn.query("SELECT * FROM person WHERE id = ?", &[Value::BigInt(1)])?;
/// conn.execute("DELETE FROM person WHERE id = ?", &[Value::BigInt(1)])?;
/// ```
pub trait Connection: Send {
    /// Execute a query and return all rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute one or more parameterless statements separated by `;`.
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Execute a query and return the first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Check that the connection still answers.
    fn ping(&self) -> Result<()> {
        self.query("SELECT 1", &[]).map(|_| ())
    }

    /// Alias for `ping` that returns a bool.
    fn is_valid(&self) -> bool {
        self.ping().is_ok()
    }
}
