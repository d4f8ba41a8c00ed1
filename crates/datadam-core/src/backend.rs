//! Ports every database adapter implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{DmlParams, OpKind, Row};
use crate::schema::Table;

/// Reads table metadata from a database.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// Names of the base tables in `schema`.
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Columns and unique indexes of one table. An unknown table yields a
    /// table with no columns.
    async fn describe_table(&self, schema: &str, table: &str) -> Result<Table>;

    /// Largest value of `id_column`, or 0 for an empty table.
    async fn max_id(&self, schema: &str, table: &str, id_column: &str) -> Result<i64>;
}

/// Picks existing rows for updates and deletes.
#[async_trait]
pub trait RowSampler: Send + Sync {
    /// Id of a uniformly chosen existing row, `None` when the table is empty.
    async fn random_id(&self, schema: &str, table: &str, id_column: &str) -> Result<Option<i64>>;
}

/// Capability a database adapter provides to the generator and the
/// dispatcher lanes. Each instance owns one connection and is used by a
/// single task at a time.
#[async_trait]
pub trait Backend: Send {
    /// Engine identifier (e.g. `mysql`).
    fn engine(&self) -> &'static str;

    async fn close(&mut self) -> Result<()>;

    /// Load every table of `schema` into the schema cache.
    async fn prepare_tables(&mut self, schema: &str) -> Result<(Vec<Arc<Table>>, Vec<Vec<String>>)>;

    /// Cached table metadata, introspected on first access.
    async fn get_table(&mut self, schema: &str, table: &str) -> Result<(Arc<Table>, Vec<String>)>;

    async fn insert(&mut self, schema: &str, table: &str, values: &Row) -> Result<()>;

    async fn update(&mut self, schema: &str, table: &str, keys: &Row, values: &Row) -> Result<()>;

    async fn delete(&mut self, schema: &str, table: &str, keys: &Row) -> Result<()>;

    /// Run a schema-changing statement against `table`, then drop the
    /// table from this instance's cache.
    async fn execute_ddl(&mut self, schema: &str, table: &str, statement: &str) -> Result<()>;

    /// Synthesize one payload of the given kind from the cached tables.
    async fn generate_dml(&mut self, kind: OpKind) -> Result<DmlParams>;

    fn clear_table(&mut self, schema: &str, table: &str);

    fn clear_all(&mut self);
}
