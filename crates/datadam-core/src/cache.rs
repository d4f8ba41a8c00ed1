//! Per-connection cache of table metadata and synthetic id counters.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::backend::Introspector;
use crate::error::{Error, Result};
use crate::schema::{Table, table_name};

#[derive(Debug)]
struct CacheEntry {
    table: Arc<Table>,
    columns: Vec<String>,
    /// Highest id seen or handed out.
    last_id: Option<i64>,
}

/// Maps `schema`.`table` to its metadata, built lazily on first lookup.
///
/// Owned by a single backend instance; it is never shared between lanes.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: HashMap<String, CacheEntry>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached table and its ordered column names, introspecting
    /// it through `source` on first access.
    pub async fn get_table<I>(
        &mut self,
        source: &I,
        schema: &str,
        table: &str,
    ) -> Result<(Arc<Table>, Vec<String>)>
    where
        I: Introspector + ?Sized,
    {
        let key = table_name(schema, table);
        if let Some(entry) = self.entries.get(&key) {
            return Ok((Arc::clone(&entry.table), entry.columns.clone()));
        }

        let described = source
            .describe_table(schema, table)
            .await
            .map_err(|err| Error::Schema(format!("introspect {key}: {err}")))?;
        if described.columns.is_empty() {
            return Err(Error::Schema(format!("invalid table {key}: no columns")));
        }

        let last_id = match described.id_column() {
            Some(column) => Some(
                source
                    .max_id(schema, table, &column.name)
                    .await
                    .map_err(|err| Error::Schema(format!("read max id of {key}: {err}")))?,
            ),
            None => None,
        };

        debug!(
            table = %key,
            columns = described.columns.len(),
            indexes = described.index_columns.len(),
            last_id,
            "table cached"
        );

        let columns = described.column_names();
        let described = Arc::new(described);
        self.entries.insert(
            key,
            CacheEntry {
                table: Arc::clone(&described),
                columns: columns.clone(),
                last_id,
            },
        );
        Ok((described, columns))
    }

    /// Enumerate every table of `schema` and cache it.
    pub async fn prepare_tables<I>(
        &mut self,
        source: &I,
        schema: &str,
    ) -> Result<(Vec<Arc<Table>>, Vec<Vec<String>>)>
    where
        I: Introspector + ?Sized,
    {
        let names = source
            .list_tables(schema)
            .await
            .map_err(|err| Error::Schema(format!("list tables of `{schema}`: {err}")))?;

        let mut tables = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let (table, cols) = self.get_table(source, schema, &name).await?;
            tables.push(table);
            columns.push(cols);
        }
        Ok((tables, columns))
    }

    /// Hand out the next synthetic id of a cached table.
    pub fn allocate_id(&mut self, schema: &str, table: &str) -> Result<i64> {
        let key = table_name(schema, table);
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| Error::Schema(format!("table {key} is not cached")))?;
        let last = entry
            .last_id
            .as_mut()
            .ok_or_else(|| Error::Schema(format!("table {key} has no id column")))?;
        let id = last
            .checked_add(1)
            .ok_or_else(|| Error::Generation(format!("ids of {key} are exhausted")))?;
        *last = id;
        Ok(id)
    }

    /// Cached tables ordered by qualified name.
    pub fn tables(&self) -> Vec<Arc<Table>> {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|key| self.entries.get(key))
            .map(|entry| Arc::clone(&entry.table))
            .collect()
    }

    pub fn clear_table(&mut self, schema: &str, table: &str) {
        self.entries.remove(&table_name(schema, table));
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
