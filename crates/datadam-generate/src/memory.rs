//! In-process backend keeping rows in memory.
//!
//! Used as the `memory` backend kind for dry runs and as the test double of
//! the dispatcher and generator suites: every applied statement is recorded
//! in order so callers can assert on what each lane executed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;

use datadam_core::{
    Backend, BackendFactory, Column, DbConfig, DmlParams, Error, Introspector, OpKind, Result,
    Row, RowSampler, SchemaCache, Table, Value, schema::PRIMARY_INDEX, table_name,
};

use crate::dml::DmlSynthesizer;

/// A statement applied to the store, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedOp {
    pub kind: OpKind,
    pub schema: String,
    pub table: String,
    pub keys: Row,
    pub values: Row,
    pub statement: Option<String>,
}

#[derive(Debug)]
struct StoredTable {
    table: Table,
    rows: Vec<Row>,
}

impl StoredTable {
    fn id_name(&self) -> Option<&str> {
        self.table.id_column().map(|column| column.name.as_str())
    }

    fn matching(&self, keys: &Row) -> impl Iterator<Item = usize> + '_ {
        let keys = keys.clone();
        self.rows.iter().enumerate().filter_map(move |(idx, row)| {
            keys.iter()
                .all(|(name, value)| row.get(name) == Some(value))
                .then_some(idx)
        })
    }
}

#[derive(Debug, Default)]
struct StoreState {
    tables: BTreeMap<(String, String), StoredTable>,
    applied: Vec<AppliedOp>,
}

impl StoreState {
    fn table_mut(&mut self, schema: &str, table: &str) -> Result<&mut StoredTable> {
        self.tables
            .get_mut(&(schema.to_string(), table.to_string()))
            .ok_or_else(|| {
                Error::Execution(format!("table {} doesn't exist", table_name(schema, table)))
            })
    }
}

/// Shared handle to the in-memory tables. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding a `users` and an `orders` table in each schema.
    pub fn with_sample_schema<S: AsRef<str>>(schemas: &[S]) -> Self {
        let store = Self::new();
        for schema in schemas {
            let schema = schema.as_ref();
            store.create_table(Table::new(
                schema,
                "users",
                vec![
                    Column::new(0, "id", "bigint"),
                    Column::new(1, "name", "varchar(32)").not_null(),
                    Column::new(2, "email", "varchar(64)"),
                    Column::new(3, "age", "int unsigned"),
                    Column::new(4, "active", "boolean"),
                    Column::new(5, "created_at", "datetime"),
                ],
                BTreeMap::from([
                    (PRIMARY_INDEX.to_string(), vec!["id".to_string()]),
                    ("uk_email".to_string(), vec!["email".to_string()]),
                ]),
            ));
            store.create_table(Table::new(
                schema,
                "orders",
                vec![
                    Column::new(0, "id", "int"),
                    Column::new(1, "user_id", "bigint"),
                    Column::new(2, "amount", "decimal(10,2)"),
                    Column::new(3, "note", "text"),
                    Column::new(4, "status", "enum('new','paid','shipped')"),
                ],
                BTreeMap::from([(PRIMARY_INDEX.to_string(), vec!["id".to_string()])]),
            ));
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a table definition, dropping its rows.
    pub fn create_table(&self, table: Table) {
        let key = (table.schema.clone(), table.name.clone());
        self.lock().tables.insert(
            key,
            StoredTable {
                table,
                rows: Vec::new(),
            },
        );
    }

    /// Insert a row without recording it as an applied statement.
    pub fn seed_row(&self, schema: &str, table: &str, row: Row) -> Result<()> {
        let mut state = self.lock();
        insert_row(state.table_mut(schema, table)?, row)
    }

    /// Every statement applied through a backend, in execution order.
    pub fn applied(&self) -> Vec<AppliedOp> {
        self.lock().applied.clone()
    }

    pub fn row_count(&self, schema: &str, table: &str) -> usize {
        self.lock()
            .tables
            .get(&(schema.to_string(), table.to_string()))
            .map_or(0, |stored| stored.rows.len())
    }

    /// Row whose id column equals `id`.
    pub fn row(&self, schema: &str, table: &str, id: i64) -> Option<Row> {
        let state = self.lock();
        let stored = state.tables.get(&(schema.to_string(), table.to_string()))?;
        let id_name = stored.id_name()?;
        stored
            .rows
            .iter()
            .find(|row| row.get(id_name).and_then(Value::as_i64) == Some(id))
            .cloned()
    }

    fn apply(&self, op: AppliedOp) -> Result<()> {
        let mut state = self.lock();
        let stored = state.table_mut(&op.schema, &op.table)?;
        match op.kind {
            OpKind::Insert => insert_row(stored, op.values.clone())?,
            OpKind::Update => {
                let unknown = op.values.keys().find(|name| stored.table.column(name).is_none());
                if let Some(unknown) = unknown {
                    return Err(Error::Execution(format!("unknown column '{unknown}'")));
                }
                let hits: Vec<usize> = stored.matching(&op.keys).collect();
                for idx in hits {
                    for (name, value) in &op.values {
                        stored.rows[idx].insert(name.clone(), value.clone());
                    }
                }
            }
            OpKind::Delete => {
                let hits: Vec<usize> = stored.matching(&op.keys).collect();
                for idx in hits.into_iter().rev() {
                    stored.rows.remove(idx);
                }
            }
            OpKind::Ddl => {}
        }
        state.applied.push(op);
        Ok(())
    }
}

fn insert_row(stored: &mut StoredTable, row: Row) -> Result<()> {
    if let Some(unknown) = row.keys().find(|name| stored.table.column(name).is_none()) {
        return Err(Error::Execution(format!("unknown column '{unknown}'")));
    }
    if let Some(id_name) = stored.id_name() {
        if let Some(id) = row.get(id_name).filter(|value| !value.is_null()) {
            if stored.rows.iter().any(|existing| existing.get(id_name) == Some(id)) {
                return Err(Error::Execution(format!(
                    "duplicate entry '{id}' for key '{PRIMARY_INDEX}' in {}",
                    stored.table.qualified_name()
                )));
            }
        }
    }
    stored.rows.push(row);
    Ok(())
}

#[async_trait]
impl Introspector for MemoryStore {
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .tables
            .keys()
            .filter(|(owner, _)| owner == schema)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn describe_table(&self, schema: &str, table: &str) -> Result<Table> {
        Ok(self
            .lock()
            .tables
            .get(&(schema.to_string(), table.to_string()))
            .map(|stored| stored.table.clone())
            .unwrap_or_else(|| Table::new(schema, table, Vec::new(), BTreeMap::new())))
    }

    async fn max_id(&self, schema: &str, table: &str, id_column: &str) -> Result<i64> {
        let state = self.lock();
        let Some(stored) = state.tables.get(&(schema.to_string(), table.to_string())) else {
            return Ok(0);
        };
        Ok(stored
            .rows
            .iter()
            .filter_map(|row| row.get(id_column).and_then(Value::as_i64))
            .max()
            .unwrap_or(0))
    }
}

#[async_trait]
impl RowSampler for MemoryStore {
    async fn random_id(&self, schema: &str, table: &str, id_column: &str) -> Result<Option<i64>> {
        let state = self.lock();
        let ids: Vec<i64> = state
            .tables
            .get(&(schema.to_string(), table.to_string()))
            .map(|stored| {
                stored
                    .rows
                    .iter()
                    .filter_map(|row| row.get(id_column).and_then(Value::as_i64))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids.choose(&mut rand::rng()).copied())
    }
}

/// Backend over a [`MemoryStore`], with its own schema cache like any
/// connection-backed adapter.
pub struct MemoryBackend {
    store: MemoryStore,
    cache: SchemaCache,
    synth: DmlSynthesizer,
    latency: Option<Duration>,
}

impl MemoryBackend {
    pub fn new(store: MemoryStore) -> Self {
        Self::with_synthesizer(store, DmlSynthesizer::from_os_rng())
    }

    /// Backend whose generated payloads are reproducible.
    pub fn seeded(store: MemoryStore, seed: u64) -> Self {
        Self::with_synthesizer(store, DmlSynthesizer::seeded(seed))
    }

    fn with_synthesizer(store: MemoryStore, synth: DmlSynthesizer) -> Self {
        Self {
            store,
            cache: SchemaCache::new(),
            synth,
            latency: None,
        }
    }

    /// Sleep this long before applying each statement.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    async fn apply(&self, op: AppliedOp) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.store.apply(op)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn engine(&self) -> &'static str {
        "memory"
    }

    async fn close(&mut self) -> Result<()> {
        self.cache.clear_all();
        Ok(())
    }

    async fn prepare_tables(
        &mut self,
        schema: &str,
    ) -> Result<(Vec<Arc<Table>>, Vec<Vec<String>>)> {
        self.cache.prepare_tables(&self.store, schema).await
    }

    async fn get_table(&mut self, schema: &str, table: &str) -> Result<(Arc<Table>, Vec<String>)> {
        self.cache.get_table(&self.store, schema, table).await
    }

    async fn insert(&mut self, schema: &str, table: &str, values: &Row) -> Result<()> {
        let (meta, _) = self.get_table(schema, table).await?;
        let keys = meta
            .id_column()
            .and_then(|column| values.get_key_value(&column.name))
            .map(|(name, value)| Row::from([(name.clone(), value.clone())]))
            .unwrap_or_default();
        self.apply(AppliedOp {
            kind: OpKind::Insert,
            schema: schema.to_string(),
            table: table.to_string(),
            keys,
            values: values.clone(),
            statement: None,
        })
        .await
    }

    async fn update(&mut self, schema: &str, table: &str, keys: &Row, values: &Row) -> Result<()> {
        self.apply(AppliedOp {
            kind: OpKind::Update,
            schema: schema.to_string(),
            table: table.to_string(),
            keys: keys.clone(),
            values: values.clone(),
            statement: None,
        })
        .await
    }

    async fn delete(&mut self, schema: &str, table: &str, keys: &Row) -> Result<()> {
        self.apply(AppliedOp {
            kind: OpKind::Delete,
            schema: schema.to_string(),
            table: table.to_string(),
            keys: keys.clone(),
            values: Row::new(),
            statement: None,
        })
        .await
    }

    async fn execute_ddl(&mut self, schema: &str, table: &str, statement: &str) -> Result<()> {
        self.apply(AppliedOp {
            kind: OpKind::Ddl,
            schema: schema.to_string(),
            table: table.to_string(),
            keys: Row::new(),
            values: Row::new(),
            statement: Some(statement.to_string()),
        })
        .await?;
        self.cache.clear_table(schema, table);
        Ok(())
    }

    async fn generate_dml(&mut self, kind: OpKind) -> Result<DmlParams> {
        self.synth.generate(kind, &mut self.cache, &self.store).await
    }

    fn clear_table(&mut self, schema: &str, table: &str) {
        self.cache.clear_table(schema, table);
    }

    fn clear_all(&mut self) {
        self.cache.clear_all();
    }
}

/// Registers the `memory` backend kind. Every backend it creates shares the
/// factory's store.
#[derive(Debug, Clone, Default)]
pub struct MemoryFactory {
    store: MemoryStore,
    latency: Option<Duration>,
}

impl MemoryFactory {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl BackendFactory for MemoryFactory {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, _config: &DbConfig) -> Result<Box<dyn Backend>> {
        let mut backend = MemoryBackend::new(self.store.clone());
        backend.latency = self.latency;
        Ok(Box::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = MemoryStore::with_sample_schema(&["dam"]);
        let mut backend = MemoryBackend::seeded(store.clone(), 1);
        let values = row(&[("id", Value::Int(1)), ("note", Value::from("x"))]);

        backend.insert("dam", "orders", &values).await.unwrap();
        let err = backend.insert("dam", "orders", &values).await.unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
        assert_eq!(store.row_count("dam", "orders"), 1);
        assert_eq!(store.applied().len(), 1);
    }

    #[tokio::test]
    async fn update_and_delete_match_on_keys() {
        let store = MemoryStore::with_sample_schema(&["dam"]);
        store
            .seed_row("dam", "orders", row(&[("id", Value::Int(3)), ("note", Value::from("a"))]))
            .unwrap();
        let mut backend = MemoryBackend::seeded(store.clone(), 1);
        let keys = row(&[("id", Value::Int(3))]);

        backend
            .update("dam", "orders", &keys, &row(&[("note", Value::from("b"))]))
            .await
            .unwrap();
        let updated = store.row("dam", "orders", 3).unwrap();
        assert_eq!(updated.get("note"), Some(&Value::from("b")));

        backend.delete("dam", "orders", &keys).await.unwrap();
        assert!(store.row("dam", "orders", 3).is_none());
        assert_eq!(store.applied().len(), 2);
    }

    #[tokio::test]
    async fn unknown_table_describes_as_empty() {
        let store = MemoryStore::new();
        let table = store.describe_table("dam", "ghost").await.unwrap();
        assert!(table.columns.is_empty());
        assert_eq!(store.max_id("dam", "ghost", "id").await.unwrap(), 0);
        assert_eq!(store.random_id("dam", "ghost", "id").await.unwrap(), None);
    }
}
