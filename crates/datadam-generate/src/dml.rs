//! Builds DML payloads from cached table metadata.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore, SeedableRng};
use tracing::debug;

use datadam_core::{
    Column, DmlParams, Error, OpKind, Result, Row, RowSampler, SchemaCache, Table, Value,
};

use crate::values::ValueRegistry;

/// Synthesizes one payload at a time for the tables held in a
/// [`SchemaCache`].
///
/// Not meant for concurrent use: the random source and the cache's id
/// counters are mutated on every call.
pub struct DmlSynthesizer<R = StdRng> {
    rng: R,
    values: ValueRegistry,
}

impl DmlSynthesizer<StdRng> {
    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R> DmlSynthesizer<R>
where
    R: RngCore + Send,
{
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            values: ValueRegistry::new(),
        }
    }

    pub fn values(&self) -> &ValueRegistry {
        &self.values
    }

    /// Build a payload of `kind` against a uniformly chosen cached table.
    pub async fn generate<S>(
        &mut self,
        kind: OpKind,
        cache: &mut SchemaCache,
        sampler: &S,
    ) -> Result<DmlParams>
    where
        S: RowSampler + ?Sized,
    {
        match kind {
            OpKind::Insert => {
                let table = self.pick_table(cache)?;
                self.insert(cache, &table)
            }
            OpKind::Update => self.update(cache, sampler).await,
            OpKind::Delete => self.delete(cache, sampler).await,
            OpKind::Ddl => {
                let table = self.pick_table(cache)?;
                let tag: [u8; 4] = self.rng.random();
                let comment = Value::Text(format!("datadam {}", hex::encode(tag)));
                let statement = format!(
                    "ALTER TABLE {} COMMENT = {}",
                    table.qualified_name(),
                    comment.to_sql_literal()
                );
                Ok(DmlParams::ddl(&table.schema, &table.name, statement))
            }
        }
    }

    fn insert(&mut self, cache: &mut SchemaCache, table: &Table) -> Result<DmlParams> {
        let id_column = id_column(table)?;
        let id = cache.allocate_id(&table.schema, &table.name)?;

        let mut keys = Row::new();
        keys.insert(id_column.name.clone(), Value::Int(id));
        let mut values = keys.clone();

        for column in &table.columns {
            if column.name == id_column.name {
                continue;
            }
            match self.values.generate(column, &mut self.rng) {
                Ok(value) => {
                    values.insert(column.name.clone(), value);
                }
                Err(Error::UnsupportedType(detail)) => {
                    debug!(table = %table.qualified_name(), %detail, "column left to its default");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(DmlParams::insert(&table.schema, &table.name, keys, values))
    }

    async fn update<S>(&mut self, cache: &mut SchemaCache, sampler: &S) -> Result<DmlParams>
    where
        S: RowSampler + ?Sized,
    {
        let candidates: Vec<Arc<Table>> = cache
            .tables()
            .into_iter()
            .filter(|table| table.id_column().is_some())
            .filter(|table| !self.updatable_columns(table).is_empty())
            .collect();
        let table = match candidates.choose(&mut self.rng) {
            Some(table) => Arc::clone(table),
            None if has_id_tables(cache) => {
                return Err(Error::NoEligibleColumn(
                    "any cached table: every column is a key, unique or of an unsupported type"
                        .to_string(),
                ));
            }
            None => return Err(no_tables(cache)),
        };

        let id_column = id_column(&table)?;
        let Some(id) = sampler
            .random_id(&table.schema, &table.name, &id_column.name)
            .await?
        else {
            debug!(table = %table.qualified_name(), "empty table, inserting instead of updating");
            return self.insert(cache, &table);
        };

        let eligible = self.updatable_columns(&table);
        let column = eligible
            .choose(&mut self.rng)
            .copied()
            .ok_or_else(|| Error::NoEligibleColumn(table.qualified_name()))?;
        let value = self.values.generate(column, &mut self.rng)?;

        let mut keys = Row::new();
        keys.insert(id_column.name.clone(), Value::Int(id));
        let mut values = Row::new();
        values.insert(column.name.clone(), value);
        Ok(DmlParams::update(&table.schema, &table.name, keys, values))
    }

    async fn delete<S>(&mut self, cache: &mut SchemaCache, sampler: &S) -> Result<DmlParams>
    where
        S: RowSampler + ?Sized,
    {
        let table = self.pick_table(cache)?;
        let id_column = id_column(&table)?;
        let Some(id) = sampler
            .random_id(&table.schema, &table.name, &id_column.name)
            .await?
        else {
            debug!(table = %table.qualified_name(), "empty table, inserting instead of deleting");
            return self.insert(cache, &table);
        };

        let mut keys = Row::new();
        keys.insert(id_column.name.clone(), Value::Int(id));
        Ok(DmlParams::delete(&table.schema, &table.name, keys))
    }

    /// Uniform choice among cached tables that carry an id column.
    fn pick_table(&mut self, cache: &SchemaCache) -> Result<Arc<Table>> {
        let candidates: Vec<Arc<Table>> = cache
            .tables()
            .into_iter()
            .filter(|table| table.id_column().is_some())
            .collect();
        candidates
            .choose(&mut self.rng)
            .cloned()
            .ok_or_else(|| no_tables(cache))
    }

    /// Columns an update may rewrite: not part of any key and of a type the
    /// value registry can produce.
    fn updatable_columns<'t>(&self, table: &'t Table) -> Vec<&'t Column> {
        let id_name = table.id_column().map(|column| column.name.as_str());
        table
            .columns
            .iter()
            .filter(|column| !column.is_key())
            .filter(|column| Some(column.name.as_str()) != id_name)
            .filter(|column| self.values.supports(column))
            .collect()
    }
}

fn id_column(table: &Table) -> Result<&Column> {
    table
        .id_column()
        .ok_or_else(|| Error::Schema(format!("table {} has no id column", table.qualified_name())))
}

fn has_id_tables(cache: &SchemaCache) -> bool {
    cache
        .tables()
        .iter()
        .any(|table| table.id_column().is_some())
}

fn no_tables(cache: &SchemaCache) -> Error {
    let mut schemas: Vec<String> = cache
        .tables()
        .iter()
        .map(|table| table.schema.clone())
        .collect();
    schemas.dedup();
    Error::NoTables(schemas)
}
