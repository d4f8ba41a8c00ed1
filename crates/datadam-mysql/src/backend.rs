use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use tracing::debug;

use datadam_core::{
    Backend, BackendFactory, DbConfig, DmlParams, Error, Introspector, MySqlConfig, OpKind, Result,
    Row, RowSampler, SchemaCache, Table,
};
use datadam_generate::DmlSynthesizer;

use crate::mapper;
use crate::queries;
use crate::statement::Statement;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Catalog and row lookups over a MySQL pool.
#[derive(Debug, Clone)]
pub struct MySqlCatalog {
    pool: MySqlPool,
}

impl MySqlCatalog {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Introspector for MySqlCatalog {
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        queries::list_tables(&self.pool, schema).await
    }

    async fn describe_table(&self, schema: &str, table: &str) -> Result<Table> {
        let columns = queries::list_columns(&self.pool, schema, table).await?;
        let indexes = queries::list_unique_index_columns(&self.pool, schema, table).await?;
        Ok(mapper::map_table(schema, table, columns, indexes))
    }

    async fn max_id(&self, schema: &str, table: &str, id_column: &str) -> Result<i64> {
        queries::max_id(&self.pool, schema, table, id_column).await
    }
}

#[async_trait]
impl RowSampler for MySqlCatalog {
    async fn random_id(&self, schema: &str, table: &str, id_column: &str) -> Result<Option<i64>> {
        queries::random_id(&self.pool, schema, table, id_column).await
    }
}

/// Backend bound to a single MySQL connection.
pub struct MySqlBackend {
    catalog: MySqlCatalog,
    cache: SchemaCache,
    synth: DmlSynthesizer,
    verbose: bool,
}

impl MySqlBackend {
    /// Open a pool capped at one connection, so the backend owns it.
    pub async fn connect(config: &MySqlConfig, verbose: bool) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password);
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|err| {
                Error::Db(format!("connect to {}:{}: {err}", config.host, config.port))
            })?;
        Ok(Self::from_pool(pool, verbose))
    }

    pub fn from_pool(pool: MySqlPool, verbose: bool) -> Self {
        Self {
            catalog: MySqlCatalog::new(pool),
            cache: SchemaCache::new(),
            synth: DmlSynthesizer::from_os_rng(),
            verbose,
        }
    }

    async fn execute(&self, statement: Statement<'_>) -> Result<()> {
        if self.verbose {
            debug!(sql = %statement.render(), "executing");
        }
        statement
            .query()
            .execute(&self.catalog.pool)
            .await
            .map_err(|err| Error::Execution(format!("{}: {err}", statement.sql)))?;
        Ok(())
    }
}

#[async_trait]
impl Backend for MySqlBackend {
    fn engine(&self) -> &'static str {
        "mysql"
    }

    async fn close(&mut self) -> Result<()> {
        self.cache.clear_all();
        self.catalog.pool.close().await;
        Ok(())
    }

    async fn prepare_tables(
        &mut self,
        schema: &str,
    ) -> Result<(Vec<Arc<Table>>, Vec<Vec<String>>)> {
        self.cache.prepare_tables(&self.catalog, schema).await
    }

    async fn get_table(&mut self, schema: &str, table: &str) -> Result<(Arc<Table>, Vec<String>)> {
        self.cache.get_table(&self.catalog, schema, table).await
    }

    async fn insert(&mut self, schema: &str, table: &str, values: &Row) -> Result<()> {
        self.execute(Statement::insert(schema, table, values)).await
    }

    async fn update(&mut self, schema: &str, table: &str, keys: &Row, values: &Row) -> Result<()> {
        self.execute(Statement::update(schema, table, keys, values)?)
            .await
    }

    async fn delete(&mut self, schema: &str, table: &str, keys: &Row) -> Result<()> {
        self.execute(Statement::delete(schema, table, keys)?).await
    }

    async fn execute_ddl(&mut self, schema: &str, table: &str, statement: &str) -> Result<()> {
        if self.verbose {
            debug!(sql = %statement, "executing ddl");
        }
        sqlx::raw_sql(statement)
            .execute(&self.catalog.pool)
            .await
            .map_err(|err| Error::Execution(format!("{statement}: {err}")))?;
        self.cache.clear_table(schema, table);
        Ok(())
    }

    async fn generate_dml(&mut self, kind: OpKind) -> Result<DmlParams> {
        self.synth
            .generate(kind, &mut self.cache, &self.catalog)
            .await
    }

    fn clear_table(&mut self, schema: &str, table: &str) {
        self.cache.clear_table(schema, table);
    }

    fn clear_all(&mut self) {
        self.cache.clear_all();
    }
}

/// Registers the `mysql` backend kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlFactory;

#[async_trait]
impl BackendFactory for MySqlFactory {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn create(&self, config: &DbConfig) -> Result<Box<dyn Backend>> {
        let backend = MySqlBackend::connect(&config.mysql, config.verbose).await?;
        Ok(Box::new(backend))
    }
}
