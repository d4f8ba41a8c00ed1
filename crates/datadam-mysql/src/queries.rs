use sqlx::MySqlPool;

use datadam_core::{Error, Result, table_name};
use datadam_core::schema::escape_name;

// information_schema columns come back as binary strings on some servers,
// hence the casts.

pub async fn list_tables(pool: &MySqlPool, schema: &str) -> Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        r#"
        select cast(table_name as char)
        from information_schema.tables
        where table_schema = ?
          and table_type = 'BASE TABLE'
        order by table_name
        "#,
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|err| Error::Db(err.to_string()))
}

pub struct RawColumn {
    pub ordinal_position: i64,
    pub name: String,
    pub column_type: String,
    pub is_nullable: String,
    pub extra: String,
}

pub async fn list_columns(pool: &MySqlPool, schema: &str, table: &str) -> Result<Vec<RawColumn>> {
    let rows = sqlx::query_as::<_, (i64, String, String, String, String)>(
        r#"
        select
          cast(ordinal_position as signed),
          cast(column_name as char),
          cast(column_type as char),
          cast(is_nullable as char),
          cast(extra as char)
        from information_schema.columns
        where table_schema = ?
          and table_name = ?
        order by ordinal_position
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(|err| Error::Db(err.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|(ordinal_position, name, column_type, is_nullable, extra)| RawColumn {
            ordinal_position,
            name,
            column_type,
            is_nullable,
            extra,
        })
        .collect())
}

pub struct RawIndexColumn {
    pub index_name: String,
    pub column_name: Option<String>,
}

/// Columns of the unique indexes of a table, in index order.
pub async fn list_unique_index_columns(
    pool: &MySqlPool,
    schema: &str,
    table: &str,
) -> Result<Vec<RawIndexColumn>> {
    let rows = sqlx::query_as::<_, (String, Option<String>)>(
        r#"
        select
          cast(index_name as char),
          cast(column_name as char)
        from information_schema.statistics
        where table_schema = ?
          and table_name = ?
          and non_unique = 0
        order by index_name, seq_in_index
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(|err| Error::Db(err.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|(index_name, column_name)| RawIndexColumn {
            index_name,
            column_name,
        })
        .collect())
}

pub async fn max_id(pool: &MySqlPool, schema: &str, table: &str, id_column: &str) -> Result<i64> {
    let sql = format!(
        "select cast(ifnull(max(`{column}`), 0) as char) from {table}",
        column = escape_name(id_column),
        table = table_name(schema, table),
    );
    let max = sqlx::query_scalar::<_, String>(&sql)
        .fetch_one(pool)
        .await
        .map_err(|err| Error::Db(err.to_string()))?;
    parse_id(&max)
}

pub async fn random_id(
    pool: &MySqlPool,
    schema: &str,
    table: &str,
    id_column: &str,
) -> Result<Option<i64>> {
    let sql = format!(
        "select cast(`{column}` as char) from {table} order by rand() limit 1",
        column = escape_name(id_column),
        table = table_name(schema, table),
    );
    sqlx::query_scalar::<_, String>(&sql)
        .fetch_optional(pool)
        .await
        .map_err(|err| Error::Db(err.to_string()))?
        .map(|id| parse_id(&id))
        .transpose()
}

// Ids are read as text: BIGINT UNSIGNED values above i64::MAX would wrap
// through a signed cast.
fn parse_id(text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| Error::Schema(format!("id {text} does not fit a signed 64-bit integer")))
}
