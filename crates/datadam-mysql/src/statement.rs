//! Parameterized DML statements for one row.

use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;

use datadam_core::schema::escape_name;
use datadam_core::{Error, Result, Row, Value, table_name};

/// SQL text with `?` placeholders plus the values bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement<'a> {
    pub sql: String,
    pub args: Vec<&'a Value>,
}

impl<'a> Statement<'a> {
    pub fn insert(schema: &str, table: &str, values: &'a Row) -> Self {
        let columns: Vec<String> = values.keys().map(|name| quote(name)).collect();
        let placeholders = vec!["?"; values.len()];
        Self {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table_name(schema, table),
                columns.join(", "),
                placeholders.join(", ")
            ),
            args: values.values().collect(),
        }
    }

    pub fn update(schema: &str, table: &str, keys: &'a Row, values: &'a Row) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::Execution(format!(
                "update of {} sets no column",
                table_name(schema, table)
            )));
        }
        let (filter, key_args) = where_clause(schema, table, keys)?;
        let assignments: Vec<String> = values
            .keys()
            .map(|name| format!("{} = ?", quote(name)))
            .collect();
        let mut args: Vec<&Value> = values.values().collect();
        args.extend(key_args);
        Ok(Self {
            sql: format!(
                "UPDATE {} SET {} WHERE {}",
                table_name(schema, table),
                assignments.join(", "),
                filter
            ),
            args,
        })
    }

    pub fn delete(schema: &str, table: &str, keys: &'a Row) -> Result<Self> {
        let (filter, args) = where_clause(schema, table, keys)?;
        Ok(Self {
            sql: format!("DELETE FROM {} WHERE {}", table_name(schema, table), filter),
            args,
        })
    }

    /// The statement with every placeholder replaced by its literal, for
    /// logging.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.sql.len());
        let mut args = self.args.iter();
        for ch in self.sql.chars() {
            if ch == '?' {
                if let Some(value) = args.next() {
                    out.push_str(&value.to_sql_literal());
                    continue;
                }
            }
            out.push(ch);
        }
        out
    }

    pub fn query(&self) -> Query<'_, MySql, MySqlArguments> {
        self.args
            .iter()
            .fold(sqlx::query(&self.sql), |query, value| bind(query, value))
    }
}

fn bind<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &'q Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Int(value) => query.bind(*value),
        Value::Float(value) => query.bind(*value),
        Value::Bool(value) => query.bind(*value),
        Value::Text(value) => query.bind(value.as_str()),
        Value::Bytes(value) => query.bind(value.as_slice()),
    }
}

fn quote(name: &str) -> String {
    format!("`{}`", escape_name(name))
}

/// `a = ? AND b IS NULL` over every key column.
fn where_clause<'a>(schema: &str, table: &str, keys: &'a Row) -> Result<(String, Vec<&'a Value>)> {
    if keys.is_empty() {
        return Err(Error::Execution(format!(
            "refusing to touch every row of {}",
            table_name(schema, table)
        )));
    }
    let mut parts = Vec::with_capacity(keys.len());
    let mut args = Vec::with_capacity(keys.len());
    for (name, value) in keys {
        if value.is_null() {
            parts.push(format!("{} IS NULL", quote(name)));
        } else {
            parts.push(format!("{} = ?", quote(name)));
            args.push(value);
        }
    }
    Ok((parts.join(" AND "), args))
}
