use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of operation a payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Insert,
    Update,
    Delete,
    Ddl,
}

impl OpKind {
    /// Operation kinds in the order of the configured weight vector.
    pub const ALL: [OpKind; 4] = [OpKind::Insert, OpKind::Update, OpKind::Delete, OpKind::Ddl];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
            OpKind::Ddl => "ddl",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single synthesized column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Render the value as a SQL literal.
    ///
    /// Booleans become `TRUE`/`FALSE`, bytes a `x'..'` hex literal and text
    /// is single-quoted with quotes and backslashes doubled.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Text(value) => {
                let mut out = String::with_capacity(value.len() + 2);
                out.push('\'');
                for ch in value.chars() {
                    match ch {
                        '\'' => out.push_str("''"),
                        '\\' => out.push_str("\\\\"),
                        _ => out.push(ch),
                    }
                }
                out.push('\'');
                out
            }
            Value::Bytes(bytes) => format!("x'{}'", hex::encode_upper(bytes)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(value) => f.write_str(value),
            other => f.write_str(&other.to_sql_literal()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

/// Column name to value, iterated in column-name order.
pub type Row = BTreeMap<String, Value>;

/// One logical operation produced by the generator and consumed once by the
/// dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmlParams {
    pub kind: OpKind,
    pub schema: String,
    pub table: String,
    /// Identifies the target row.
    pub keys: Row,
    /// Inserted or updated data, empty for deletes.
    pub values: Row,
    /// Statement text for DDL payloads.
    pub ddl: Option<String>,
}

impl DmlParams {
    pub fn insert(
        schema: impl Into<String>,
        table: impl Into<String>,
        keys: Row,
        values: Row,
    ) -> Self {
        Self::new(OpKind::Insert, schema, table, keys, values)
    }

    pub fn update(
        schema: impl Into<String>,
        table: impl Into<String>,
        keys: Row,
        values: Row,
    ) -> Self {
        Self::new(OpKind::Update, schema, table, keys, values)
    }

    pub fn delete(schema: impl Into<String>, table: impl Into<String>, keys: Row) -> Self {
        Self::new(OpKind::Delete, schema, table, keys, Row::new())
    }

    pub fn ddl(
        schema: impl Into<String>,
        table: impl Into<String>,
        statement: impl Into<String>,
    ) -> Self {
        Self {
            ddl: Some(statement.into()),
            ..Self::new(OpKind::Ddl, schema, table, Row::new(), Row::new())
        }
    }

    fn new(
        kind: OpKind,
        schema: impl Into<String>,
        table: impl Into<String>,
        keys: Row,
        values: Row,
    ) -> Self {
        Self {
            kind,
            schema: schema.into(),
            table: table.into(),
            keys,
            values,
            ddl: None,
        }
    }

    /// Key used to pick a dispatcher lane: the value of the key column with
    /// the smallest name, or the qualified table name when there is no key.
    pub fn routing_key(&self) -> String {
        match self.keys.values().next() {
            Some(value) => value.to_string(),
            None => format!("{}.{}", self.schema, self.table),
        }
    }
}
