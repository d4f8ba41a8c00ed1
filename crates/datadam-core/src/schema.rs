use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name under which the primary key shows up among a table's unique indexes.
pub const PRIMARY_INDEX: &str = "primary";

/// Column metadata read from the backend. Immutable once cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Ordinal position, starting at 0.
    pub index: usize,
    pub name: String,
    /// Lower-case base type without length or flags (e.g. `varchar`).
    pub data_type: String,
    /// Raw text between the type parentheses (`255`, `10,2`, `'a','b'`).
    pub subtype: Option<String>,
    pub not_null: bool,
    pub unsigned: bool,
    pub is_primary: bool,
    pub is_unique: bool,
    /// Backend specific extra information (e.g. `auto_increment`).
    pub extra: String,
}

impl Column {
    /// Build a column from a declared type such as `int(10) unsigned` or
    /// `enum('a','b')`.
    pub fn new(index: usize, name: impl Into<String>, declared_type: &str) -> Self {
        let (data_type, subtype, unsigned) = parse_declared_type(declared_type);
        Self {
            index,
            name: name.into(),
            data_type,
            subtype,
            not_null: false,
            unsigned,
            is_primary: false,
            is_unique: false,
            extra: String::new(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    /// Declared length for `CHAR(n)`/`VARCHAR(n)` style types.
    pub fn length(&self) -> Option<usize> {
        self.subtype
            .as_deref()
            .and_then(|sub| sub.split(',').next())
            .and_then(|len| len.trim().parse().ok())
    }

    /// Declared candidates of an `ENUM(...)` or `SET(...)` column, unquoted.
    pub fn candidates(&self) -> Vec<String> {
        self.subtype
            .as_deref()
            .map(parse_quoted_list)
            .unwrap_or_default()
    }

    /// Whether the column identifies rows and must never be rewritten.
    pub fn is_key(&self) -> bool {
        self.is_primary || self.is_unique
    }
}

/// Table metadata: ordered columns plus the unique indexes over them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    /// Unique index name (lower-case) to its ordered columns.
    pub index_columns: BTreeMap<String, Vec<Column>>,
}

impl Table {
    /// Build a table from its columns and the column names of each unique
    /// index. Index entries naming unknown columns are dropped, and the
    /// primary/unique flags of the columns are derived from the indexes.
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        mut columns: Vec<Column>,
        indexes: BTreeMap<String, Vec<String>>,
    ) -> Self {
        let indexes: BTreeMap<String, Vec<String>> = indexes
            .into_iter()
            .map(|(key, cols)| (key.to_lowercase(), cols))
            .collect();

        for column in &mut columns {
            for (key, cols) in &indexes {
                if !cols.iter().any(|name| name == &column.name) {
                    continue;
                }
                if key == PRIMARY_INDEX {
                    column.is_primary = true;
                    column.not_null = true;
                } else {
                    column.is_unique = true;
                }
            }
        }

        let index_columns = indexes
            .into_iter()
            .map(|(key, names)| {
                let cols = names
                    .iter()
                    .filter_map(|name| columns.iter().find(|column| &column.name == name))
                    .cloned()
                    .collect();
                (key, cols)
            })
            .collect();

        Self {
            schema: schema.into(),
            name: name.into(),
            columns,
            index_columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    /// Column holding the synthetic row id: the column named `id`, or the
    /// only column of a single-column primary key.
    pub fn id_column(&self) -> Option<&Column> {
        if let Some(column) = self
            .columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case("id"))
        {
            return Some(column);
        }
        match self.index_columns.get(PRIMARY_INDEX) {
            Some(pk) if pk.len() == 1 => self.column(&pk[0].name),
            _ => None,
        }
    }

    /// Quoted `schema`.`table` name.
    pub fn qualified_name(&self) -> String {
        table_name(&self.schema, &self.name)
    }
}

/// Quote a schema and table name with backticks, escaping embedded ones.
pub fn table_name(schema: &str, table: &str) -> String {
    format!("`{}`.`{}`", escape_name(schema), escape_name(table))
}

pub fn escape_name(name: &str) -> String {
    name.replace('`', "``")
}

/// Split a declared type into (lower-case base type, parenthesized detail,
/// unsigned flag).
pub fn parse_declared_type(declared: &str) -> (String, Option<String>, bool) {
    let declared = declared.trim();
    let (base, subtype, rest) = match (declared.find('('), declared.rfind(')')) {
        (Some(open), Some(close)) if close > open => (
            &declared[..open],
            Some(declared[open + 1..close].to_string()),
            &declared[close + 1..],
        ),
        _ => match declared.split_once(char::is_whitespace) {
            Some((base, rest)) => (base, None, rest),
            None => (declared, None, ""),
        },
    };
    let unsigned = rest.to_lowercase().contains("unsigned");
    (base.trim().to_lowercase(), subtype, unsigned)
}

/// Parse `'a','b,c','it''s'` into its unquoted items.
fn parse_quoted_list(raw: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' if in_quote => {
                if chars.peek() == Some(&'\'') {
                    current.push('\'');
                    chars.next();
                } else {
                    in_quote = false;
                }
            }
            '\'' => in_quote = true,
            '\\' if in_quote => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' if !in_quote => items.push(std::mem::take(&mut current)),
            _ if in_quote => current.push(ch),
            _ => {}
        }
    }
    if !raw.trim().is_empty() {
        items.push(current);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_declared_types() {
        assert_eq!(
            parse_declared_type("int(10) unsigned"),
            ("int".to_string(), Some("10".to_string()), true)
        );
        assert_eq!(
            parse_declared_type("BIGINT UNSIGNED"),
            ("bigint".to_string(), None, true)
        );
        assert_eq!(
            parse_declared_type("decimal(10,2)"),
            ("decimal".to_string(), Some("10,2".to_string()), false)
        );
        assert_eq!(parse_declared_type("datetime"), ("datetime".to_string(), None, false));
    }

    #[test]
    fn enum_candidates_keep_commas_and_quotes() {
        let column = Column::new(0, "state", "enum('a','b,c','it''s')");
        assert_eq!(column.data_type, "enum");
        assert_eq!(column.candidates(), vec!["a", "b,c", "it's"]);
    }

    #[test]
    fn varchar_length_is_read_from_subtype() {
        assert_eq!(Column::new(0, "name", "varchar(32)").length(), Some(32));
        assert_eq!(Column::new(0, "price", "decimal(10,2)").length(), Some(10));
        assert_eq!(Column::new(0, "body", "text").length(), None);
    }

    #[test]
    fn indexes_mark_columns_and_drop_unknown_names() {
        let columns = vec![
            Column::new(0, "id", "bigint"),
            Column::new(1, "email", "varchar(64)"),
            Column::new(2, "note", "text"),
        ];
        let mut indexes = BTreeMap::new();
        indexes.insert("PRIMARY".to_string(), vec!["id".to_string()]);
        indexes.insert(
            "uk_email".to_string(),
            vec!["email".to_string(), "missing".to_string()],
        );

        let table = Table::new("dam", "users", columns, indexes);

        assert!(table.columns[0].is_primary);
        assert!(table.columns[1].is_unique);
        assert!(!table.columns[2].is_key());
        assert_eq!(table.index_columns["uk_email"].len(), 1);
        assert_eq!(table.id_column().map(|c| c.name.as_str()), Some("id"));
        assert_eq!(table.qualified_name(), "`dam`.`users`");
    }

    #[test]
    fn single_column_primary_key_is_the_id_column() {
        let columns = vec![Column::new(0, "user_no", "int"), Column::new(1, "v", "int")];
        let mut indexes = BTreeMap::new();
        indexes.insert("primary".to_string(), vec!["user_no".to_string()]);
        let table = Table::new("dam", "t", columns, indexes);
        assert_eq!(table.id_column().map(|c| c.name.as_str()), Some("user_no"));
    }
}
