use std::collections::BTreeMap;

use datadam_core::{Column, Table};

use super::queries::{RawColumn, RawIndexColumn};

pub fn map_columns(raw: Vec<RawColumn>) -> Vec<Column> {
    raw.into_iter()
        .map(|col| {
            let index = usize::try_from(col.ordinal_position.saturating_sub(1)).unwrap_or_default();
            let mut column = Column::new(index, col.name, &col.column_type);
            column.not_null = col.is_nullable.eq_ignore_ascii_case("NO");
            column.extra = col.extra.to_lowercase();
            column
        })
        .collect()
}

/// Group index rows by index name. Expression parts without a column are
/// skipped.
pub fn map_unique_indexes(raw: Vec<RawIndexColumn>) -> BTreeMap<String, Vec<String>> {
    let mut indexes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in raw {
        let Some(column) = row.column_name else {
            continue;
        };
        indexes
            .entry(row.index_name.to_lowercase())
            .or_default()
            .push(column);
    }
    indexes
}

pub fn map_table(
    schema: &str,
    name: &str,
    columns: Vec<RawColumn>,
    indexes: Vec<RawIndexColumn>,
) -> Table {
    Table::new(schema, name, map_columns(columns), map_unique_indexes(indexes))
}
