/// Record-to-row mapping.
///
/// Maps decoded source records onto a fixed column layout so the drivers can
/// prepare one insert statement per table. Declared columns are coerced to
/// their schema type; any remaining record fields are folded into a JSON
/// object stored in the `extra` overflow column.
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::table::{ColumnType, SqlValue, TableSchema, EXTRA_COLUMN};

/// Column layout of one insert target. `columns` always ends with the
/// `extra` overflow column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub table: String,
    pub columns: Vec<String>,
}

/// One record mapped onto a [`TableLayout`]; `values` is parallel to
/// `layout.columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    pub values: Vec<SqlValue>,
}

#[derive(Debug, Clone)]
pub struct RowMapper {
    layout: TableLayout,
    typed: Vec<(String, ColumnType)>,
}

impl RowMapper {
    /// Build a mapper from a configured table schema.
    pub fn from_schema(table: &TableSchema) -> Self {
        let typed: Vec<(String, ColumnType)> = table
            .columns
            .iter()
            .map(|(name, spec)| (name.clone(), spec.column_type))
            .collect();
        Self::new(table.name.clone(), typed)
    }

    /// Build a mapper for a table with no configured schema: every field seen
    /// in the sampled records becomes a TEXT column, sorted by name.
    pub fn dynamic(table: &str, sample: &[Map<String, Value>]) -> Self {
        let mut names = BTreeSet::new();
        for record in sample {
            for key in record.keys() {
                names.insert(key.clone());
            }
        }
        let typed: Vec<(String, ColumnType)> = names
            .into_iter()
            .map(|name| (name, ColumnType::Text))
            .collect();
        Self::new(table.to_string(), typed)
    }

    fn new(table: String, typed: Vec<(String, ColumnType)>) -> Self {
        let mut columns: Vec<String> = typed.iter().map(|(name, _)| name.clone()).collect();
        columns.push(EXTRA_COLUMN.to_string());
        RowMapper {
            layout: TableLayout { table, columns },
            typed,
        }
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Map one record. Missing declared columns become `Null`; coercion
    /// failures report the offending column so callers can attach the record
    /// offset.
    pub fn map(&self, record: &Map<String, Value>) -> Result<MappedRow, String> {
        let mut values = Vec::with_capacity(self.layout.columns.len());
        for (name, column_type) in &self.typed {
            let value = match record.get(name) {
                Some(raw) => column_type
                    .coerce(raw)
                    .map_err(|e| format!("column '{}': {}", name, e))?,
                None => SqlValue::Null,
            };
            values.push(value);
        }

        let mut extra = Map::new();
        for (key, value) in record {
            if !self.typed.iter().any(|(name, _)| name == key) {
                extra.insert(key.clone(), value.clone());
            }
        }
        if extra.is_empty() {
            values.push(SqlValue::Null);
        } else {
            values.push(SqlValue::Text(Value::Object(extra).to_string()));
        }

        Ok(MappedRow { values })
    }
}
