/// Schema config for import targets
///
/// A schema describes the tables an import may write: column types, an
/// optional primary key, plain foreign-key references, and many-to-many
/// references that materialize as join tables. The config arrives as JSON of
/// the shape `{ table: { column: { "type": …, "pk"?, "references"?,
/// "referencesOn"?, "manyOn"? } } }`.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::Validator;

/// Name of the overflow column every table carries. Record fields that are
/// not declared as columns are collected into a JSON object stored here.
pub const EXTRA_COLUMN: &str = "extra";

/// Column value type, coerced from JSON record fields before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
        }
    }

    /// Coerce a JSON value into this column type.
    ///
    /// `Null` passes through as [`SqlValue::Null`]. Strings are parsed for
    /// numeric/boolean columns so CSV sources (all-string records) coerce the
    /// same way JSON sources do.
    pub fn coerce(&self, value: &serde_json::Value) -> Result<SqlValue, String> {
        use serde_json::Value;

        if value.is_null() {
            return Ok(SqlValue::Null);
        }

        match self {
            ColumnType::Integer => match value {
                Value::Number(n) if n.is_i64() => Ok(SqlValue::Integer(n.as_i64().unwrap_or(0))),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(SqlValue::Integer)
                    .map_err(|_| format!("'{}' is not an integer", s)),
                Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
                other => Err(format!("{} is not an integer", other)),
            },
            ColumnType::Real => match value {
                Value::Number(n) => n
                    .as_f64()
                    .map(SqlValue::Real)
                    .ok_or_else(|| format!("{} is not a real number", n)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(SqlValue::Real)
                    .map_err(|_| format!("'{}' is not a real number", s)),
                other => Err(format!("{} is not a real number", other)),
            },
            ColumnType::Text => match value {
                Value::String(s) => Ok(SqlValue::Text(s.clone())),
                other => Ok(SqlValue::Text(other.to_string())),
            },
            ColumnType::Boolean => match value {
                Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
                Value::Number(n) if n.is_i64() => match n.as_i64().unwrap_or(0) {
                    0 => Ok(SqlValue::Integer(0)),
                    1 => Ok(SqlValue::Integer(1)),
                    other => Err(format!("{} is not a boolean", other)),
                },
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(SqlValue::Integer(1)),
                    "false" | "0" | "no" => Ok(SqlValue::Integer(0)),
                    other => Err(format!("'{}' is not a boolean", other)),
                },
                other => Err(format!("{} is not a boolean", other)),
            },
        }
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        match lowered.as_str() {
            "integer" | "int" | "bigint" | "smallint" => Ok(ColumnType::Integer),
            "real" | "float" | "double" | "numeric" | "decimal" => Ok(ColumnType::Real),
            "text" | "string" | "clob" => Ok(ColumnType::Text),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            // VARCHAR(n) and CHAR(n) carry no useful length for us
            other if other.starts_with("varchar") || other.starts_with("char") => {
                Ok(ColumnType::Text)
            }
            other => Err(format!("Unknown column type: {}", other)),
        }
    }
}

/// Typed cell value ready for binding into a driver statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Render as a JSON value, used by the memory driver and snapshots.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Integer(i) => serde_json::Value::from(*i),
            SqlValue::Real(f) => serde_json::Value::from(*f),
            SqlValue::Text(s) => serde_json::Value::from(s.clone()),
        }
    }
}

/// Plain column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub column_type: ColumnType,
    pub pk: bool,
}

/// Foreign-key reference: `column REFERENCES references(references_on)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub references: String,
    pub references_on: String,
}

/// Many-to-many reference; materializes as a `<table>_<references>` join
/// table instead of a column on the declaring table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManyOnReference {
    pub references: String,
    pub references_on: String,
    pub many_on: String,
}

/// One table of the configured schema. Column order is sorted by name so DDL
/// and insert layouts are deterministic across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: BTreeMap<String, ColumnSpec>,
    pub references: BTreeMap<String, Reference>,
    pub many_on: BTreeMap<String, ManyOnReference>,
}

impl TableSchema {
    /// The single declared primary-key column, if any.
    pub fn primary_key(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, spec)| spec.pk)
            .map(|(name, _)| name.as_str())
    }
}

/// Raw column entry as it appears in the JSON config.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ColumnConfig {
    #[serde(rename = "type")]
    column_type: Option<String>,
    #[serde(default)]
    pk: Option<bool>,
    references: Option<String>,
    references_on: Option<String>,
    many_on: Option<String>,
}

/// The full configured schema for one database target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSet {
    pub tables: Vec<TableSchema>,
}

impl SchemaSet {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Parse the `{ table: { column: {...} } }` config shape.
    pub fn from_config_value(value: &serde_json::Value) -> AppResult<Self> {
        let table_map = value.as_object().ok_or_else(|| {
            AppError::InvalidInput("Schema config must be a JSON object of tables".to_string())
        })?;

        let mut tables = Vec::with_capacity(table_map.len());
        for (table_name, columns_value) in table_map {
            Validator::validate_identifier(table_name, "Table name")?;
            let column_map = columns_value.as_object().ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Schema for table '{}' must be a JSON object of columns",
                    table_name
                ))
            })?;

            let mut columns = BTreeMap::new();
            let mut references = BTreeMap::new();
            let mut many_on = BTreeMap::new();

            for (column_name, column_value) in column_map {
                Validator::validate_identifier(column_name, "Column name")?;
                let config: ColumnConfig =
                    serde_json::from_value(column_value.clone()).map_err(|e| {
                        AppError::InvalidInput(format!(
                            "Invalid column config '{}.{}': {}",
                            table_name, column_name, e
                        ))
                    })?;

                match (&config.references, &config.many_on) {
                    (Some(referenced), Some(field)) => {
                        let referenced_on = require_references_on(
                            &config,
                            table_name,
                            column_name,
                        )?;
                        Validator::validate_identifier(referenced, "Referenced table")?;
                        many_on.insert(
                            column_name.clone(),
                            ManyOnReference {
                                references: referenced.clone(),
                                references_on: referenced_on,
                                many_on: field.clone(),
                            },
                        );
                        // A manyOn entry is not a column on this table.
                        continue;
                    }
                    (Some(referenced), None) => {
                        let referenced_on = require_references_on(
                            &config,
                            table_name,
                            column_name,
                        )?;
                        Validator::validate_identifier(referenced, "Referenced table")?;
                        references.insert(
                            column_name.clone(),
                            Reference {
                                references: referenced.clone(),
                                references_on: referenced_on,
                            },
                        );
                    }
                    (None, Some(_)) => {
                        return Err(AppError::InvalidInput(format!(
                            "Column '{}.{}' declares manyOn without references",
                            table_name, column_name
                        )));
                    }
                    (None, None) => {}
                }

                let type_str = config.column_type.as_deref().ok_or_else(|| {
                    AppError::InvalidInput(format!(
                        "Column '{}.{}' is missing a type",
                        table_name, column_name
                    ))
                })?;
                let column_type: ColumnType = type_str.parse().map_err(|e: String| {
                    AppError::InvalidInput(format!("Column '{}.{}': {}", table_name, column_name, e))
                })?;

                columns.insert(
                    column_name.clone(),
                    ColumnSpec {
                        column_type,
                        pk: config.pk.unwrap_or(false),
                    },
                );
            }

            let table = TableSchema {
                name: table_name.clone(),
                columns,
                references,
                many_on,
            };

            let pk_count = table.columns.values().filter(|c| c.pk).count();
            if pk_count > 1 {
                return Err(AppError::InvalidInput(format!(
                    "Table '{}' declares {} primary-key columns, at most one is supported",
                    table_name, pk_count
                )));
            }
            if table.columns.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "Table '{}' declares no columns",
                    table_name
                )));
            }

            tables.push(table);
        }

        Ok(SchemaSet { tables })
    }
}

fn require_references_on(
    config: &ColumnConfig,
    table: &str,
    column: &str,
) -> AppResult<String> {
    let on = config.references_on.as_deref().ok_or_else(|| {
        AppError::InvalidInput(format!(
            "Column '{}.{}' declares references without referencesOn",
            table, column
        ))
    })?;
    Validator::validate_identifier(on, "Referenced column")?;
    Ok(on.to_string())
}
