/// In-memory driver, mainly for tests and dry runs. Stores rows as JSON
/// objects keyed by table name; one store per locator, shared by every
/// connection to it.
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{DatabaseDriver, DriverConnection};
use crate::modules::config::{ConnectionConfig, DriverKind};
use crate::modules::schema::{join_table_name, MappedRow, SchemaSet, TableLayout};
use crate::shared::errors::{AppError, AppResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<String, Vec<Map<String, Value>>>,
}

impl MemoryStore {
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn row_count(&self, table: &str) -> Option<u64> {
        self.tables.get(table).map(|rows| rows.len() as u64)
    }

    pub fn rows(&self, table: &str) -> Option<Vec<Map<String, Value>>> {
        self.tables.get(table).map(|rows| rows.clone())
    }

    fn create_table(&self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }
}

#[derive(Default)]
pub struct MemoryDriver {
    stores: DashMap<String, Arc<MemoryStore>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct view into a locator's store, used by tests to inspect what an
    /// import wrote.
    pub fn store(&self, locator: &str) -> Option<Arc<MemoryStore>> {
        self.stores.get(locator).map(|entry| Arc::clone(entry.value()))
    }
}

#[async_trait]
impl DatabaseDriver for MemoryDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Memory
    }

    async fn connect(&self, config: &ConnectionConfig) -> AppResult<Arc<dyn DriverConnection>> {
        let store = self
            .stores
            .entry(config.locator.clone())
            .or_default()
            .clone();
        Ok(Arc::new(MemoryConnection { store }))
    }
}

struct MemoryConnection {
    store: Arc<MemoryStore>,
}

#[async_trait]
impl DriverConnection for MemoryConnection {
    async fn apply_schema(&self, schema: &SchemaSet) -> AppResult<()> {
        for table in &schema.tables {
            self.store.create_table(&table.name);
            for many in table.many_on.values() {
                self.store
                    .create_table(&join_table_name(&table.name, &many.references));
            }
        }
        Ok(())
    }

    async fn ensure_table(&self, layout: &TableLayout) -> AppResult<()> {
        self.store.create_table(&layout.table);
        Ok(())
    }

    async fn write_chunk(&self, layout: &TableLayout, rows: &[MappedRow]) -> AppResult<u64> {
        // Materialize the whole chunk before touching the table so the
        // append below is all-or-nothing.
        let mut mapped = Vec::with_capacity(rows.len());
        for row in rows {
            let mut object = Map::new();
            for (column, value) in layout.columns.iter().zip(&row.values) {
                object.insert(column.clone(), value.to_json());
            }
            mapped.push(object);
        }

        let mut table = self
            .store
            .tables
            .get_mut(&layout.table)
            .ok_or_else(|| AppError::DatabaseError(format!("No such table: {}", layout.table)))?;
        table.extend(mapped);
        Ok(rows.len() as u64)
    }

    async fn table_row_count(&self, table: &str) -> AppResult<u64> {
        self.store
            .row_count(table)
            .ok_or_else(|| AppError::DatabaseError(format!("No such table: {}", table)))
    }

    async fn close(&self) -> AppResult<()> {
        Ok(())
    }
}
