/// Database drivers.
///
/// A driver turns an accepted [`ConnectionConfig`] into a live
/// [`DriverConnection`] the import pipeline writes through. Connections are
/// shared behind `Arc` and must be safe to call from concurrent import
/// tasks; `write_chunk` is the transactional unit, a chunk is either fully
/// visible or not at all.
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::modules::config::{ConnectionConfig, DriverKind};
use crate::modules::schema::{MappedRow, SchemaSet, TableLayout};
use crate::shared::errors::{AppError, AppResult};

pub use memory::{MemoryDriver, MemoryStore};
pub use sqlite::SqliteDriver;

#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    fn kind(&self) -> DriverKind;

    async fn connect(&self, config: &ConnectionConfig) -> AppResult<Arc<dyn DriverConnection>>;
}

#[async_trait]
pub trait DriverConnection: Send + Sync {
    /// Provision the configured tables, join tables included. Must be
    /// idempotent so re-accepted configs can re-run it.
    async fn apply_schema(&self, schema: &SchemaSet) -> AppResult<()>;

    /// Create a table for a layout discovered at import time. Columns are
    /// untyped (TEXT); already-existing tables are left untouched.
    async fn ensure_table(&self, layout: &TableLayout) -> AppResult<()>;

    /// Write one chunk inside a single transaction. Either every row in
    /// `rows` becomes visible or none does.
    async fn write_chunk(&self, layout: &TableLayout, rows: &[MappedRow]) -> AppResult<u64>;

    async fn table_row_count(&self, table: &str) -> AppResult<u64>;

    async fn close(&self) -> AppResult<()>;
}

/// Maps a [`DriverKind`] to its driver. Built-in drivers are registered up
/// front; tests swap in their own implementations through `register`.
pub struct DriverRegistry {
    drivers: DashMap<DriverKind, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    pub fn with_builtins() -> Self {
        let registry = DriverRegistry {
            drivers: DashMap::new(),
        };
        registry.register(Arc::new(SqliteDriver::new()));
        registry.register(Arc::new(MemoryDriver::new()));
        registry
    }

    pub fn register(&self, driver: Arc<dyn DatabaseDriver>) {
        self.drivers.insert(driver.kind(), driver);
    }

    pub fn get(&self, kind: DriverKind) -> AppResult<Arc<dyn DatabaseDriver>> {
        self.drivers
            .get(&kind)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                AppError::InternalError(format!("No driver registered for '{}'", kind))
            })
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
