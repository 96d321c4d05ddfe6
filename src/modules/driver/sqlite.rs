/// SQLite driver on top of sqlx.
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::sync::Arc;
use std::time::Duration;

use super::{DatabaseDriver, DriverConnection};
use crate::modules::config::{ConnectionConfig, DriverKind};
use crate::modules::schema::{build_ddl, MappedRow, SchemaSet, SqlValue, TableLayout};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::Validator;
use crate::{log_debug, log_info};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        SqliteDriver
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    async fn connect(&self, config: &ConnectionConfig) -> AppResult<Arc<dyn DriverConnection>> {
        let mut options = SqliteConnectOptions::new()
            .filename(&config.locator)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        // SQLCipher-compatible key pragma. A stock SQLite build treats it
        // as a no-op.
        if let Some(secret) = config.credentials.reveal() {
            options = options.pragma("key", secret.to_string());
        }

        // A ":memory:" database must stay on one connection, every pool
        // member would otherwise see its own empty database.
        let max_connections = if config.locator == ":memory:" {
            1
        } else {
            config.pool_size
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::SourceUnavailable(format!(
                    "Failed to open sqlite database '{}': {}",
                    config.locator, e
                ))
            })?;

        log_info!("Opened sqlite database '{}'", config.locator);
        Ok(Arc::new(SqliteConnection { pool }))
    }
}

pub struct SqliteConnection {
    pool: SqlitePool,
}

#[async_trait]
impl DriverConnection for SqliteConnection {
    async fn apply_schema(&self, schema: &SchemaSet) -> AppResult<()> {
        for statement in build_ddl(schema) {
            log_debug!("DDL: {}", statement);
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn ensure_table(&self, layout: &TableLayout) -> AppResult<()> {
        for column in &layout.columns {
            Validator::validate_identifier(column, "Column name")?;
        }
        Validator::validate_identifier(&layout.table, "Table name")?;

        let columns: Vec<String> = layout
            .columns
            .iter()
            .map(|name| format!("{} TEXT", name))
            .collect();
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            layout.table,
            columns.join(", ")
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn write_chunk(&self, layout: &TableLayout, rows: &[MappedRow]) -> AppResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = insert_sql(layout);
        let mut tx = self.pool.begin().await?;
        for row in rows {
            let mut query = sqlx::query(&sql);
            for value in &row.values {
                query = match value {
                    SqlValue::Null => query.bind(Option::<String>::None),
                    SqlValue::Integer(i) => query.bind(*i),
                    SqlValue::Real(f) => query.bind(*f),
                    SqlValue::Text(s) => query.bind(s.as_str()),
                };
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(rows.len() as u64)
    }

    async fn table_row_count(&self, table: &str) -> AppResult<u64> {
        Validator::validate_identifier(table, "Table name")?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn close(&self) -> AppResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// `INSERT OR REPLACE` keeps re-imports of the same source idempotent for
/// tables with a primary key.
fn insert_sql(layout: &TableLayout) -> String {
    let placeholders: Vec<&str> = layout.columns.iter().map(|_| "?").collect();
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        layout.table,
        layout.columns.join(", "),
        placeholders.join(", ")
    )
}
