/// Test helper builders and instrumented drivers
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Semaphore;

use whodb_core::gateway::JobStatusResponse;
use whodb_core::modules::config::{ConnectionConfig, DriverKind};
use whodb_core::modules::driver::{DatabaseDriver, DriverConnection, MemoryDriver, MemoryStore};
use whodb_core::modules::schema::{MappedRow, SchemaSet, TableLayout};
use whodb_core::shared::utils::RetryPolicy;
use whodb_core::{
    AppError, AppResult, ConfigDbRequest, CoordinatorConfig, ImportCoordinator, ImportDbRequest,
    ImportOptions, RequestGateway,
};

/// Coordinator with source retries disabled so failure paths stay fast.
pub fn fast_coordinator() -> ImportCoordinator {
    ImportCoordinator::new(CoordinatorConfig {
        retry_policy: RetryPolicy::none(),
        ..CoordinatorConfig::default()
    })
}

pub fn fast_gateway() -> RequestGateway {
    RequestGateway::new(fast_coordinator())
}

pub fn memory_config_request(locator: &str, schema: Option<Value>) -> ConfigDbRequest {
    ConfigDbRequest {
        driver: "memory".to_string(),
        locator: locator.to_string(),
        credentials: None,
        pool_size: None,
        busy_timeout_ms: None,
        schema,
    }
}

pub fn sqlite_config_request(path: &Path, schema: Option<Value>) -> ConfigDbRequest {
    ConfigDbRequest {
        driver: "sqlite".to_string(),
        locator: path.to_str().unwrap().to_string(),
        credentials: None,
        pool_size: None,
        busy_timeout_ms: None,
        schema,
    }
}

pub fn import_request(handle: &str, path: &Path) -> ImportDbRequest {
    ImportDbRequest {
        handle: handle.to_string(),
        path: path.to_str().unwrap().to_string(),
        format: None,
        table: None,
        options: ImportOptions::default(),
    }
}

/// Register a memory database and hand back its handle.
pub async fn configure_memory(
    gateway: &RequestGateway,
    locator: &str,
    schema: Option<Value>,
) -> String {
    gateway
        .config_db(memory_config_request(locator, schema))
        .await
        .unwrap()
        .handle
}

/// Poll a job until the snapshot satisfies `predicate`. Panics after ~2s.
pub async fn wait_for_snapshot(
    gateway: &RequestGateway,
    job_id: &str,
    what: &str,
    predicate: impl Fn(&JobStatusResponse) -> bool,
) -> JobStatusResponse {
    for _ in 0..400 {
        let snapshot = gateway.get_import_status(job_id).await.unwrap();
        if predicate(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

type WriteHook = Box<dyn Fn(u64) + Send + Sync>;

/// Controls applied to every chunk write that goes through an
/// [`InstrumentedMemoryDriver`] connection.
struct WriteScript {
    /// Writes each consume one permit; `None` leaves them ungated.
    gate: Option<Semaphore>,
    /// Simulated latency per write.
    delay: Option<Duration>,
    /// 1-based write attempts that fail with `DatabaseError`.
    fail_attempts: Vec<u64>,
    /// Called with the 1-based attempt count after each successful write.
    hook: OnceLock<WriteHook>,
    attempts: AtomicU64,
}

/// Memory driver wrapper for tests that need to park, delay, fail or
/// observe chunk writes. Registered in place of the built-in memory
/// driver, everything else delegates to it.
pub struct InstrumentedMemoryDriver {
    inner: MemoryDriver,
    script: Arc<WriteScript>,
    connects: AtomicU64,
}

impl InstrumentedMemoryDriver {
    pub fn new() -> Self {
        InstrumentedMemoryDriver {
            inner: MemoryDriver::new(),
            script: Arc::new(WriteScript {
                gate: None,
                delay: None,
                fail_attempts: Vec::new(),
                hook: OnceLock::new(),
                attempts: AtomicU64::new(0),
            }),
            connects: AtomicU64::new(0),
        }
    }

    /// Start with zero permits; every chunk write blocks until
    /// [`release_writes`](Self::release_writes) grants one.
    pub fn gated() -> Self {
        let mut driver = Self::new();
        Arc::get_mut(&mut driver.script).unwrap().gate = Some(Semaphore::new(0));
        driver
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        Arc::get_mut(&mut self.script).unwrap().delay = Some(delay);
        self
    }

    pub fn failing_attempts(mut self, attempts: &[u64]) -> Self {
        Arc::get_mut(&mut self.script).unwrap().fail_attempts = attempts.to_vec();
        self
    }

    /// Install the post-write hook. Panics when installed twice.
    pub fn on_write(&self, hook: impl Fn(u64) + Send + Sync + 'static) {
        if self.script.hook.set(Box::new(hook)).is_err() {
            panic!("write hook installed twice");
        }
    }

    pub fn release_writes(&self, count: usize) {
        self.script
            .gate
            .as_ref()
            .expect("driver is not gated")
            .add_permits(count);
    }

    pub fn store(&self, locator: &str) -> Option<Arc<MemoryStore>> {
        self.inner.store(locator)
    }

    /// How many connections have been opened through this driver.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Default for InstrumentedMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for InstrumentedMemoryDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Memory
    }

    async fn connect(&self, config: &ConnectionConfig) -> AppResult<Arc<dyn DriverConnection>> {
        let inner = self.inner.connect(config).await?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InstrumentedConnection {
            inner,
            script: Arc::clone(&self.script),
        }))
    }
}

struct InstrumentedConnection {
    inner: Arc<dyn DriverConnection>,
    script: Arc<WriteScript>,
}

#[async_trait]
impl DriverConnection for InstrumentedConnection {
    async fn apply_schema(&self, schema: &SchemaSet) -> AppResult<()> {
        self.inner.apply_schema(schema).await
    }

    async fn ensure_table(&self, layout: &TableLayout) -> AppResult<()> {
        self.inner.ensure_table(layout).await
    }

    async fn write_chunk(&self, layout: &TableLayout, rows: &[MappedRow]) -> AppResult<u64> {
        if let Some(gate) = &self.script.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| AppError::InternalError("write gate closed".to_string()))?;
            permit.forget();
        }
        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
        let attempt = self.script.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.script.fail_attempts.contains(&attempt) {
            return Err(AppError::DatabaseError(format!(
                "injected failure on write {}",
                attempt
            )));
        }
        let written = self.inner.write_chunk(layout, rows).await?;
        if let Some(hook) = self.script.hook.get() {
            hook(attempt);
        }
        Ok(written)
    }

    async fn table_row_count(&self, table: &str) -> AppResult<u64> {
        self.inner.table_row_count(table).await
    }

    async fn close(&self) -> AppResult<()> {
        self.inner.close().await
    }
}
