/// Import coordination.
///
/// The coordinator owns every piece of run-time state: accepted configs,
/// driver connections, job records and the result cache. It admits at most
/// one running import per configured database (single-flight); a second
/// request for the same handle is rejected with `AlreadyRunning` and the
/// admission map settles races so exactly one of two simultaneous requests
/// wins.
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::domain::{ImportOptions, ImportSource, JobId, JobSnapshot, JobState, JobStatus};
use super::pipeline::ImportRunner;
use super::reporter::{ResultReporter, TerminalResult};
use crate::modules::config::{ConfigHandle, ConfigRegistry, ConnectionConfig};
use crate::modules::driver::{DatabaseDriver, DriverConnection, DriverRegistry};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::logger::LogContext;
use crate::shared::utils::{RetryPolicy, Validator};
use crate::log_info;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Backoff applied to unreadable sources before an import gives up.
    pub retry_policy: RetryPolicy,
    /// Wall-clock budget applied to jobs whose request does not set one.
    /// `None` lets such jobs run unbounded.
    pub default_timeout_ms: Option<u64>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            retry_policy: RetryPolicy::source_read(),
            default_timeout_ms: None,
        }
    }
}

struct JobEntry {
    state: Arc<JobState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    configs: ConfigRegistry,
    drivers: DriverRegistry,
    reporter: ResultReporter,
    jobs: DashMap<JobId, Arc<JobEntry>>,
    active: DashMap<ConfigHandle, JobId>,
    connections: DashMap<ConfigHandle, Arc<dyn DriverConnection>>,
    next_job_id: AtomicU64,
    retry: RetryPolicy,
    default_timeout_ms: Option<u64>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct ImportCoordinator {
    inner: Arc<Inner>,
}

impl ImportCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        ImportCoordinator {
            inner: Arc::new(Inner {
                configs: ConfigRegistry::new(),
                drivers: DriverRegistry::with_builtins(),
                reporter: ResultReporter::new(),
                jobs: DashMap::new(),
                active: DashMap::new(),
                connections: DashMap::new(),
                next_job_id: AtomicU64::new(1),
                retry: config.retry_policy,
                default_timeout_ms: config.default_timeout_ms,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Swap in a driver, mainly used by tests to inject failing backends.
    pub fn register_driver(&self, driver: Arc<dyn DatabaseDriver>) {
        self.inner.drivers.register(driver);
    }

    /// Accept a database config and provision its schema. Resubmitting the
    /// same config returns the original handle; a different config for the
    /// same database is rejected.
    pub async fn configure(&self, config: ConnectionConfig) -> AppResult<(ConfigHandle, bool)> {
        self.ensure_open()?;
        config.validate()?;

        let (handle, created) = self.inner.configs.register(config)?;
        if !created {
            log_info!("Config for handle {} re-accepted", handle);
            return Ok((handle, false));
        }

        let registered = self.inner.configs.resolve(&handle)?;
        match self.inner.provision(&registered.config).await {
            Ok(connection) => {
                self.inner.connections.insert(handle, connection);
                log_info!(
                    "Configured {} database '{}' as {}",
                    registered.config.driver,
                    registered.config.locator,
                    handle
                );
                Ok((handle, true))
            }
            Err(e) => {
                self.inner.configs.unregister(&handle);
                Err(e)
            }
        }
    }

    /// Start an import for a configured database. Returns the accepted
    /// job's first snapshot; the job itself runs in the background.
    pub async fn import(
        &self,
        handle: ConfigHandle,
        source: ImportSource,
        options: ImportOptions,
    ) -> AppResult<JobSnapshot> {
        use dashmap::mapref::entry::Entry;

        self.ensure_open()?;
        let registered = self.inner.configs.resolve(&handle)?;
        Validator::validate_chunk_size(options.chunk_size)?;
        if let Some(ms) = options.timeout_ms {
            Validator::validate_timeout_ms(ms, "Import timeout")?;
        }

        let connection = self.inner.connection_for(handle, &registered.config).await?;

        let job_id = match self.inner.active.entry(handle) {
            Entry::Occupied(entry) => {
                let running = *entry.get();
                return Err(AppError::AlreadyRunning(format!(
                    "{} is already importing into database {}",
                    running, handle
                )));
            }
            Entry::Vacant(entry) => {
                let job_id = JobId(self.inner.next_job_id.fetch_add(1, Ordering::SeqCst));
                entry.insert(job_id);
                job_id
            }
        };

        let state = Arc::new(JobState::new(job_id, handle));
        let entry = Arc::new(JobEntry {
            state: Arc::clone(&state),
            cancel: self.inner.shutdown.child_token(),
            task: Mutex::new(None),
        });
        self.inner.jobs.insert(job_id, Arc::clone(&entry));

        let deadline = options
            .timeout_ms
            .or(self.inner.default_timeout_ms)
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let runner = ImportRunner::new(
            connection,
            registered.config.schema.clone(),
            options,
        )
        .with_retry_policy(self.inner.retry.clone());

        log_info!(
            "{} accepted for {} database {}",
            job_id,
            registered.config.driver,
            handle
        );

        let task = tokio::spawn(Inner::run_job(
            Arc::clone(&self.inner),
            Arc::clone(&entry),
            runner,
            source,
            deadline,
        ));
        *entry.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);

        Ok(state.snapshot())
    }

    /// Request cancellation. Terminal jobs are left alone; either way the
    /// job's current snapshot is returned as the acknowledgment.
    pub fn cancel(&self, job_id: JobId) -> AppResult<JobSnapshot> {
        let entry = self.job_entry(job_id)?;
        if !entry.state.status().is_terminal() {
            log_info!("Cancelling {}", job_id);
            entry.cancel.cancel();
        }
        Ok(entry.state.snapshot())
    }

    pub fn status(&self, job_id: JobId) -> AppResult<JobSnapshot> {
        Ok(self.job_entry(job_id)?.state.snapshot())
    }

    /// Cached terminal result, `None` while the job still runs.
    pub fn result(&self, job_id: JobId) -> AppResult<Option<TerminalResult>> {
        self.job_entry(job_id)?;
        Ok(self.inner.reporter.get(job_id))
    }

    /// Block until the job reaches a terminal state.
    pub async fn wait_for_result(&self, job_id: JobId) -> AppResult<TerminalResult> {
        self.job_entry(job_id)?;
        self.inner.reporter.wait(job_id).await
    }

    /// Stop accepting work, cancel running imports at their next chunk
    /// boundary and wait for them to report, then close every connection.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        log_info!(
            "Coordinator shutting down, draining {} active job(s)",
            self.inner.active.len()
        );
        self.inner.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = self
            .inner
            .jobs
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .task
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take()
            })
            .collect();
        let _ = futures::future::join_all(tasks).await;

        let connections: Vec<Arc<dyn DriverConnection>> = self
            .inner
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.inner.connections.clear();
        for connection in connections {
            let _ = connection.close().await;
        }
        log_info!("Coordinator stopped");
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(AppError::InternalError(
                "Coordinator is shut down".to_string(),
            ));
        }
        Ok(())
    }

    fn job_entry(&self, job_id: JobId) -> AppResult<Arc<JobEntry>> {
        self.inner
            .jobs
            .get(&job_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AppError::UnknownJob(format!("No job {}", job_id)))
    }
}

impl Default for ImportCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl Inner {
    async fn provision(&self, config: &ConnectionConfig) -> AppResult<Arc<dyn DriverConnection>> {
        let driver = self.drivers.get(config.driver)?;
        let connection = driver.connect(config).await?;
        if !config.schema.is_empty() {
            if let Err(e) = connection.apply_schema(&config.schema).await {
                let _ = connection.close().await;
                return Err(e);
            }
        }
        Ok(connection)
    }

    async fn connection_for(
        &self,
        handle: ConfigHandle,
        config: &ConnectionConfig,
    ) -> AppResult<Arc<dyn DriverConnection>> {
        if let Some(existing) = self.connections.get(&handle) {
            return Ok(Arc::clone(existing.value()));
        }
        let driver = self.drivers.get(config.driver)?;
        let connection = driver.connect(config).await?;
        self.connections.insert(handle, Arc::clone(&connection));
        Ok(connection)
    }

    async fn run_job(
        inner: Arc<Inner>,
        entry: Arc<JobEntry>,
        runner: ImportRunner,
        source: ImportSource,
        deadline: Option<Instant>,
    ) {
        let job = Arc::clone(&entry.state);
        let outcome = AssertUnwindSafe(runner.run(
            Arc::clone(&job),
            &source,
            entry.cancel.clone(),
            deadline,
        ))
        .catch_unwind()
        .await;

        let (status, error, summary) = match outcome {
            Ok(Ok(summary)) => (JobStatus::Succeeded, None, Some(summary)),
            Ok(Err(e)) => match e {
                AppError::Cancelled(_) => (JobStatus::Cancelled, Some(e), None),
                other => (JobStatus::Failed, Some(other), None),
            },
            Err(_) => (
                JobStatus::Failed,
                Some(AppError::InternalError(format!(
                    "{} import task panicked",
                    job.job_id
                ))),
                None,
            ),
        };

        if job.finish(status, error.clone(), summary.clone()) {
            match status {
                JobStatus::Succeeded => {
                    if let Some(summary) = &summary {
                        log_info!("{}: {}", job.job_id, summary.message());
                    }
                }
                JobStatus::Cancelled => {
                    log_info!(
                        "{} cancelled with {} committed row(s)",
                        job.job_id,
                        job.rows_committed()
                    );
                }
                _ => {
                    if let Some(e) = &error {
                        LogContext::error_with_context(e, &format!("{} failed", job.job_id));
                    }
                }
            }
            inner.reporter.publish(TerminalResult {
                job_id: job.job_id,
                status,
                summary,
                error,
                checkpoint: job.checkpoint(),
                finished_at: Utc::now(),
            });
        }
        inner
            .active
            .remove_if(&job.handle, |_, active| *active == job.job_id);
    }
}
