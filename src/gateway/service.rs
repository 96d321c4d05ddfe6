/// The request gateway.
///
/// Single entry point hosts talk to: it validates and parses wire requests,
/// dispatches to the coordinator and maps domain results back into
/// serializable responses. All state lives in the coordinator; the gateway
/// itself is a thin, cloneable facade.
use crate::modules::config::{ConfigHandle, ConnectionConfig, Credentials, DriverKind};
use crate::modules::import::domain::{ImportSource, JobId};
use crate::modules::import::{CoordinatorConfig, ImportCoordinator};
use crate::modules::schema::SchemaSet;
use crate::shared::errors::AppResult;
use crate::log_debug;

use super::requests::{
    CancelImportResponse, ConfigDbRequest, ConfigDbResponse, ImportDbRequest, ImportDbResponse,
    ImportResultResponse, JobStatusResponse,
};

#[derive(Clone)]
pub struct RequestGateway {
    coordinator: ImportCoordinator,
}

impl RequestGateway {
    pub fn new(coordinator: ImportCoordinator) -> Self {
        RequestGateway { coordinator }
    }

    pub fn coordinator(&self) -> &ImportCoordinator {
        &self.coordinator
    }

    /// Accept a database config and hand back its handle.
    pub async fn config_db(&self, request: ConfigDbRequest) -> AppResult<ConfigDbResponse> {
        log_debug!(
            "config_db called for {} database '{}'",
            request.driver,
            request.locator
        );

        let driver: DriverKind = request.driver.parse()?;
        let mut config = ConnectionConfig::new(driver, request.locator);
        if let Some(secret) = request.credentials {
            if !secret.is_empty() {
                config = config.with_credentials(Credentials::new(secret));
            }
        }
        if let Some(pool_size) = request.pool_size {
            config = config.with_pool_size(pool_size);
        }
        if let Some(busy_timeout_ms) = request.busy_timeout_ms {
            config = config.with_busy_timeout_ms(busy_timeout_ms);
        }
        if let Some(schema_value) = &request.schema {
            config = config.with_schema(SchemaSet::from_config_value(schema_value)?);
        }

        let (handle, created) = self.coordinator.configure(config).await?;
        Ok(ConfigDbResponse {
            handle: handle.to_string(),
            created,
        })
    }

    /// Start an import job for a configured database.
    pub async fn import_db(&self, request: ImportDbRequest) -> AppResult<ImportDbResponse> {
        log_debug!(
            "import_db called for handle {} with source '{}'",
            request.handle,
            request.path
        );

        let handle = ConfigHandle::parse(&request.handle)?;
        let mut source = ImportSource::new(&request.path);
        source.format = request.format;
        source.table = request.table;

        let snapshot = self
            .coordinator
            .import(handle, source, request.options)
            .await?;
        Ok(ImportDbResponse {
            job_id: snapshot.job_id.to_string(),
            status: snapshot.status,
        })
    }

    /// Current snapshot of a job, running or finished.
    pub async fn get_import_status(&self, job_id: &str) -> AppResult<JobStatusResponse> {
        let job_id: JobId = job_id.parse()?;
        Ok(self.coordinator.status(job_id)?.into())
    }

    /// Ask a job to stop at its next chunk boundary.
    pub async fn cancel_import(&self, job_id: &str) -> AppResult<CancelImportResponse> {
        let job_id: JobId = job_id.parse()?;
        let snapshot = self.coordinator.cancel(job_id)?;
        Ok(CancelImportResponse {
            job_id: snapshot.job_id.to_string(),
            status: snapshot.status,
            rows_committed: snapshot.rows_committed,
        })
    }

    /// Await the job's terminal result. Safe to call repeatedly; every
    /// caller sees the same cached outcome.
    pub async fn wait_for_result(&self, job_id: &str) -> AppResult<ImportResultResponse> {
        let job_id: JobId = job_id.parse()?;
        let result = self.coordinator.wait_for_result(job_id).await?;
        Ok(result.into())
    }

    /// Drain running imports and close every database connection.
    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
    }
}

impl Default for RequestGateway {
    fn default() -> Self {
        Self::new(ImportCoordinator::new(CoordinatorConfig::default()))
    }
}
