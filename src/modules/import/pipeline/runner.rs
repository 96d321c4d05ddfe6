/// The chunked import loop.
///
/// One runner executes one job: it resolves the source into units, reads
/// each unit in chunks of `chunk_size` records, maps them onto the target
/// layout and commits each chunk in its own transaction. Cancellation and
/// the deadline are only honored between chunks, so a chunk is never left
/// half-written; whatever was committed before the stop stays committed.
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::modules::driver::DriverConnection;
use crate::modules::import::domain::{
    Checkpoint, ImportOptions, ImportSource, ImportSummary, JobState, OnErrorPolicy, SkippedChunk,
    SourceUnit,
};
use crate::modules::import::pipeline::reader::{self, Record, RecordReader};
use crate::modules::schema::{RowMapper, SchemaSet};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::logger::{LogContext, TimedOperation};
use crate::shared::utils::{RetryPolicy, Validator};
use crate::{log_info, log_warn};

pub struct ImportRunner {
    connection: Arc<dyn DriverConnection>,
    schema: SchemaSet,
    options: ImportOptions,
    retry: RetryPolicy,
}

impl ImportRunner {
    pub fn new(
        connection: Arc<dyn DriverConnection>,
        schema: SchemaSet,
        options: ImportOptions,
    ) -> Self {
        ImportRunner {
            connection,
            schema,
            options,
            retry: RetryPolicy::source_read(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run the import to completion. Cancellation and timeout surface as
    /// `Cancelled` / `Timeout` errors; the caller turns the result into the
    /// job's terminal state.
    pub async fn run(
        &self,
        job: Arc<JobState>,
        source: &ImportSource,
        cancel: CancellationToken,
        deadline: Option<Instant>,
    ) -> AppResult<ImportSummary> {
        let timer = TimedOperation::new("import_pipeline");
        let started = Instant::now();
        job.mark_running();

        let units = self
            .with_source_retry(&cancel, "resolve source", || source.resolve())
            .await?;
        log_info!(
            "{}: importing {} source unit(s)",
            job.job_id,
            units.len()
        );

        let mut tables: Vec<String> = Vec::new();
        let mut skipped_chunks: Vec<SkippedChunk> = Vec::new();
        let mut chunk_index = 0u64;

        for unit in &units {
            self.check_boundary(&job, &cancel, deadline)?;
            job.set_current_table(&unit.table);

            let mut reader = self
                .with_source_retry(&cancel, "open source", || reader::open(unit))
                .await?;

            let mut pending = self.read_chunk(&job, &cancel, reader.as_mut()).await?;
            if pending.is_empty() {
                log_info!("{}: source '{}' is empty", job.job_id, unit.path.display());
                continue;
            }
            let mut source_offset = reader.position();

            let mapper = self.mapper_for(unit, &pending).await?;
            let mut committed_any = false;

            loop {
                self.check_boundary(&job, &cancel, deadline)?;
                let committed = self
                    .commit_chunk(
                        &job,
                        &mapper,
                        unit,
                        std::mem::take(&mut pending),
                        chunk_index,
                        source_offset,
                        &mut skipped_chunks,
                    )
                    .await?;
                committed_any |= committed;
                chunk_index += 1;

                self.check_boundary(&job, &cancel, deadline)?;
                pending = self.read_chunk(&job, &cancel, reader.as_mut()).await?;
                if pending.is_empty() {
                    break;
                }
                source_offset = reader.position();
            }

            if committed_any {
                tables.push(unit.table.clone());
            }
        }

        let snapshot = job.snapshot();
        let summary = ImportSummary {
            rows_imported: snapshot.rows_committed,
            rows_skipped: snapshot.rows_skipped,
            tables,
            chunks_committed: snapshot.chunks_committed,
            duration_ms: started.elapsed().as_millis() as u64,
            skipped_chunks,
        };
        timer.finish_with_info(&summary.message());
        Ok(summary)
    }

    /// Timeout is checked before cancellation so a job that ran out of time
    /// reports `Timeout` even when both happened.
    fn check_boundary(
        &self,
        job: &JobState,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> AppResult<()> {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(AppError::Timeout(format!(
                    "{} exceeded its time budget",
                    job.job_id
                )));
            }
        }
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(format!("{} was cancelled", job.job_id)));
        }
        Ok(())
    }

    async fn mapper_for(&self, unit: &SourceUnit, sample: &[Record]) -> AppResult<RowMapper> {
        if let Some(table) = self.schema.table(&unit.table) {
            // Configured tables were provisioned when the config was
            // accepted.
            return Ok(RowMapper::from_schema(table));
        }

        let fields: Vec<_> = sample.iter().map(|r| r.fields.clone()).collect();
        let mapper = RowMapper::dynamic(&unit.table, &fields);
        for column in &mapper.layout().columns {
            Validator::validate_identifier(column, "Source field")?;
        }
        self.connection.ensure_table(mapper.layout()).await?;
        Ok(mapper)
    }

    /// Read up to one chunk of records. Unparseable records fail the job
    /// under `FailFast` and are counted and skipped under
    /// `SkipAndContinue`; unreadable sources are retried with backoff
    /// before giving up.
    async fn read_chunk(
        &self,
        job: &JobState,
        cancel: &CancellationToken,
        reader: &mut dyn RecordReader,
    ) -> AppResult<Vec<Record>> {
        let mut records = Vec::with_capacity(self.options.chunk_size);
        let mut attempts = 0u32;

        while records.len() < self.options.chunk_size {
            match reader.next_record() {
                Ok(Some(record)) => {
                    attempts = 0;
                    job.add_rows_read(1);
                    records.push(record);
                }
                Ok(None) => break,
                Err(AppError::ParseError { offset, message })
                    if self.options.on_error == OnErrorPolicy::SkipAndContinue =>
                {
                    job.add_rows_skipped(1);
                    log_warn!(
                        "{}: skipping unparseable record at offset {}: {}",
                        job.job_id,
                        offset,
                        message
                    );
                }
                Err(AppError::SourceUnavailable(message)) => {
                    if attempts >= self.retry.max_retries {
                        return Err(AppError::SourceUnavailable(message));
                    }
                    attempts += 1;
                    let delay = self.retry.calculate_delay(attempts);
                    log_warn!(
                        "{}: source read failed (attempt {}/{}): {}",
                        job.job_id,
                        attempts,
                        self.retry.max_retries,
                        message
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(AppError::Cancelled(format!(
                                "{} was cancelled",
                                job.job_id
                            )))
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    /// Map and commit one chunk. Returns whether anything was written.
    #[allow(clippy::too_many_arguments)]
    async fn commit_chunk(
        &self,
        job: &JobState,
        mapper: &RowMapper,
        unit: &SourceUnit,
        records: Vec<Record>,
        chunk_index: u64,
        source_offset: u64,
        skipped_chunks: &mut Vec<SkippedChunk>,
    ) -> AppResult<bool> {
        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            match mapper.map(&record.fields) {
                Ok(row) => rows.push(row),
                Err(message) => match self.options.on_error {
                    OnErrorPolicy::FailFast => {
                        return Err(AppError::parse_at(record.offset, message))
                    }
                    OnErrorPolicy::SkipAndContinue => {
                        job.add_rows_skipped(1);
                        log_warn!(
                            "{}: skipping record at offset {}: {}",
                            job.job_id,
                            record.offset,
                            message
                        );
                    }
                },
            }
        }
        if rows.is_empty() {
            return Ok(false);
        }

        let row_count = rows.len() as u64;
        match self.connection.write_chunk(mapper.layout(), &rows).await {
            Ok(written) => {
                job.record_committed_chunk(
                    written,
                    Checkpoint {
                        chunk_index,
                        rows_committed: job.rows_committed() + written,
                        source_offset,
                    },
                );
                LogContext::chunk_committed(
                    &job.job_id.to_string(),
                    chunk_index,
                    job.rows_committed(),
                );
                Ok(true)
            }
            Err(e) if self.options.on_error == OnErrorPolicy::SkipAndContinue => {
                job.add_rows_skipped(row_count);
                log_warn!(
                    "{}: chunk {} for '{}' failed and was skipped: {}",
                    job.job_id,
                    chunk_index,
                    unit.table,
                    e
                );
                skipped_chunks.push(SkippedChunk {
                    table: unit.table.clone(),
                    chunk_index,
                    rows: row_count,
                    error: e.to_string(),
                });
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn with_source_retry<T>(
        &self,
        cancel: &CancellationToken,
        what: &str,
        mut op: impl FnMut() -> AppResult<T>,
    ) -> AppResult<T> {
        let mut attempts = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(AppError::SourceUnavailable(message)) => {
                    if attempts >= self.retry.max_retries {
                        return Err(AppError::SourceUnavailable(message));
                    }
                    attempts += 1;
                    let delay = self.retry.calculate_delay(attempts);
                    log_warn!(
                        "Failed to {} (attempt {}/{}): {}",
                        what,
                        attempts,
                        self.retry.max_retries,
                        message
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(AppError::Cancelled("Import was cancelled".to_string()))
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
