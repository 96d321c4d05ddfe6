/// Import job lifecycle types.
///
/// A job moves `Pending -> Running -> {Succeeded, Failed, Cancelled}`.
/// Terminal states are sticky: once a job finishes, later transitions are
/// ignored so every observer sees the same outcome. Progress counters only
/// ever grow and are advanced strictly at chunk commit, so a snapshot never
/// reports rows that are not durably visible in the target database.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::modules::config::ConfigHandle;
use crate::shared::errors::AppError;

/// Monotonic job identifier, rendered as `job-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_prefix("job-").unwrap_or(s.trim());
        digits
            .parse::<u64>()
            .map(JobId)
            .map_err(|_| AppError::InvalidInput(format!("'{}' is not a job id", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(AppError::InvalidInput(format!(
                "Unknown job status: '{}'",
                other
            ))),
        }
    }
}

/// What to do when a record or chunk cannot be imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum OnErrorPolicy {
    /// Stop at the first bad record. Committed chunks stay in place.
    #[default]
    FailFast,
    /// Skip bad records (or a whole chunk if its commit fails) and keep
    /// going; the summary reports what was skipped.
    SkipAndContinue,
}

/// Knobs accepted by `import_db`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportOptions {
    pub chunk_size: usize,
    pub on_error: OnErrorPolicy,
    /// Wall-clock budget for the whole job. `None` means no deadline.
    pub timeout_ms: Option<u64>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            chunk_size: 500,
            on_error: OnErrorPolicy::default(),
            timeout_ms: None,
        }
    }
}

/// Last fully committed chunk. A resumed or inspected job can trust that
/// everything up to and including this point is durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub chunk_index: u64,
    pub rows_committed: u64,
    /// Byte offset just past the last record of the committed chunk.
    pub source_offset: u64,
}

/// A chunk dropped in `SkipAndContinue` mode because its commit failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedChunk {
    pub table: String,
    pub chunk_index: u64,
    pub rows: u64,
    pub error: String,
}

/// Final accounting of a finished import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub rows_imported: u64,
    pub rows_skipped: u64,
    pub tables: Vec<String>,
    pub chunks_committed: u64,
    pub duration_ms: u64,
    pub skipped_chunks: Vec<SkippedChunk>,
}

impl ImportSummary {
    pub fn message(&self) -> String {
        format!(
            "Inserted {} rows in {} tables",
            self.rows_imported,
            self.tables.len()
        )
    }
}

/// Point-in-time view of a job, safe to hand out while it runs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub handle: ConfigHandle,
    pub status: JobStatus,
    pub rows_read: u64,
    pub rows_committed: u64,
    pub rows_skipped: u64,
    pub chunks_committed: u64,
    pub current_table: Option<String>,
    pub checkpoint: Option<Checkpoint>,
    pub error: Option<AppError>,
    pub summary: Option<ImportSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Shared mutable state of a running job. The pipeline writes it, the
/// gateway reads it through [`JobState::snapshot`].
#[derive(Debug)]
pub struct JobState {
    pub job_id: JobId,
    pub handle: ConfigHandle,
    started_at: DateTime<Utc>,
    status: RwLock<JobStatus>,
    rows_read: AtomicU64,
    rows_committed: AtomicU64,
    rows_skipped: AtomicU64,
    chunks_committed: AtomicU64,
    current_table: RwLock<Option<String>>,
    checkpoint: RwLock<Option<Checkpoint>>,
    error: RwLock<Option<AppError>>,
    summary: RwLock<Option<ImportSummary>>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
}

impl JobState {
    pub fn new(job_id: JobId, handle: ConfigHandle) -> Self {
        JobState {
            job_id,
            handle,
            started_at: Utc::now(),
            status: RwLock::new(JobStatus::Pending),
            rows_read: AtomicU64::new(0),
            rows_committed: AtomicU64::new(0),
            rows_skipped: AtomicU64::new(0),
            chunks_committed: AtomicU64::new(0),
            current_table: RwLock::new(None),
            checkpoint: RwLock::new(None),
            error: RwLock::new(None),
            summary: RwLock::new(None),
            finished_at: RwLock::new(None),
        }
    }

    pub fn status(&self) -> JobStatus {
        *self.status.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mark_running(&self) {
        let mut status = self.status.write().unwrap_or_else(|e| e.into_inner());
        if *status == JobStatus::Pending {
            *status = JobStatus::Running;
        }
    }

    pub fn set_current_table(&self, table: &str) {
        let mut current = self
            .current_table
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *current = Some(table.to_string());
    }

    pub fn add_rows_read(&self, rows: u64) {
        self.rows_read.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn add_rows_skipped(&self, rows: u64) {
        self.rows_skipped.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn rows_committed(&self) -> u64 {
        self.rows_committed.load(Ordering::Acquire)
    }

    pub fn checkpoint(&self) -> Option<Checkpoint> {
        *self.checkpoint.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Advance progress after a chunk transaction committed. The checkpoint
    /// and the counters move together.
    pub fn record_committed_chunk(&self, rows: u64, checkpoint: Checkpoint) {
        self.rows_committed.fetch_add(rows, Ordering::AcqRel);
        self.chunks_committed.fetch_add(1, Ordering::AcqRel);
        let mut slot = self.checkpoint.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(checkpoint);
    }

    /// Move the job into a terminal state. The first caller wins; later
    /// calls return `false` and change nothing.
    pub fn finish(
        &self,
        status: JobStatus,
        error: Option<AppError>,
        summary: Option<ImportSummary>,
    ) -> bool {
        debug_assert!(status.is_terminal());
        let mut current = self.status.write().unwrap_or_else(|e| e.into_inner());
        if current.is_terminal() {
            return false;
        }
        *current = status;

        *self.error.write().unwrap_or_else(|e| e.into_inner()) = error;
        *self.summary.write().unwrap_or_else(|e| e.into_inner()) = summary;
        *self.finished_at.write().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        true
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id,
            handle: self.handle,
            status: self.status(),
            rows_read: self.rows_read.load(Ordering::Relaxed),
            rows_committed: self.rows_committed.load(Ordering::Acquire),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            chunks_committed: self.chunks_committed.load(Ordering::Acquire),
            current_table: self
                .current_table
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            checkpoint: *self.checkpoint.read().unwrap_or_else(|e| e.into_inner()),
            error: self.error.read().unwrap_or_else(|e| e.into_inner()).clone(),
            summary: self.summary.read().unwrap_or_else(|e| e.into_inner()).clone(),
            started_at: self.started_at,
            finished_at: *self.finished_at.read().unwrap_or_else(|e| e.into_inner()),
        }
    }
}
