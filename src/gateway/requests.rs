/// Wire-level request and response types for the gateway.
///
/// Requests carry plain strings for handles and job ids; the gateway parses
/// them and maps domain results back into serializable responses.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::modules::import::domain::{
    Checkpoint, ImportOptions, ImportSummary, JobSnapshot, JobStatus, SourceFormat,
};
use crate::modules::import::TerminalResult;
use crate::shared::errors::{AppError, ErrorKind};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDbRequest {
    pub driver: String,
    pub locator: String,
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default)]
    pub pool_size: Option<u32>,
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
    /// Table config in the `{ table: { column: {...} } }` shape.
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDbResponse {
    pub handle: String,
    /// `false` when an identical config had already been accepted and the
    /// original handle was reissued.
    pub created: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDbRequest {
    pub handle: String,
    pub path: String,
    #[serde(default)]
    pub format: Option<SourceFormat>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub options: ImportOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDbResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Serializable error as it appears inside responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_kind: ErrorKind,
    pub message: String,
    /// Source byte offset for parse failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl From<&AppError> for ErrorPayload {
    fn from(error: &AppError) -> Self {
        let offset = match error {
            AppError::ParseError { offset, .. } => Some(*offset),
            _ => None,
        };
        ErrorPayload {
            error_kind: error.kind(),
            message: error.to_string(),
            offset,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub handle: String,
    pub status: JobStatus,
    pub rows_read: u64,
    pub rows_committed: u64,
    pub rows_skipped: u64,
    pub chunks_committed: u64,
    pub current_table: Option<String>,
    pub checkpoint: Option<Checkpoint>,
    pub error: Option<ErrorPayload>,
    pub summary: Option<ImportSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<JobSnapshot> for JobStatusResponse {
    fn from(snapshot: JobSnapshot) -> Self {
        JobStatusResponse {
            job_id: snapshot.job_id.to_string(),
            handle: snapshot.handle.to_string(),
            status: snapshot.status,
            rows_read: snapshot.rows_read,
            rows_committed: snapshot.rows_committed,
            rows_skipped: snapshot.rows_skipped,
            chunks_committed: snapshot.chunks_committed,
            current_table: snapshot.current_table,
            checkpoint: snapshot.checkpoint,
            error: snapshot.error.as_ref().map(ErrorPayload::from),
            summary: snapshot.summary,
            started_at: snapshot.started_at,
            finished_at: snapshot.finished_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelImportResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub rows_committed: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResultResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub summary: Option<ImportSummary>,
    pub error: Option<ErrorPayload>,
    pub checkpoint: Option<Checkpoint>,
    pub finished_at: DateTime<Utc>,
}

impl From<TerminalResult> for ImportResultResponse {
    fn from(result: TerminalResult) -> Self {
        ImportResultResponse {
            job_id: result.job_id.to_string(),
            status: result.status,
            summary: result.summary,
            error: result.error.as_ref().map(ErrorPayload::from),
            checkpoint: result.checkpoint,
            finished_at: result.finished_at,
        }
    }
}
