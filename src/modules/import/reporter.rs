/// Terminal result delivery.
///
/// Every job gets exactly one terminal result. The first publish for a job
/// id wins and is cached; later publishes for the same job are dropped.
/// Observers either poll `get` or await `wait`, and both see the same
/// cached value no matter how often they ask.
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;

use crate::modules::import::domain::{Checkpoint, ImportSummary, JobId, JobStatus};
use crate::shared::errors::{AppError, AppResult};
use crate::{log_debug, log_info};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub summary: Option<ImportSummary>,
    pub error: Option<AppError>,
    /// Last committed chunk, kept on failures so callers can see how far
    /// the job got.
    pub checkpoint: Option<Checkpoint>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ResultReporter {
    results: DashMap<JobId, TerminalResult>,
    watchers: DashMap<JobId, watch::Sender<Option<TerminalResult>>>,
}

impl ResultReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a terminal result. Returns `true` when this call was the one
    /// that recorded it; duplicates are ignored.
    pub fn publish(&self, result: TerminalResult) -> bool {
        use dashmap::mapref::entry::Entry;

        let job_id = result.job_id;
        match self.results.entry(job_id) {
            Entry::Occupied(_) => {
                log_debug!("Ignoring duplicate terminal result for {}", job_id);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(result.clone());
                if let Some(sender) = self.watchers.get(&job_id) {
                    let _ = sender.send(Some(result.clone()));
                }
                log_info!("{} finished: {}", job_id, result.status);
                true
            }
        }
    }

    pub fn get(&self, job_id: JobId) -> Option<TerminalResult> {
        self.results.get(&job_id).map(|entry| entry.clone())
    }

    /// Subscribe to a job's terminal result. The receiver starts with the
    /// cached result when one already exists.
    pub fn subscribe(&self, job_id: JobId) -> watch::Receiver<Option<TerminalResult>> {
        let sender = self
            .watchers
            .entry(job_id)
            .or_insert_with(|| watch::channel(None).0)
            .clone();
        let receiver = sender.subscribe();
        // Re-check after registering so a publish that raced the entry
        // creation still reaches this receiver.
        if let Some(result) = self.get(job_id) {
            let _ = sender.send(Some(result));
        }
        receiver
    }

    /// Wait until the job has a terminal result.
    pub async fn wait(&self, job_id: JobId) -> AppResult<TerminalResult> {
        let mut receiver = self.subscribe(job_id);
        loop {
            if let Some(result) = receiver.borrow().clone() {
                return Ok(result);
            }
            receiver.changed().await.map_err(|_| {
                AppError::InternalError(format!("Result channel for {} closed", job_id))
            })?;
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
