pub mod job;
pub mod source;

pub use job::{
    Checkpoint, ImportOptions, ImportSummary, JobId, JobSnapshot, JobState, JobStatus,
    OnErrorPolicy, SkippedChunk,
};
pub use source::{ImportSource, SourceFormat, SourceUnit};
