pub mod coordinator;
pub mod domain;
pub mod pipeline;
pub mod reporter;

pub use coordinator::{CoordinatorConfig, ImportCoordinator};
pub use domain::{
    Checkpoint, ImportOptions, ImportSource, ImportSummary, JobId, JobSnapshot, JobStatus,
    OnErrorPolicy, SourceFormat,
};
pub use reporter::{ResultReporter, TerminalResult};
