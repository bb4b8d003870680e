//! Background job system for long-running scrape tasks.
//!
//! Provides:
//! - `JobRegistry`: at most one live execution per job key; start/attach,
//!   snapshot and cancel
//! - `JobState`: the authoritative record of one execution
//! - `JobContext`: progress reporting and cooperative cancellation for work
//! - wire types (`JobSnapshot`, `StartResponse`, `CancelResponse`)

pub mod registry;
pub mod runner;
pub mod state;
pub mod types;

pub use registry::{JobRegistry, RegistryConfig};
pub use runner::JobContext;
pub use state::JobState;
pub use types::{
    CancelResponse, ExecutionId, JobCompletion, JobError, JobKey, JobResult, JobSnapshot,
    JobStatus, StartOutcome, StartResponse, StartStatus,
};
