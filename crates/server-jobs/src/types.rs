//! Types for the scrape job system.
//!
//! Everything here crosses the HTTP boundary: the server serializes these
//! and the polling client deserializes them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

/// Stable identifier for a class of job (one per data source).
pub type JobKey = String;

/// Identifier of one execution of a job key. Increases with every `start`.
pub type ExecutionId = u64;

/// Lifecycle state of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobStatus {
    /// No record exists for the key (never run, or evicted).
    Idle = 0,
    Running = 1,
    CancelRequested = 2,
    Completed = 3,
    Failed = 4,
    Cancelled = 5,
}

impl JobStatus {
    /// `Completed`, `Failed` and `Cancelled` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// A live record blocks new executions for its key.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::CancelRequested)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::CancelRequested => "cancel_requested",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Terminal payload of an execution. Present iff the state is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    Completed {
        #[ts(type = "number")]
        count: u64,
        #[serde(default)]
        #[ts(type = "Record<string, number>")]
        metrics: BTreeMap<String, u64>,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

impl JobResult {
    /// The terminal state this payload belongs to.
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
            Self::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// Immutable read of a job record at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub key: JobKey,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub execution_id: Option<ExecutionId>,
    pub state: JobStatus,
    pub percent: u8,
    pub message: String,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    /// The "no job" snapshot for a key that has never run or was evicted.
    pub fn idle(key: impl Into<JobKey>) -> Self {
        Self {
            key: key.into(),
            execution_id: None,
            state: JobStatus::Idle,
            percent: 0,
            message: String::new(),
            result: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Outcome of a start request, as returned by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new execution was spawned.
    Started(JobSnapshot),
    /// An execution is already live for the key; nothing was spawned.
    AlreadyRunning(JobSnapshot),
}

impl StartOutcome {
    pub fn snapshot(&self) -> &JobSnapshot {
        match self {
            Self::Started(s) | Self::AlreadyRunning(s) => s,
        }
    }

    pub fn status(&self) -> StartStatus {
        match self {
            Self::Started(_) => StartStatus::Started,
            Self::AlreadyRunning(_) => StartStatus::AlreadyRunning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    Started,
    AlreadyRunning,
}

/// Response body of the start endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
pub struct StartResponse {
    pub status: StartStatus,
    pub snapshot: JobSnapshot,
}

impl From<StartOutcome> for StartResponse {
    fn from(outcome: StartOutcome) -> Self {
        let status = outcome.status();
        let snapshot = match outcome {
            StartOutcome::Started(s) | StartOutcome::AlreadyRunning(s) => s,
        };
        Self { status, snapshot }
    }
}

/// Response body of the cancel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
pub struct CancelResponse {
    pub acknowledged: bool,
}

/// Successful output of a job's work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobCompletion {
    pub count: u64,
    pub metrics: BTreeMap<String, u64>,
}

impl JobCompletion {
    pub fn new(count: u64) -> Self {
        Self {
            count,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: u64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// Ways a job's work can end other than completing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Work stopped at a checkpoint after a cancel request. Not a failure.
    #[error("job cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

impl JobError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}
