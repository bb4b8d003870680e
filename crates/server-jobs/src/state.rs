//! Authoritative state for a single job execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::types::{ExecutionId, JobKey, JobResult, JobSnapshot, JobStatus};

/// Mutable fields of a record. Always read and written as a unit.
#[derive(Debug, Clone)]
struct Record {
    status: JobStatus,
    percent: u8,
    message: String,
    result: Option<JobResult>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

/// State for one execution of a job key.
///
/// Fields live behind a single `RwLock` held only for the copy or the
/// assignment, never across an `.await`. Readers therefore always see a
/// percent and message that were written together, and never wait on the
/// work itself. Each change is broadcast while the write guard is held, so
/// subscribers receive snapshots in the order they were written.
pub struct JobState {
    key: JobKey,
    execution_id: ExecutionId,
    record: RwLock<Record>,
    cancel: CancellationToken,
    deadline_exceeded: AtomicBool,
    progress_tx: broadcast::Sender<JobSnapshot>,
}

impl JobState {
    /// Create a record in `Running` state. Every change is published on
    /// `progress_tx`.
    pub fn new(
        key: JobKey,
        execution_id: ExecutionId,
        progress_tx: broadcast::Sender<JobSnapshot>,
    ) -> Self {
        Self {
            key,
            execution_id,
            record: RwLock::new(Record {
                status: JobStatus::Running,
                percent: 0,
                message: "Starting".to_string(),
                result: None,
                started_at: Utc::now(),
                ended_at: None,
            }),
            cancel: CancellationToken::new(),
            deadline_exceeded: AtomicBool::new(false),
            progress_tx,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn status(&self) -> JobStatus {
        self.read(|r| r.status).unwrap_or(JobStatus::Failed)
    }

    pub fn is_live(&self) -> bool {
        self.status().is_live()
    }

    /// When the record became terminal, if it has.
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.read(|r| r.ended_at).flatten()
    }

    /// Update percent and message together.
    ///
    /// Ignored once terminal. Percent is clamped to 100 and never moves
    /// backwards. Returns whether the update was applied.
    pub fn report(&self, percent: u8, message: impl Into<String>) -> bool {
        let message = message.into();
        let applied = self.write(|r| {
            if r.status.is_terminal() {
                return false;
            }
            r.percent = r.percent.max(percent.min(100));
            r.message = message;
            self.publish(r);
            true
        });
        applied == Some(true)
    }

    /// Move `Running` to `CancelRequested` and trip the cancellation token.
    ///
    /// Returns true while the record is live (repeat requests are
    /// acknowledged), false once it is terminal.
    pub fn request_cancel(&self) -> bool {
        let transition = self.write(|r| match r.status {
            JobStatus::Running => {
                r.status = JobStatus::CancelRequested;
                self.publish(r);
                Some(true)
            }
            JobStatus::CancelRequested => Some(false),
            _ => None,
        });
        match transition.flatten() {
            Some(changed) => {
                self.cancel.cancel();
                if changed {
                    tracing::info!(key = %self.key, execution_id = self.execution_id, "Cancellation requested");
                }
                true
            }
            None => false,
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Trip the cancellation token because the runtime limit was hit. The
    /// status stays as it is; the runner decides the terminal result.
    pub(crate) fn expire(&self) {
        self.deadline_exceeded.store(true, Ordering::Release);
        self.cancel.cancel();
    }

    /// Whether the runtime watchdog has fired for this execution.
    pub fn is_deadline_exceeded(&self) -> bool {
        self.deadline_exceeded.load(Ordering::Acquire)
    }

    /// Set the terminal state. Only the first call has any effect; percent
    /// is left where the work last put it.
    pub(crate) fn finish(&self, result: JobResult) -> bool {
        let status = result.status();
        let applied = self.write(|r| {
            if r.status.is_terminal() {
                return false;
            }
            r.status = status;
            r.result = Some(result);
            r.ended_at = Some(Utc::now());
            self.publish(r);
            true
        });
        applied == Some(true)
    }

    /// Subscribe to progress updates for this execution only.
    pub fn subscribe(&self) -> broadcast::Receiver<JobSnapshot> {
        self.progress_tx.subscribe()
    }

    /// Copy the current state.
    pub fn snapshot(&self) -> JobSnapshot {
        match self.record.read() {
            Ok(r) => self.to_snapshot(&r),
            Err(e) => {
                tracing::error!("RwLock poisoned reading job record: {e}");
                let r = e.into_inner();
                self.to_snapshot(&r)
            }
        }
    }

    fn to_snapshot(&self, r: &Record) -> JobSnapshot {
        JobSnapshot {
            key: self.key.clone(),
            execution_id: Some(self.execution_id),
            state: r.status,
            percent: r.percent,
            message: r.message.clone(),
            result: r.result.clone(),
            started_at: Some(r.started_at),
            ended_at: r.ended_at,
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Record) -> T) -> Option<T> {
        match self.record.read() {
            Ok(guard) => Some(f(&guard)),
            Err(e) => {
                tracing::error!("RwLock poisoned reading job record: {e}");
                None
            }
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut Record) -> T) -> Option<T> {
        match self.record.write() {
            Ok(mut guard) => Some(f(&mut guard)),
            Err(e) => {
                tracing::error!("RwLock poisoned writing job record: {e}");
                None
            }
        }
    }

    /// Broadcast `r`. Called with the write guard held; `send` never blocks.
    fn publish(&self, r: &Record) {
        // No subscribers is fine.
        let _ = self.progress_tx.send(self.to_snapshot(r));
    }
}
