//! Drive one job key to a terminal state from the caller's side.
//!
//! The client moves `NotStarted → Starting → Polling → Done`. It starts (or
//! attaches to) the job, then fetches a snapshot every `interval` until one
//! carries a result. Cancelling only sends the request; the loop keeps
//! polling until the server reports the job's terminal state.
//!
//! Polls ask for the client's own execution by id, so a newer start by
//! another caller between two polls does not hide this execution's result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use scrape_hub_server_jobs::{
    ExecutionId, JobResult, JobSnapshot, JobStatus, StartResponse, StartStatus,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::JobApi;
use crate::error::{ApiCallError, ClientError};

/// Polling tunables.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Start is idempotent, so transient start failures are retried this
    /// many times in total.
    pub max_start_attempts: u32,
    /// Upper bound for the doubling delay between start attempts.
    pub max_start_delay: Duration,
    /// Send a cancel request once this much time has passed since start.
    pub cancel_after: Option<Duration>,
    /// Give up with `ClientError::Unreachable` after this many transient
    /// failures in a row. `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_start_attempts: 3,
            max_start_delay: Duration::from_secs(10),
            cancel_after: None,
            max_consecutive_failures: Some(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    NotStarted,
    Starting,
    Polling,
    Done,
}

/// What the caller sees while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// This client's start spawned a new execution.
    Started(JobSnapshot),
    /// An execution was already live; this client follows it.
    Attached(JobSnapshot),
    /// Non-terminal snapshot, one per successful poll.
    Progress { percent: u8, message: String },
    CancelRequested { acknowledged: bool },
    Completed {
        count: u64,
        metrics: BTreeMap<String, u64>,
    },
    Failed { error: String },
    Cancelled { percent: u8, message: String },
}

impl JobEvent {
    /// Event for a snapshot that carries a result.
    fn terminal(snapshot: &JobSnapshot) -> Option<Self> {
        Some(match snapshot.result.as_ref()? {
            JobResult::Completed { count, metrics } => Self::Completed {
                count: *count,
                metrics: metrics.clone(),
            },
            JobResult::Failed { error } => Self::Failed {
                error: error.clone(),
            },
            JobResult::Cancelled => Self::Cancelled {
                percent: snapshot.percent,
                message: snapshot.message.clone(),
            },
        })
    }
}

/// Caller-side cancel trigger for a running poll.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Follows one job key. Create one per observer; several clients may watch
/// the same key at once.
pub struct PollingClient {
    api: Arc<dyn JobApi>,
    config: PollConfig,
    phase: ClientPhase,
}

impl PollingClient {
    pub fn new(api: Arc<dyn JobApi>, config: PollConfig) -> Self {
        Self {
            api,
            config,
            phase: ClientPhase::NotStarted,
        }
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    fn enter(&mut self, phase: ClientPhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "Polling client phase");
        self.phase = phase;
    }

    /// Start or attach to `key` and poll until its terminal snapshot.
    ///
    /// Returns the terminal snapshot for completed, failed and cancelled
    /// jobs alike; `on_event` tells them apart.
    pub async fn run<F>(
        &mut self,
        key: &str,
        cancel: CancelHandle,
        mut on_event: F,
    ) -> Result<JobSnapshot, ClientError>
    where
        F: FnMut(&JobEvent),
    {
        let result = self.drive(key, &cancel, &mut on_event).await;
        self.enter(ClientPhase::Done);
        result
    }

    async fn drive<F>(
        &mut self,
        key: &str,
        cancel: &CancelHandle,
        on_event: &mut F,
    ) -> Result<JobSnapshot, ClientError>
    where
        F: FnMut(&JobEvent),
    {
        self.enter(ClientPhase::Starting);
        let started = self.start_with_retry(key).await?;
        let execution_id = started.snapshot.execution_id;
        match started.status {
            StartStatus::Started => on_event(&JobEvent::Started(started.snapshot.clone())),
            StartStatus::AlreadyRunning => on_event(&JobEvent::Attached(started.snapshot.clone())),
        }
        if let Some(event) = JobEvent::terminal(&started.snapshot) {
            on_event(&event);
            return Ok(started.snapshot);
        }

        self.enter(ClientPhase::Polling);
        let deadline = self.config.cancel_after.map(|d| Instant::now() + d);
        let mut cancel_wanted = cancel.is_cancelled();
        let mut cancel_sent = false;
        let mut failures = 0u32;

        loop {
            if cancel_wanted {
                tokio::time::sleep(self.config.interval).await;
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.interval) => {}
                    _ = cancel.token.cancelled() => cancel_wanted = true,
                    _ = until(deadline) => {
                        tracing::info!(key, "Cancel deadline reached");
                        cancel_wanted = true;
                    }
                }
            }

            if cancel_wanted && !cancel_sent {
                match self.api.request_cancel(key).await {
                    Ok(resp) => {
                        cancel_sent = true;
                        on_event(&JobEvent::CancelRequested {
                            acknowledged: resp.acknowledged,
                        });
                    }
                    Err(e) => self.tolerate(key, e, &mut failures)?,
                }
            }

            let snapshot = match self.api.snapshot(key, execution_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    self.tolerate(key, e, &mut failures)?;
                    continue;
                }
            };
            failures = 0;

            if snapshot.state == JobStatus::Idle || snapshot.execution_id != execution_id {
                return Err(lost(key, execution_id));
            }
            if let Some(event) = JobEvent::terminal(&snapshot) {
                on_event(&event);
                return Ok(snapshot);
            }
            on_event(&JobEvent::Progress {
                percent: snapshot.percent,
                message: snapshot.message.clone(),
            });
        }
    }

    /// Count a failed call. Transient errors are swallowed until the
    /// consecutive-failure bound is hit.
    fn tolerate(&self, key: &str, err: ApiCallError, failures: &mut u32) -> Result<(), ClientError> {
        if !err.is_transient() {
            return Err(ClientError::Rejected(err));
        }
        *failures += 1;
        tracing::warn!(key, failures = *failures, error = %err, "Poll failed, retrying");
        match self.config.max_consecutive_failures {
            Some(max) if *failures >= max => Err(ClientError::Unreachable {
                failures: *failures,
                last: err,
            }),
            _ => Ok(()),
        }
    }

    async fn start_with_retry(&self, key: &str) -> Result<StartResponse, ClientError> {
        let attempts = self.config.max_start_attempts.max(1);
        let mut delay = self.config.interval;
        let mut attempt = 1;
        loop {
            match self.api.start(key).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!(key, attempt, delay_ms = delay.as_millis() as u64, error = %e, "Start failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = next_start_delay(delay, self.config.max_start_delay);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ClientError::Start {
                        key: key.to_string(),
                        source: e,
                    })
                }
            }
        }
    }
}

/// Double `delay`, capped at `max`.
fn next_start_delay(delay: Duration, max: Duration) -> Duration {
    delay.saturating_mul(2).min(max)
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn lost(key: &str, execution_id: Option<ExecutionId>) -> ClientError {
    tracing::warn!(key, execution_id = ?execution_id, "Job record vanished before reaching a terminal state");
    ClientError::Lost {
        key: key.to_string(),
        execution_id,
    }
}
