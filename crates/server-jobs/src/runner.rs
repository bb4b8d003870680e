//! Execution wrapper around a job's work.
//!
//! The work is an async closure receiving a [`JobContext`]. It reports
//! progress through the context and calls [`JobContext::checkpoint`] at each
//! step boundary. Whatever it returns (or a panic, or the optional runtime
//! watchdog firing) is turned into exactly one terminal state.
//!
//! When the watchdog fires the work sees a cancellation, with
//! [`JobContext::is_deadline_exceeded`] set, and gets a grace period to
//! unwind before it is aborted. Either way the execution ends `Failed`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::state::JobState;
use super::types::{JobCompletion, JobError, JobResult};

/// Handle given to a job's work for reporting progress and observing
/// cancellation. Cheap to clone.
#[derive(Clone)]
pub struct JobContext {
    state: Arc<JobState>,
    cancel: CancellationToken,
}

impl JobContext {
    pub(crate) fn new(state: Arc<JobState>) -> Self {
        let cancel = state.cancellation_token();
        Self { state, cancel }
    }

    pub fn key(&self) -> &str {
        self.state.key()
    }

    /// Publish percent and message as one update.
    pub fn report(&self, percent: u8, message: impl Into<String>) {
        self.state.report(percent, message);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True when the cancellation came from the runtime watchdog rather
    /// than a caller. The execution will end `Failed` whatever the work
    /// returns.
    pub fn is_deadline_exceeded(&self) -> bool {
        self.state.is_deadline_exceeded()
    }

    /// Step boundary. Returns `Err(JobError::Cancelled)` once a cancel has
    /// been requested, so work can bail out with `?`.
    pub fn checkpoint(&self) -> Result<(), JobError> {
        if self.is_cancel_requested() {
            return Err(JobError::Cancelled);
        }
        Ok(())
    }

    /// Resolves when a cancel is requested. For racing long I/O in
    /// `tokio::select!`.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Runtime limit for one execution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Watchdog {
    pub max_runtime: Duration,
    /// How long the work may take to unwind after the limit before it is
    /// aborted.
    pub grace: Duration,
}

/// Spawn the work for `state` on its own task and drive it to a terminal
/// state.
pub(crate) fn spawn_execution<F, Fut>(state: Arc<JobState>, watchdog: Option<Watchdog>, work: F)
where
    F: FnOnce(JobContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<JobCompletion, JobError>> + Send + 'static,
{
    let ctx = JobContext::new(Arc::clone(&state));

    tokio::spawn(async move {
        let key = state.key().to_string();
        let execution_id = state.execution_id();
        tracing::info!(key = %key, execution_id, "Job started");

        // Inner task so a panic in the work surfaces as a JoinError
        // instead of leaving the record live forever.
        let mut handle = tokio::spawn(work(ctx));

        let joined = match watchdog {
            Some(Watchdog { max_runtime, grace }) => {
                match tokio::time::timeout(max_runtime, &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!(key = %key, execution_id, limit_ms = max_runtime.as_millis() as u64, "Job exceeded maximum runtime, cancelling");
                        state.expire();
                        if tokio::time::timeout(grace, &mut handle).await.is_err() {
                            handle.abort();
                            tracing::warn!(key = %key, execution_id, grace_ms = grace.as_millis() as u64, "Job did not stop within grace period, aborted");
                        }
                        state.finish(JobResult::Failed {
                            error: format!(
                                "job exceeded maximum runtime of {}s",
                                max_runtime.as_secs_f64()
                            ),
                        });
                        return;
                    }
                }
            }
            None => handle.await,
        };

        let result = match joined {
            Ok(Ok(completion)) => {
                tracing::info!(key = %key, execution_id, count = completion.count, "Job completed");
                JobResult::Completed {
                    count: completion.count,
                    metrics: completion.metrics,
                }
            }
            Ok(Err(JobError::Cancelled)) => {
                tracing::info!(key = %key, execution_id, "Job cancelled");
                JobResult::Cancelled
            }
            Ok(Err(JobError::Failed(error))) => {
                tracing::warn!(key = %key, execution_id, error = %error, "Job failed");
                JobResult::Failed { error }
            }
            Err(join_err) => {
                tracing::error!(key = %key, execution_id, error = %join_err, "Job task panicked");
                JobResult::Failed {
                    error: "job panicked".to_string(),
                }
            }
        };
        state.finish(result);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobStatus;
    use tokio::sync::broadcast;

    fn new_state() -> Arc<JobState> {
        let (tx, _) = broadcast::channel(64);
        Arc::new(JobState::new("test".to_string(), 1, tx))
    }

    async fn wait_terminal(state: &JobState) {
        let mut rx = state.subscribe();
        while !state.status().is_terminal() {
            let _ = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        }
    }

    #[tokio::test]
    async fn test_runner_complete() {
        let state = new_state();
        spawn_execution(Arc::clone(&state), None, |ctx| async move {
            for page in 1..=4u8 {
                ctx.checkpoint()?;
                ctx.report(page * 25, format!("page {page}"));
            }
            Ok(JobCompletion::new(37).with_metric("pages", 4))
        });

        wait_terminal(&state).await;
        let snap = state.snapshot();
        assert_eq!(snap.state, JobStatus::Completed);
        assert_eq!(snap.percent, 100);
        match snap.result {
            Some(JobResult::Completed { count, metrics }) => {
                assert_eq!(count, 37);
                assert_eq!(metrics.get("pages"), Some(&4));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_runner_failure_keeps_percent() {
        let state = new_state();
        spawn_execution(Arc::clone(&state), None, |ctx| async move {
            ctx.report(10, "page 1");
            Err(JobError::failed("upstream returned 503"))
        });

        wait_terminal(&state).await;
        let snap = state.snapshot();
        assert_eq!(snap.state, JobStatus::Failed);
        assert_eq!(snap.percent, 10);
        assert_eq!(
            snap.result,
            Some(JobResult::Failed {
                error: "upstream returned 503".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_runner_cancel_at_checkpoint() {
        let state = new_state();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        spawn_execution(Arc::clone(&state), None, |ctx| async move {
            ctx.report(40, "fetching page 3");
            let _ = release_rx.await;
            ctx.checkpoint()?;
            ctx.report(80, "never reached");
            Ok(JobCompletion::new(0))
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(state.request_cancel());
        assert_eq!(state.snapshot().state, JobStatus::CancelRequested);
        release_tx.send(()).unwrap();

        wait_terminal(&state).await;
        let snap = state.snapshot();
        assert_eq!(snap.state, JobStatus::Cancelled);
        assert_eq!(snap.result, Some(JobResult::Cancelled));
        assert_eq!(snap.percent, 40);
    }

    #[tokio::test]
    async fn test_runner_panic_becomes_failed() {
        let state = new_state();
        spawn_execution(Arc::clone(&state), None, |_ctx| async move {
            if true {
                panic!("extractor bug");
            }
            Ok(JobCompletion::new(0))
        });

        wait_terminal(&state).await;
        assert_eq!(state.status(), JobStatus::Failed);
    }

    fn watchdog(max_runtime_secs: u64, grace_secs: u64) -> Option<Watchdog> {
        Some(Watchdog {
            max_runtime: Duration::from_secs(max_runtime_secs),
            grace: Duration::from_secs(grace_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_max_runtime_aborts_stuck_work() {
        let state = new_state();
        spawn_execution(Arc::clone(&state), watchdog(5, 2), |_ctx| async move {
            std::future::pending::<()>().await;
            Ok(JobCompletion::new(0))
        });

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(state.status().is_live());
        tokio::time::sleep(Duration::from_secs(2)).await;
        wait_terminal(&state).await;
        let snap = state.snapshot();
        assert_eq!(snap.state, JobStatus::Failed);
        match snap.result {
            Some(JobResult::Failed { error }) => {
                assert_eq!(error, "job exceeded maximum runtime of 5s")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_max_runtime_lets_work_unwind() {
        let state = new_state();
        let (cleaned_tx, cleaned_rx) = tokio::sync::oneshot::channel::<bool>();
        spawn_execution(Arc::clone(&state), watchdog(5, 30), |ctx| async move {
            ctx.report(40, "fetching page 3");
            ctx.cancelled().await;
            let _ = cleaned_tx.send(ctx.is_deadline_exceeded());
            Err(JobError::Cancelled)
        });

        let saw_deadline = tokio::time::timeout(Duration::from_secs(10), cleaned_rx)
            .await
            .expect("work was not told about the deadline")
            .unwrap();
        assert!(saw_deadline);

        wait_terminal(&state).await;
        let snap = state.snapshot();
        assert_eq!(snap.state, JobStatus::Failed);
        assert_eq!(snap.percent, 40);
        assert!(state.is_deadline_exceeded());
    }

    #[tokio::test]
    async fn test_context_cancelled_future() {
        let state = new_state();
        let ctx = JobContext::new(Arc::clone(&state));
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.cancelled().await }
        });
        state.request_cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
        assert!(ctx.checkpoint().is_err());
    }
}
