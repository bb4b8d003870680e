//! Keyed registry enforcing at most one live execution per job key.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;

use super::runner::{spawn_execution, JobContext, Watchdog};
use super::state::JobState;
use super::types::{ExecutionId, JobCompletion, JobError, JobSnapshot, StartOutcome};

/// Superseded terminal snapshots kept per key, newest last.
const MAX_SUPERSEDED: usize = 8;

/// Tunables for the registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a terminal record stays observable before eviction. Also
    /// bounds how long a superseded execution stays readable by id.
    pub retention: Duration,
    /// Hard limit on a single execution. `None` means executions only end
    /// through their own work.
    pub max_runtime: Option<Duration>,
    /// Time a timed-out execution gets to unwind after its cancellation
    /// token trips, before its task is aborted.
    pub abort_grace: Duration,
    /// Capacity of the registry-wide progress broadcast.
    pub broadcast_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(600),
            max_runtime: None,
            abort_grace: Duration::from_secs(5),
            broadcast_capacity: 256,
        }
    }
}

/// Per-key critical section.
#[derive(Default)]
struct Slot {
    inner: Mutex<SlotInner>,
}

#[derive(Default)]
struct SlotInner {
    /// Latest execution for the key.
    current: Option<Arc<JobState>>,
    /// Terminal snapshots of executions replaced by a newer start, so a
    /// client that missed the end of its own execution can still read it.
    superseded: Vec<JobSnapshot>,
}

impl Slot {
    fn lock(&self) -> std::sync::MutexGuard<'_, SlotInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!("Mutex poisoned on job slot: {e}");
                e.into_inner()
            }
        }
    }
}

/// Central registry of scrape jobs.
///
/// Thread-safe via `Arc` wrapping. Start, snapshot and cancel for one key
/// serialize on that key's slot mutex; different keys never contend.
pub struct JobRegistry {
    next_id: AtomicU64,
    slots: DashMap<String, Arc<Slot>>,
    global_tx: broadcast::Sender<JobSnapshot>,
    config: RegistryConfig,
}

impl JobRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let (global_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            next_id: AtomicU64::new(1),
            slots: DashMap::new(),
            global_tx,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(&slot);
        }
        Arc::clone(&self.slots.entry(key.to_string()).or_default())
    }

    /// Start an execution for `key`, or attach to the live one.
    ///
    /// When a record for `key` is `Running` or `CancelRequested` nothing is
    /// spawned and the live snapshot is returned. Otherwise any terminal
    /// record is superseded (its snapshot stays readable through
    /// [`JobRegistry::snapshot_of`] for the retention window), a new record
    /// is created in `Running` state and `work` is spawned on its own task.
    pub fn start<F, Fut>(&self, key: &str, work: F) -> StartOutcome
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<JobCompletion, JobError>> + Send + 'static,
    {
        let slot = self.slot(key);
        let mut inner = slot.lock();

        if let Some(live) = inner.current.as_ref().filter(|s| s.is_live()) {
            tracing::debug!(key, execution_id = live.execution_id(), "Start attached to live job");
            return StartOutcome::AlreadyRunning(live.snapshot());
        }

        if let Some(previous) = inner.current.take() {
            inner.superseded.push(previous.snapshot());
            let excess = inner.superseded.len().saturating_sub(MAX_SUPERSEDED);
            inner.superseded.drain(..excess);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(JobState::new(key.to_string(), id, self.global_tx.clone()));
        inner.current = Some(Arc::clone(&state));
        let snapshot = state.snapshot();
        let _ = self.global_tx.send(snapshot.clone());

        let watchdog = self.config.max_runtime.map(|max_runtime| Watchdog {
            max_runtime,
            grace: self.config.abort_grace,
        });
        spawn_execution(state, watchdog, work);
        StartOutcome::Started(snapshot)
    }

    /// Current snapshot for `key`, or `None` if it never ran or was evicted.
    pub fn snapshot(&self, key: &str) -> Option<JobSnapshot> {
        let slot = self.slots.get(key).map(|s| Arc::clone(&s))?;
        let current = slot.lock().current.clone();
        current.map(|s| s.snapshot())
    }

    /// Snapshot of one specific execution of `key`.
    ///
    /// Finds the current record or a superseded terminal one. `None` once
    /// the execution is unknown or has been evicted.
    pub fn snapshot_of(&self, key: &str, execution_id: ExecutionId) -> Option<JobSnapshot> {
        let slot = self.slots.get(key).map(|s| Arc::clone(&s))?;
        let inner = slot.lock();
        if let Some(state) = inner
            .current
            .as_ref()
            .filter(|s| s.execution_id() == execution_id)
        {
            return Some(state.snapshot());
        }
        inner
            .superseded
            .iter()
            .rev()
            .find(|snap| snap.execution_id == Some(execution_id))
            .cloned()
    }

    /// Ask the live execution for `key` to stop. Advisory: the work decides
    /// when it is safe to stop. Returns false when nothing is live.
    pub fn request_cancel(&self, key: &str) -> bool {
        let Some(slot) = self.slots.get(key).map(|s| Arc::clone(&s)) else {
            return false;
        };
        let inner = slot.lock();
        inner.current.as_ref().is_some_and(|s| s.request_cancel())
    }

    /// Subscribe to every snapshot change across all keys.
    pub fn subscribe(&self) -> broadcast::Receiver<JobSnapshot> {
        self.global_tx.subscribe()
    }

    /// Snapshots of all live executions.
    pub fn active_jobs(&self) -> Vec<JobSnapshot> {
        let slots: Vec<Arc<Slot>> = self.slots.iter().map(|e| Arc::clone(e.value())).collect();
        let mut active: Vec<JobSnapshot> = slots
            .iter()
            .filter_map(|slot| slot.lock().current.clone())
            .map(|s| s.snapshot())
            .filter(|snap| snap.state.is_live())
            .collect();
        active.sort_by(|a, b| a.key.cmp(&b.key));
        active
    }

    /// Drop terminal records (current or superseded) whose `ended_at` is
    /// older than the retention window. Returns the number evicted.
    pub fn evict_expired(&self) -> usize {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            return 0;
        };

        let slots: Vec<(String, Arc<Slot>)> = self
            .slots
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let mut evicted = 0;
        for (key, slot) in slots {
            let mut inner = slot.lock();
            let expired = inner
                .current
                .as_ref()
                .and_then(|s| s.ended_at())
                .is_some_and(|ended| ended <= cutoff);
            if expired {
                inner.current = None;
                evicted += 1;
                tracing::debug!(key = %key, "Evicted terminal job record");
            }
            let before = inner.superseded.len();
            inner
                .superseded
                .retain(|snap| snap.ended_at.is_some_and(|ended| ended > cutoff));
            evicted += before - inner.superseded.len();
        }
        evicted
    }

    /// Spawn a background task that evicts expired records every `every`.
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let evicted = registry.evict_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, "Cleaned expired job records");
                }
            }
        })
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobResult, JobStatus};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    async fn wait_terminal(registry: &JobRegistry, key: &str) -> JobSnapshot {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(snap) = registry.snapshot(key) {
                    if snap.is_terminal() {
                        return snap;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not reach a terminal state")
    }

    #[tokio::test]
    async fn test_snapshot_for_unknown_key_is_none() {
        let registry = JobRegistry::default();
        assert!(registry.snapshot("seia").is_none());
        assert!(!registry.request_cancel("seia"));
        assert!(registry.active_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_second_start_attaches() {
        let registry = JobRegistry::default();
        let gate = Arc::new(Notify::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let first = {
            let gate = Arc::clone(&gate);
            let executions = Arc::clone(&executions);
            registry.start("seia", move |_ctx| async move {
                executions.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(JobCompletion::new(1))
            })
        };
        let second = {
            let executions = Arc::clone(&executions);
            registry.start("seia", move |_ctx| async move {
                executions.fetch_add(1, Ordering::SeqCst);
                Ok(JobCompletion::new(2))
            })
        };

        assert!(matches!(first, StartOutcome::Started(_)));
        assert!(matches!(second, StartOutcome::AlreadyRunning(_)));
        assert_eq!(
            first.snapshot().execution_id,
            second.snapshot().execution_id
        );

        gate.notify_one();
        let done = wait_terminal(&registry, "seia").await;
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(
            done.result,
            Some(JobResult::Completed {
                count: 1,
                metrics: Default::default()
            })
        );
    }

    #[tokio::test]
    async fn test_start_after_terminal_supersedes() {
        let registry = JobRegistry::default();
        let first = registry.start("hechos_esenciales", |_ctx| async { Ok(JobCompletion::new(2)) });
        wait_terminal(&registry, "hechos_esenciales").await;

        let second = registry.start("hechos_esenciales", |_ctx| async { Ok(JobCompletion::new(3)) });
        assert!(matches!(second, StartOutcome::Started(_)));
        assert_ne!(first.snapshot().execution_id, second.snapshot().execution_id);
        let done = wait_terminal(&registry, "hechos_esenciales").await;
        assert_eq!(done.execution_id, second.snapshot().execution_id);
    }

    #[tokio::test]
    async fn test_superseded_terminal_snapshot_stays_readable() {
        let registry = JobRegistry::default();
        let first = registry.start("seia", |ctx| async move {
            ctx.report(90, "saving");
            Ok(JobCompletion::new(37))
        });
        let first_id = first.snapshot().execution_id.unwrap();
        wait_terminal(&registry, "seia").await;

        let gate = Arc::new(Notify::new());
        let g = Arc::clone(&gate);
        let second = registry.start("seia", move |_ctx| async move {
            g.notified().await;
            Ok(JobCompletion::new(0))
        });
        let second_id = second.snapshot().execution_id.unwrap();
        assert_ne!(first_id, second_id);

        let old = registry.snapshot_of("seia", first_id).expect("superseded execution");
        assert_eq!(old.state, JobStatus::Completed);
        assert_eq!(old.percent, 90);
        assert_eq!(
            old.result,
            Some(JobResult::Completed {
                count: 37,
                metrics: Default::default()
            })
        );
        assert_eq!(
            registry.snapshot_of("seia", second_id).map(|s| s.state),
            Some(JobStatus::Running)
        );
        assert!(registry.snapshot_of("seia", second_id + 1).is_none());
        assert!(registry.snapshot_of("hechos_esenciales", first_id).is_none());
        gate.notify_one();
    }

    #[tokio::test]
    async fn test_superseded_snapshots_are_bounded_and_evicted() {
        let registry = JobRegistry::new(RegistryConfig {
            retention: Duration::ZERO,
            ..Default::default()
        });
        let mut ids = Vec::new();
        for n in 0..(MAX_SUPERSEDED as u64 + 3) {
            let started = registry.start("seia", move |_ctx| async move { Ok(JobCompletion::new(n)) });
            ids.push(started.snapshot().execution_id.unwrap());
            wait_terminal(&registry, "seia").await;
        }

        assert!(registry.snapshot_of("seia", ids[0]).is_none());
        assert!(registry.snapshot_of("seia", ids[ids.len() - 2]).is_some());

        assert_eq!(registry.evict_expired(), MAX_SUPERSEDED + 1);
        for id in ids {
            assert!(registry.snapshot_of("seia", id).is_none());
        }
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let registry = JobRegistry::default();
        let gate = Arc::new(Notify::new());
        let g = Arc::clone(&gate);
        registry.start("seia", move |_ctx| async move {
            g.notified().await;
            Ok(JobCompletion::new(0))
        });
        let other = registry.start("hechos_esenciales", |_ctx| async { Ok(JobCompletion::new(2)) });
        assert!(matches!(other, StartOutcome::Started(_)));
        assert_eq!(wait_terminal(&registry, "hechos_esenciales").await.state, JobStatus::Completed);
        assert_eq!(registry.active_jobs().len(), 1);
        gate.notify_one();
    }

    #[tokio::test]
    async fn test_cancel_live_job() {
        let registry = JobRegistry::default();
        registry.start("seia", |ctx| async move {
            ctx.report(40, "fetching page 3");
            ctx.cancelled().await;
            ctx.checkpoint()?;
            Ok(JobCompletion::new(0))
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.request_cancel("seia"));
        let done = wait_terminal(&registry, "seia").await;
        assert_eq!(done.state, JobStatus::Cancelled);
        assert_eq!(done.percent, 40);
        assert!(!registry.request_cancel("seia"));
    }

    #[tokio::test]
    async fn test_evict_expired_with_zero_retention() {
        let registry = JobRegistry::new(RegistryConfig {
            retention: Duration::ZERO,
            ..Default::default()
        });
        registry.start("seia", |_ctx| async { Ok(JobCompletion::new(1)) });
        wait_terminal(&registry, "seia").await;

        assert_eq!(registry.evict_expired(), 1);
        assert!(registry.snapshot("seia").is_none());
    }

    #[tokio::test]
    async fn test_evict_keeps_live_and_recent_records() {
        let registry = JobRegistry::default();
        let gate = Arc::new(Notify::new());
        let g = Arc::clone(&gate);
        registry.start("seia", move |_ctx| async move {
            g.notified().await;
            Ok(JobCompletion::new(0))
        });
        registry.start("hechos_esenciales", |_ctx| async { Ok(JobCompletion::new(2)) });
        wait_terminal(&registry, "hechos_esenciales").await;

        assert_eq!(registry.evict_expired(), 0);
        assert!(registry.snapshot("hechos_esenciales").is_some());
        assert!(registry.snapshot("seia").is_some());
        gate.notify_one();
    }

    #[tokio::test]
    async fn test_subscribe_sees_start() {
        let registry = JobRegistry::default();
        let mut rx = registry.subscribe();
        registry.start("seia", |_ctx| async { Ok(JobCompletion::new(0)) });

        let progress = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout waiting for progress")
            .expect("channel error");
        assert_eq!(progress.key, "seia");
    }
}
