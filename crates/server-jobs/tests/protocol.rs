use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scrape_hub_server_jobs::{
    JobCompletion, JobError, JobRegistry, JobResult, JobSnapshot, JobStatus, StartOutcome,
};
use tokio::sync::Notify;

/// Poll the registry the way a remote observer would, collecting every
/// snapshot until a terminal one appears.
async fn observe_until_terminal(registry: &JobRegistry, key: &str) -> Vec<JobSnapshot> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(snap) = registry.snapshot(key) {
                let terminal = snap.is_terminal();
                seen.push(snap);
                if terminal {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("job did not reach a terminal state");
    seen
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_converge_on_one_execution() {
    let registry = Arc::new(JobRegistry::default());
    let executions = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        let executions = Arc::clone(&executions);
        let gate = Arc::clone(&gate);
        handles.push(tokio::spawn(async move {
            registry.start("seia", move |_ctx| async move {
                executions.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(JobCompletion::new(1))
            })
        }));
    }

    let mut outcomes = Vec::new();
    for h in handles {
        outcomes.push(h.await.unwrap());
    }

    let started: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, StartOutcome::Started(_)))
        .collect();
    assert_eq!(started.len(), 1);
    let live_id = started[0].snapshot().execution_id;
    for outcome in &outcomes {
        assert_eq!(outcome.snapshot().execution_id, live_id);
    }

    gate.notify_one();
    let seen = observe_until_terminal(&registry, "seia").await;
    assert_eq!(seen.last().unwrap().state, JobStatus::Completed);
    assert_eq!(executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_second_start_in_same_instant_attaches() {
    let registry = JobRegistry::default();
    let gate = Arc::new(Notify::new());
    let g = Arc::clone(&gate);

    let first = registry.start("seia", move |_ctx| async move {
        g.notified().await;
        Ok(JobCompletion::new(0))
    });
    let second = registry.start("seia", |_ctx| async { Ok(JobCompletion::new(99)) });

    let StartOutcome::Started(first_snap) = first else {
        panic!("first caller should start the job");
    };
    let StartOutcome::AlreadyRunning(second_snap) = second else {
        panic!("second caller should attach");
    };
    assert_eq!(first_snap.execution_id, second_snap.execution_id);
    assert_eq!(first_snap.started_at, second_snap.started_at);
    gate.notify_one();

    let last = observe_until_terminal(&registry, "seia").await.pop().unwrap();
    assert_eq!(
        last.result,
        Some(JobResult::Completed {
            count: 0,
            metrics: Default::default()
        })
    );
}

#[tokio::test]
async fn test_progress_is_monotonic_and_terminal_snapshot_is_stable() {
    let registry = JobRegistry::default();
    registry.start("seia", |ctx| async move {
        for step in 0..=20u8 {
            ctx.checkpoint()?;
            ctx.report(step * 5, format!("step {step}"));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        Ok(JobCompletion::new(20))
    });

    let seen = observe_until_terminal(&registry, "seia").await;
    for pair in seen.windows(2) {
        assert!(pair[0].percent <= pair[1].percent, "{:?}", pair);
    }

    let terminal = seen.last().unwrap().clone();
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(registry.snapshot("seia"), Some(terminal.clone()));
    }
}

#[tokio::test]
async fn test_cancel_freezes_percent() {
    let registry = JobRegistry::default();
    let reported = Arc::new(Notify::new());
    let r = Arc::clone(&reported);

    registry.start("seia", move |ctx| async move {
        ctx.report(40, "fetching page 3");
        r.notify_one();
        loop {
            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
            ctx.checkpoint()?;
        }
    });

    reported.notified().await;
    assert!(registry.request_cancel("seia"));
    let after_cancel = registry.snapshot("seia").unwrap();
    assert!(matches!(
        after_cancel.state,
        JobStatus::CancelRequested | JobStatus::Cancelled
    ));

    let last = observe_until_terminal(&registry, "seia").await.pop().unwrap();
    assert_eq!(last.state, JobStatus::Cancelled);
    assert_eq!(last.result, Some(JobResult::Cancelled));
    assert!(last.percent >= 40);
}

#[tokio::test]
async fn test_domain_error_fails_with_frozen_percent() {
    let registry = JobRegistry::default();
    registry.start("seia", |ctx| async move {
        ctx.report(10, "fetching page 1");
        Err(JobError::failed("SEIA returned HTTP 502"))
    });

    let last = observe_until_terminal(&registry, "seia").await.pop().unwrap();
    assert_eq!(last.state, JobStatus::Failed);
    assert_eq!(last.percent, 10);
    match last.result {
        Some(JobResult::Failed { error }) => assert!(error.contains("502")),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_completion_reports_count() {
    let registry = JobRegistry::default();
    registry.start("seia", |ctx| async move {
        ctx.report(100, "saved 37 leads");
        Ok(JobCompletion::new(37).with_metric("inserted", 37))
    });

    let last = observe_until_terminal(&registry, "seia").await.pop().unwrap();
    assert_eq!(last.state, JobStatus::Completed);
    assert_eq!(last.percent, 100);
    match last.result {
        Some(JobResult::Completed { count, metrics }) => {
            assert_eq!(count, 37);
            assert_eq!(metrics["inserted"], 37);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_cancel_without_checkpoint_may_still_complete() {
    let registry = JobRegistry::default();
    let gate = Arc::new(Notify::new());
    let g = Arc::clone(&gate);
    registry.start("seia", move |_ctx| async move {
        g.notified().await;
        Ok(JobCompletion::new(5))
    });

    assert!(registry.request_cancel("seia"));
    gate.notify_one();
    let last = observe_until_terminal(&registry, "seia").await.pop().unwrap();
    assert!(last.state.is_terminal());
    assert_eq!(last.state, JobStatus::Completed);
}

#[tokio::test]
async fn test_idle_query_is_not_running() {
    let registry = JobRegistry::default();
    assert_eq!(registry.snapshot("never-ran"), None);
    let idle = JobSnapshot::idle("never-ran");
    assert_eq!(idle.state, JobStatus::Idle);
    assert!(idle.result.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stream_never_moves_backwards_under_concurrent_cancel() {
    let registry = Arc::new(JobRegistry::default());
    let mut rx = registry.subscribe();

    registry.start("seia", |ctx| async move {
        for percent in 0..=99u8 {
            ctx.report(percent, format!("step {percent}"));
            tokio::task::yield_now().await;
        }
        ctx.checkpoint()?;
        Ok(JobCompletion::new(0))
    });
    let canceller = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            registry.request_cancel("seia");
        })
    };
    canceller.await.unwrap();
    let done = observe_until_terminal(&registry, "seia").await.pop().unwrap();

    let mut streamed = Vec::new();
    while let Ok(snap) = rx.try_recv() {
        streamed.push(snap);
    }
    assert_eq!(streamed.last(), Some(&done));
    for pair in streamed.windows(2) {
        assert!(pair[0].percent <= pair[1].percent, "{:?} -> {:?}", pair[0], pair[1]);
        assert!(
            !(pair[0].state != JobStatus::Running && pair[1].state == JobStatus::Running),
            "{:?} -> {:?}",
            pair[0].state,
            pair[1].state
        );
    }
}

#[tokio::test]
async fn test_observer_reads_its_execution_after_a_newer_start() {
    let registry = JobRegistry::default();
    let mine = registry
        .start("seia", |_ctx| async { Ok(JobCompletion::new(37)) })
        .snapshot()
        .execution_id
        .unwrap();
    let finished = observe_until_terminal(&registry, "seia").await.pop().unwrap();

    let gate = Arc::new(Notify::new());
    let g = Arc::clone(&gate);
    let newer = registry.start("seia", move |_ctx| async move {
        g.notified().await;
        Ok(JobCompletion::new(0))
    });
    assert!(matches!(newer, StartOutcome::Started(_)));

    assert_eq!(registry.snapshot_of("seia", mine), Some(finished));
    assert_eq!(
        registry.snapshot("seia").and_then(|s| s.execution_id),
        newer.snapshot().execution_id
    );
    gate.notify_one();
}
