use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lifecycle::{Runner, ShutdownOutcome};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Default test runner: signal trapping off, short overall deadline (5s) so
/// tests don't hang. Per-test tokio::time::timeout guards are a second
/// safety net.
fn test_runner() -> Runner {
    Runner::builder("test")
        .trap_signals(false)
        .shutdown_timeout(Duration::from_secs(5))
        .build()
}

// ---------------------------------------------------------------------------
// Section 1: Sequence ordering and outcomes
//
// The shutdown sequence is: drain step first, then every cleanup obligation
// in registration order. Failures are collected, never short-circuited, and
// the whole sequence is bounded by the overall deadline.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn obligations_run_in_registration_order() {
    let runner = test_runner();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    for name in ["database", "settings watcher", "logger"] {
        let order = order.clone();
        runner.register_cleanup(name, move || async move {
            order.lock().unwrap().push(name);
            Ok(())
        });
    }

    let outcome = tokio::time::timeout(Duration::from_secs(10), runner.shutdown())
        .await
        .expect("timed out");
    assert!(outcome.is_clean());
    assert_eq!(
        *order.lock().unwrap(),
        vec!["database", "settings watcher", "logger"]
    );
}

#[tokio::test]
async fn drain_runs_before_obligations() {
    let runner = test_runner();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let o = order.clone();
    runner.register_cleanup("database", move || async move {
        o.lock().unwrap().push("database");
        Ok(())
    });
    // Registered after the obligation, still runs first
    let o = order.clone();
    runner.set_drain("http server", move || async move {
        o.lock().unwrap().push("http server");
        Ok(())
    });

    let outcome = tokio::time::timeout(Duration::from_secs(10), runner.shutdown())
        .await
        .expect("timed out");
    assert!(outcome.is_clean());
    assert_eq!(*order.lock().unwrap(), vec!["http server", "database"]);
}

#[tokio::test]
async fn failed_obligation_does_not_stop_later_ones() {
    let runner = test_runner();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let o = order.clone();
    runner.register_cleanup("flaky", move || async move {
        o.lock().unwrap().push("flaky");
        Err(anyhow::anyhow!("disk full"))
    });
    let o = order.clone();
    runner.register_cleanup("database", move || async move {
        o.lock().unwrap().push("database");
        Ok(())
    });

    let outcome = tokio::time::timeout(Duration::from_secs(10), runner.shutdown())
        .await
        .expect("timed out");

    assert_eq!(*order.lock().unwrap(), vec!["flaky", "database"]);
    match outcome {
        ShutdownOutcome::CleanWithErrors { failures, .. } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].obligation, "flaky");
            assert!(failures[0].error.contains("disk full"));
        }
        other => panic!("expected CleanWithErrors, got {other:?}"),
    }
}

#[tokio::test]
async fn deadline_exceeded_forces_outcome() {
    let runner = Runner::builder("test")
        .trap_signals(false)
        .shutdown_timeout(Duration::from_millis(100))
        .build();

    runner.register_cleanup("fast", || async { Ok(()) });
    runner.register_cleanup("stuck", || async {
        std::future::pending::<()>().await;
        Ok(())
    });
    runner.register_cleanup("never reached", || async { Ok(()) });

    let outcome = tokio::time::timeout(Duration::from_secs(10), runner.shutdown())
        .await
        .expect("timed out");

    match outcome {
        ShutdownOutcome::Forced { pending, .. } => {
            assert_eq!(pending, vec!["stuck".to_string(), "never reached".to_string()]);
        }
        other => panic!("expected Forced, got {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_with_no_registrations_is_clean() {
    let runner = test_runner();
    let outcome = tokio::time::timeout(Duration::from_secs(10), runner.shutdown())
        .await
        .expect("timed out");
    assert!(outcome.is_clean());
    assert!(outcome.elapsed() < Duration::from_secs(1));
}

// ---------------------------------------------------------------------------
// Section 2: Exactly-once semantics
//
// Two signals, or a signal racing an explicit request, must not run cleanup
// twice. The first caller runs the sequence; everyone else waits for it and
// observes the same stored outcome.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_shutdown_runs_sequence_once() {
    let runner = test_runner();
    let runs = Arc::new(AtomicUsize::new(0));

    let r = runs.clone();
    runner.register_cleanup("database", move || async move {
        // Stay in flight long enough for the second caller to race the claim
        tokio::time::sleep(Duration::from_millis(50)).await;
        r.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let a = runner.clone();
    let b = runner.clone();
    let (first, second) = tokio::time::timeout(
        Duration::from_secs(10),
        futures::future::join(
            tokio::spawn(async move { a.shutdown().await }),
            tokio::spawn(async move { b.shutdown().await }),
        ),
    )
    .await
    .expect("timed out");

    assert!(first.unwrap().is_clean());
    assert!(second.unwrap().is_clean());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_shutdown_call_returns_stored_outcome() {
    let runner = test_runner();
    let runs = Arc::new(AtomicUsize::new(0));

    let r = runs.clone();
    runner.register_cleanup("flaky", move || async move {
        r.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("already closed"))
    });

    let first = runner.shutdown().await;
    let second = runner.shutdown().await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(matches!(first, ShutdownOutcome::CleanWithErrors { .. }));
    assert!(matches!(second, ShutdownOutcome::CleanWithErrors { .. }));
}

#[tokio::test]
async fn request_shutdown_flips_state_without_running_cleanup() {
    let runner = test_runner();
    let runs = Arc::new(AtomicUsize::new(0));

    let r = runs.clone();
    runner.register_cleanup("database", move || async move {
        r.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    assert!(!runner.is_shutting_down());
    runner.request_shutdown();
    runner.request_shutdown();
    assert!(runner.is_shutting_down());
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let outcome = tokio::time::timeout(Duration::from_secs(10), runner.shutdown())
        .await
        .expect("timed out");
    assert!(outcome.is_clean());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Section 3: Workload wiring
//
// The workload observes shutdown through shutdown_requested() futures and
// shutdown_token() clones; the readiness probe flips as soon as shutdown is
// requested, before any cleanup has run.
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_requested_future_resolves_on_request() {
    let runner = test_runner();
    let requested = runner.shutdown_requested();

    let waiter = tokio::spawn(async move {
        requested.await;
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    runner.request_shutdown();
    tokio::time::timeout(Duration::from_secs(10), waiter)
        .await
        .expect("timed out")
        .unwrap();
}

#[tokio::test]
async fn shutdown_token_observes_request() {
    let runner = test_runner();
    let token = runner.shutdown_token();
    assert!(!token.is_cancelled());

    runner.request_shutdown();
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn readiness_200_until_shutdown_then_503() {
    let runner = test_runner();
    let readiness = runner.readiness_handler();
    assert!(readiness.is_ready());
    assert_eq!(readiness.check().await.0.as_u16(), 200);

    runner.request_shutdown();
    assert!(!readiness.is_ready());
    assert_eq!(readiness.check().await.0.as_u16(), 503);
}

/// A server task driven by shutdown_requested() drains before the cleanup
/// obligations run, through the drain step awaiting its join handle.
#[tokio::test]
async fn drain_waits_for_workload_task() {
    let runner = test_runner();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let o = order.clone();
    let requested = runner.shutdown_requested();
    let server = tokio::spawn(async move {
        requested.await;
        // Simulated in-flight request finishing after the stop signal
        tokio::time::sleep(Duration::from_millis(30)).await;
        o.lock().unwrap().push("server drained");
    });

    runner.set_drain("http server", move || async move {
        server.await?;
        Ok(())
    });
    let o = order.clone();
    runner.register_cleanup("database", move || async move {
        o.lock().unwrap().push("database closed");
        Ok(())
    });

    let outcome = tokio::time::timeout(Duration::from_secs(10), runner.shutdown())
        .await
        .expect("timed out");
    assert!(outcome.is_clean());
    assert_eq!(
        *order.lock().unwrap(),
        vec!["server drained", "database closed"]
    );
}
