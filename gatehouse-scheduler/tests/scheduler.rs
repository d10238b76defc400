use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use health::{HealthHandle, HealthRegistry};
use http_body_util::BodyExt;
use lifecycle::Runner;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use gatehouse_scheduler::http::{app, AppContext};
use gatehouse_scheduler::jobs::{JobDefinition, Scheduler};

fn every_second(name: &'static str, run_timeout: Duration) -> JobDefinition {
    JobDefinition::new(name, "* * * * * *", run_timeout).expect("valid schedule")
}

async fn job_handle(registry: &HealthRegistry, name: &str) -> HealthHandle {
    registry
        .register(name.to_string(), Duration::from_secs(30))
        .await
}

async fn wait_until<F>(check: F)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(check());
}

#[tokio::test]
async fn jobs_fire_on_their_schedule() {
    let registry = HealthRegistry::new("liveness");
    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(shutdown.clone());

    let runs = Arc::new(AtomicUsize::new(0));
    scheduler.register(
        every_second("ticker", Duration::from_secs(5)),
        job_handle(&registry, "ticker").await,
        {
            let runs = Arc::clone(&runs);
            move || {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            }
        },
    );

    tokio::time::sleep(Duration::from_millis(2500)).await;
    shutdown.cancel();
    scheduler.drain().await;

    assert!(runs.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn completed_runs_mark_the_job_alive() {
    let registry = HealthRegistry::new("liveness");
    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(shutdown.clone());

    scheduler.register(
        every_second("ticker", Duration::from_secs(5)),
        job_handle(&registry, "ticker").await,
        || async {},
    );

    wait_until(|| registry.get_status().healthy).await;

    shutdown.cancel();
    scheduler.drain().await;
}

#[tokio::test]
async fn a_panicking_run_does_not_stop_the_schedule() {
    let registry = HealthRegistry::new("liveness");
    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(shutdown.clone());

    let runs = Arc::new(AtomicUsize::new(0));
    scheduler.register(
        every_second("flaky", Duration::from_secs(5)),
        job_handle(&registry, "flaky").await,
        {
            let runs = Arc::clone(&runs);
            move || {
                let runs = Arc::clone(&runs);
                async move {
                    if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first run explodes");
                    }
                }
            }
        },
    );

    tokio::time::sleep(Duration::from_millis(3500)).await;
    shutdown.cancel();
    scheduler.drain().await;

    // The first run panicked; later runs still happened.
    assert!(runs.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn drain_waits_for_the_run_in_flight() {
    let registry = HealthRegistry::new("liveness");
    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(shutdown.clone());

    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    scheduler.register(
        every_second("slow", Duration::from_secs(5)),
        job_handle(&registry, "slow").await,
        {
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            move || {
                let started = Arc::clone(&started);
                let finished = Arc::clone(&finished);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(400)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            }
        },
    );

    wait_until(|| started.load(Ordering::SeqCst) > 0).await;
    shutdown.cancel();
    scheduler.drain().await;

    let started = started.load(Ordering::SeqCst);
    assert!(started >= 1);
    assert_eq!(started, finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn a_run_past_its_deadline_is_abandoned() {
    let registry = HealthRegistry::new("liveness");
    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(shutdown.clone());

    let started = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    scheduler.register(
        every_second("stuck", Duration::from_millis(100)),
        job_handle(&registry, "stuck").await,
        {
            let started = Arc::clone(&started);
            let completed = Arc::clone(&completed);
            move || {
                let started = Arc::clone(&started);
                let completed = Arc::clone(&completed);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            }
        },
    );

    tokio::time::sleep(Duration::from_millis(3500)).await;
    shutdown.cancel();
    scheduler.drain().await;

    // Every run hit its deadline, none finished, and the schedule kept going.
    assert!(started.load(Ordering::SeqCst) >= 2);
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}

#[test]
fn an_invalid_schedule_is_rejected() {
    let job = JobDefinition::new("broken", "not a schedule", Duration::from_secs(1));
    assert!(job.is_err());
}

#[test]
fn the_liveness_deadline_covers_four_schedule_gaps() {
    let job =
        JobDefinition::new("gauge", "*/30 * * * * *", Duration::from_secs(1)).expect("valid schedule");
    assert_eq!(job.liveness_deadline(), Duration::from_secs(120));
}

#[tokio::test]
async fn probe_routes_answer() {
    let registry = HealthRegistry::new("liveness");
    job_handle(&registry, "ticker").await.report_healthy().await;
    wait_until(|| registry.get_status().healthy).await;

    let runner = Runner::builder("scheduler-tests").trap_signals(false).build();
    let probe_app = app(
        Arc::new(AppContext {
            name: "gatehouse-scheduler".to_string(),
            liveness: registry,
            readiness: runner.readiness_handler(),
        }),
        false,
    );

    for path in ["/", "/_liveness", "/_readiness"] {
        let response = probe_app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path}");
    }

    let response = probe_app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&body).contains("gatehouse scheduler"));
}

#[tokio::test]
async fn readiness_flips_once_shutdown_begins() {
    let registry = HealthRegistry::new("liveness");
    let runner = Runner::builder("scheduler-tests").trap_signals(false).build();
    let probe_app = app(
        Arc::new(AppContext {
            name: "gatehouse-scheduler".to_string(),
            liveness: registry,
            readiness: runner.readiness_handler(),
        }),
        false,
    );

    let before = probe_app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/_readiness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(before.status(), StatusCode::OK);

    runner.shutdown_token().cancel();

    let after = probe_app
        .oneshot(
            Request::builder()
                .uri("/_readiness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::SERVICE_UNAVAILABLE);
}
