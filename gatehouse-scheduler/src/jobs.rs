//! Cron-triggered background jobs behind a supervisor boundary: the expired
//! token reaper and the scheduled dependency check.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use gatehouse_core::auth::service::AuthService;
use gatehouse_core::checker::DependencyChecker;
use health::{HealthHandle, OverallStatus, ProbeStatus};

use crate::metrics_constants::*;

const FALLBACK_LIVENESS_DEADLINE: Duration = Duration::from_secs(15 * 60);

/// One registered job: a stable name for logs and metrics, a six-field cron
/// schedule (seconds first), and a per-run deadline.
pub struct JobDefinition {
    pub name: &'static str,
    pub schedule: Schedule,
    pub run_timeout: Duration,
}

impl JobDefinition {
    pub fn new(
        name: &'static str,
        expression: &str,
        run_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let schedule = Schedule::from_str(expression)
            .with_context(|| format!("invalid schedule {expression:?} for job {name}"))?;
        Ok(Self {
            name,
            schedule,
            run_timeout,
        })
    }

    /// Deadline for the liveness registration: four schedule gaps without a
    /// completed run marks the component unhealthy.
    pub fn liveness_deadline(&self) -> Duration {
        let mut upcoming = self.schedule.upcoming(Utc);
        match (upcoming.next(), upcoming.next()) {
            (Some(first), Some(second)) => ((second - first) * 4)
                .to_std()
                .unwrap_or(FALLBACK_LIVENESS_DEADLINE),
            _ => FALLBACK_LIVENESS_DEADLINE,
        }
    }
}

/// Dispatches registered jobs on their schedules until the shutdown token
/// fires. Runs of the same job never overlap; each run executes on its own
/// task so a panic in the job body is contained and logged while the
/// schedule keeps going.
#[derive(Clone)]
pub struct Scheduler {
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    pub fn register<F, Fut>(&self, job: JobDefinition, liveness: HealthHandle, action: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            let labels = [("job".to_string(), job.name.to_string())];
            info!(job = job.name, "job registered");
            loop {
                let Some(next) = job.schedule.upcoming(Utc).next() else {
                    warn!(job = job.name, "schedule is exhausted, stopping");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(wait) => {}
                }
                run_supervised(job.name, &labels, job.run_timeout, action()).await;
                // A run that failed still proves the loop is alive.
                liveness.report_healthy().await;
            }
            info!(job = job.name, "job loop stopped");
        });
    }

    /// Waits for every job loop, and with it any run still in flight, to
    /// finish. Meaningful only once the shutdown token is cancelled.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn run_supervised<Fut>(
    name: &'static str,
    labels: &[(String, String)],
    run_timeout: Duration,
    run: Fut,
) where
    Fut: Future<Output = ()> + Send + 'static,
{
    common_metrics::inc(RUN_STARTS, labels, 1);
    let run_time = common_metrics::timing_guard(RUN_TIME, labels);

    let mut handle = tokio::spawn(run);
    match tokio::time::timeout(run_timeout, &mut handle).await {
        Ok(Ok(())) => {
            common_metrics::inc(RUN_ENDS, labels, 1);
            common_metrics::gauge(
                RUN_LAST_SUCCESS,
                labels,
                common_metrics::get_current_timestamp_seconds(),
            );
        }
        Ok(Err(join_error)) if join_error.is_panic() => {
            common_metrics::inc(RUN_PANICS, labels, 1);
            error!(job = name, "job run panicked: {join_error}");
        }
        Ok(Err(join_error)) => {
            warn!(job = name, "job run was cancelled: {join_error}");
        }
        Err(_) => {
            handle.abort();
            common_metrics::inc(RUN_TIMEOUTS, labels, 1);
            warn!(
                job = name,
                ?run_timeout,
                "job run exceeded its deadline and was aborted"
            );
        }
    }
    run_time.fin();
}

/// Deletes token rows whose retention window has passed. The count feeds a
/// counter so reap volume stays visible over time.
pub async fn run_token_cleanup(auth: Arc<AuthService>) {
    let reap_time = common_metrics::timing_guard(REAPED_TIME, &[]);
    let reaped = auth.reap_expired_tokens().await;
    reap_time.fin();
    common_metrics::inc(REAPED_COUNT, &[], reaped);
}

/// Probes every external dependency and exports the result as a gauge. The
/// same aggregation backs the HTTP and RPC health endpoints; running it on a
/// schedule keeps the gauges fresh even when nobody is asking.
pub async fn run_health_check(checker: Arc<DependencyChecker>) {
    let report = checker.check_dependencies().await;

    for (name, dependency) in &report.dependencies {
        let labels = [("dependency".to_string(), name.clone())];
        let up = dependency.status == ProbeStatus::Ok;
        common_metrics::gauge(DEPENDENCY_UP, &labels, if up { 1.0 } else { 0.0 });
        if !up {
            error!(
                dependency = %name,
                response_time = %dependency.response_time,
                "dependency check failed: {}",
                dependency.message
            );
        }
    }

    match report.status {
        OverallStatus::Healthy => info!(status = %report.status, "dependency check passed"),
        OverallStatus::Degraded => warn!(status = %report.status, "dependency check degraded"),
        OverallStatus::Unhealthy => error!(status = %report.status, "dependency check failed"),
    }
}
