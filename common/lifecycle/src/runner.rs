use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{error, info, warn};

use crate::error::ObligationFailure;
use crate::metrics::{
    emit_obligation_duration, emit_obligation_result, emit_shutdown_completed,
    emit_shutdown_initiated,
};
use crate::readiness::ReadinessHandler;
use crate::signals::wait_for_shutdown_signal;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), anyhow::Error>> + Send>;

struct Obligation {
    name: String,
    run: CleanupFn,
}

/// How the shutdown sequence ended.
#[derive(Debug, Clone)]
pub enum ShutdownOutcome {
    /// The workload drained and every obligation succeeded within the deadline.
    Clean { elapsed: Duration },
    /// The sequence finished within the deadline, but some obligations failed.
    CleanWithErrors {
        elapsed: Duration,
        failures: Vec<ObligationFailure>,
    },
    /// The overall deadline elapsed; the named steps were abandoned mid-flight.
    Forced {
        elapsed: Duration,
        pending: Vec<String>,
    },
}

impl ShutdownOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, ShutdownOutcome::Clean { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            ShutdownOutcome::Clean { elapsed } => *elapsed,
            ShutdownOutcome::CleanWithErrors { elapsed, .. } => *elapsed,
            ShutdownOutcome::Forced { elapsed, .. } => *elapsed,
        }
    }
}

pub struct RunnerBuilder {
    name: String,
    shutdown_timeout: Duration,
    trap_signals: bool,
}

impl RunnerBuilder {
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Disable OS signal trapping, for tests and embedded use.
    pub fn trap_signals(mut self, trap: bool) -> Self {
        self.trap_signals = trap;
        self
    }

    pub fn build(self) -> Runner {
        let inner = Arc::new(Inner {
            name: self.name,
            shutdown_timeout: self.shutdown_timeout,
            shutdown_token: CancellationToken::new(),
            done: CancellationToken::new(),
            claimed: AtomicBool::new(false),
            trigger: OnceLock::new(),
            drain: Mutex::new(None),
            obligations: Mutex::new(Vec::new()),
            outcome: Mutex::new(None),
        });

        if self.trap_signals {
            let trigger = inner.clone();
            tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                _ = trigger.trigger.set("signal");
                trigger.shutdown_token.cancel();
            });
        }

        Runner { inner }
    }
}

struct Inner {
    name: String,
    shutdown_timeout: Duration,
    /// Cancelled as soon as shutdown is requested, before any cleanup runs.
    shutdown_token: CancellationToken,
    /// Cancelled once the shutdown sequence has finished and `outcome` is set.
    done: CancellationToken,
    claimed: AtomicBool,
    trigger: OnceLock<&'static str>,
    drain: Mutex<Option<Obligation>>,
    obligations: Mutex<Vec<Obligation>>,
    outcome: Mutex<Option<ShutdownOutcome>>,
}

/// Owns the shutdown story of one process: a cancellation token the workload
/// watches, an ordered list of named cleanup obligations, and the single
/// bounded sequence that runs them.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Runner {
    inner: Arc<Inner>,
}

impl Runner {
    /// Runner with default options: 30s overall deadline, signals trapped.
    /// Must be called from within a tokio runtime.
    pub fn new(name: &str) -> Self {
        Self::builder(name).build()
    }

    pub fn builder(name: &str) -> RunnerBuilder {
        RunnerBuilder {
            name: name.to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            trap_signals: true,
        }
    }

    /// Registers the drain step: stopping the primary workload. Runs before
    /// any cleanup obligation. At most one; a second call replaces the first.
    pub fn set_drain<F, Fut>(&self, name: &str, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let obligation = Obligation {
            name: name.to_string(),
            run: Box::new(move || Box::pin(f())),
        };
        *self.inner.drain.lock().expect("poisoned drain lock") = Some(obligation);
    }

    /// Registers a cleanup obligation. Obligations run after the drain step,
    /// in registration order, each exactly once.
    pub fn register_cleanup<F, Fut>(&self, name: &str, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let obligation = Obligation {
            name: name.to_string(),
            run: Box::new(move || Box::pin(f())),
        };
        self.inner
            .obligations
            .lock()
            .expect("poisoned obligations lock")
            .push(obligation);
    }

    /// Asks for shutdown without waiting for it. The workload observes this
    /// through [`Runner::shutdown_requested`] and the readiness probe flips
    /// to not-ready immediately.
    pub fn request_shutdown(&self) {
        _ = self.inner.trigger.set("requested");
        self.inner.shutdown_token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown_token.is_cancelled()
    }

    /// Resolves once shutdown has been requested (signal or explicit call).
    /// The returned future is `'static`, suitable for `serve_with_shutdown`.
    pub fn shutdown_requested(&self) -> WaitForCancellationFutureOwned {
        self.inner.shutdown_token.clone().cancelled_owned()
    }

    /// Token sharing the runner's shutdown state, for ad-hoc `select!` arms.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown_token.clone()
    }

    pub fn readiness_handler(&self) -> ReadinessHandler {
        ReadinessHandler::new(self.inner.shutdown_token.clone())
    }

    /// Runs the shutdown sequence: drain the workload, then every cleanup
    /// obligation in registration order, the whole sequence bounded by the
    /// overall deadline. Individual failures are collected, not
    /// short-circuited; exceeding the deadline abandons the remaining steps
    /// and yields [`ShutdownOutcome::Forced`].
    ///
    /// Safe to call from several tasks: the first caller runs the sequence,
    /// the rest wait and receive the same outcome.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        _ = self.inner.trigger.set("requested");
        self.inner.shutdown_token.cancel();

        if self.inner.claimed.swap(true, Ordering::SeqCst) {
            self.inner.done.cancelled().await;
            return self
                .inner
                .outcome
                .lock()
                .expect("poisoned outcome lock")
                .clone()
                .expect("outcome is set before the done token is cancelled");
        }

        let outcome = self.run_sequence().await;
        *self.inner.outcome.lock().expect("poisoned outcome lock") = Some(outcome.clone());
        self.inner.done.cancel();
        outcome
    }

    async fn run_sequence(&self) -> ShutdownOutcome {
        let name = self.inner.name.clone();
        let trigger = self.inner.trigger.get().copied().unwrap_or("requested");
        let started = Instant::now();

        info!(service = %name, %trigger, "shutdown initiated");
        emit_shutdown_initiated(&name, trigger);

        let mut steps: Vec<Obligation> = Vec::new();
        if let Some(drain) = self
            .inner
            .drain
            .lock()
            .expect("poisoned drain lock")
            .take()
        {
            steps.push(drain);
        }
        steps.append(
            &mut self
                .inner
                .obligations
                .lock()
                .expect("poisoned obligations lock"),
        );

        let remaining: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(
            steps.iter().map(|s| s.name.clone()).collect(),
        ));

        let sequence = {
            let service = name.clone();
            let remaining = remaining.clone();
            async move {
                let mut failures = Vec::new();
                for step in steps {
                    let step_started = Instant::now();
                    let result = (step.run)().await;
                    let label = match &result {
                        Ok(()) => "success",
                        Err(_) => "failure",
                    };
                    emit_obligation_duration(
                        &service,
                        &step.name,
                        label,
                        step_started.elapsed().as_secs_f64(),
                    );
                    emit_obligation_result(&service, &step.name, label);
                    match result {
                        Ok(()) => {
                            info!(service = %service, obligation = %step.name, "cleanup obligation done")
                        }
                        Err(err) => {
                            warn!(service = %service, obligation = %step.name, %err, "cleanup obligation failed");
                            failures.push(ObligationFailure {
                                obligation: step.name.clone(),
                                error: err.to_string(),
                            });
                        }
                    }
                    drop(remaining.lock().expect("poisoned remaining lock").remove(0));
                }
                failures
            }
        };

        match tokio::time::timeout(self.inner.shutdown_timeout, sequence).await {
            Ok(failures) if failures.is_empty() => {
                let elapsed = started.elapsed();
                info!(service = %name, ?elapsed, "shutdown complete");
                emit_shutdown_completed(&name, "clean");
                ShutdownOutcome::Clean { elapsed }
            }
            Ok(failures) => {
                let elapsed = started.elapsed();
                warn!(
                    service = %name,
                    ?elapsed,
                    failed = failures.len(),
                    "shutdown complete with failed obligations"
                );
                emit_shutdown_completed(&name, "with_errors");
                ShutdownOutcome::CleanWithErrors { elapsed, failures }
            }
            Err(_) => {
                let elapsed = started.elapsed();
                let pending = remaining
                    .lock()
                    .expect("poisoned remaining lock")
                    .clone();
                error!(
                    service = %name,
                    ?elapsed,
                    ?pending,
                    "shutdown deadline exceeded, abandoning remaining steps"
                );
                emit_shutdown_completed(&name, "forced");
                ShutdownOutcome::Forced { elapsed, pending }
            }
        }
    }
}
