//! Process lifecycle: signal trapping, ordered cleanup obligations, one
//! bounded graceful shutdown sequence, K8s readiness probes, and metrics.
//! No matter how many signals arrive or how many tasks ask for it, the
//! shutdown sequence runs exactly once; late requesters observe the stored
//! outcome instead of re-running cleanup.

mod error;
mod metrics;
mod readiness;
mod runner;
mod signals;

pub use error::ObligationFailure;
pub use readiness::ReadinessHandler;
pub use runner::{Runner, RunnerBuilder, ShutdownOutcome};
