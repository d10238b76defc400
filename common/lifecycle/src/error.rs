//! Failure shapes surfaced by the shutdown sequence.

use thiserror::Error;

/// A cleanup obligation that failed during shutdown.
///
/// Failures are collected across the whole sequence and reported together in
/// [`ShutdownOutcome::CleanWithErrors`](crate::ShutdownOutcome::CleanWithErrors);
/// one failing obligation never prevents the next from running.
#[derive(Debug, Clone, Error)]
#[error("cleanup obligation '{obligation}' failed: {error}")]
pub struct ObligationFailure {
    pub obligation: String,
    pub error: String,
}
