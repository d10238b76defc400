use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of probing one external dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Ok,
    Error,
}

/// One dependency probe: name, outcome, measured round-trip latency and a
/// short human-readable message. Ephemeral, recomputed on every check.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub name: String,
    pub status: ProbeStatus,
    pub response_time: Duration,
    pub message: String,
}

impl ProbeResult {
    pub fn ok(name: &str, response_time: Duration, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: ProbeStatus::Ok,
            response_time,
            message: message.to_string(),
        }
    }

    pub fn error(name: &str, response_time: Duration, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: ProbeStatus::Error,
            response_time,
            message: message.to_string(),
        }
    }
}

/// Overall service status derived from the current set of probe results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Healthy => write!(f, "healthy"),
            OverallStatus::Degraded => write!(f, "degraded"),
            OverallStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Reduces a set of dependency probes into one overall status.
///
/// With no probes the service is degraded, not healthy: an empty set means
/// nothing was actually checked. Any failing probe degrades the service, and
/// only when every probe failed is the service unhealthy.
pub fn aggregate(probes: &[ProbeResult]) -> OverallStatus {
    if probes.is_empty() {
        return OverallStatus::Degraded;
    }

    let errors = probes
        .iter()
        .filter(|p| p.status == ProbeStatus::Error)
        .count();

    if errors == probes.len() {
        OverallStatus::Unhealthy
    } else if errors > 0 {
        OverallStatus::Degraded
    } else {
        OverallStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::{aggregate, OverallStatus, ProbeResult};
    use std::time::Duration;

    fn ok(name: &str) -> ProbeResult {
        ProbeResult::ok(name, Duration::from_millis(2), "connection successful")
    }

    fn err(name: &str) -> ProbeResult {
        ProbeResult::error(name, Duration::from_millis(150), "connection refused")
    }

    #[test]
    fn no_probes_is_degraded() {
        assert_eq!(aggregate(&[]), OverallStatus::Degraded);
    }

    #[test]
    fn all_ok_is_healthy() {
        assert_eq!(aggregate(&[ok("database")]), OverallStatus::Healthy);
        assert_eq!(
            aggregate(&[ok("database"), ok("cache")]),
            OverallStatus::Healthy
        );
    }

    #[test]
    fn some_errors_is_degraded() {
        assert_eq!(
            aggregate(&[ok("database"), err("cache")]),
            OverallStatus::Degraded
        );
        assert_eq!(
            aggregate(&[err("database"), ok("cache"), ok("search")]),
            OverallStatus::Degraded
        );
    }

    #[test]
    fn all_errors_is_unhealthy() {
        assert_eq!(aggregate(&[err("database")]), OverallStatus::Unhealthy);
        assert_eq!(
            aggregate(&[err("database"), err("cache")]),
            OverallStatus::Unhealthy
        );
    }

    #[test]
    fn status_display_matches_wire_values() {
        assert_eq!(OverallStatus::Healthy.to_string(), "healthy");
        assert_eq!(OverallStatus::Degraded.to_string(), "degraded");
        assert_eq!(OverallStatus::Unhealthy.to_string(), "unhealthy");
    }
}
