pub(crate) const METRIC_SHUTDOWN_INITIATED: &str = "lifecycle_shutdown_initiated_total";
pub(crate) const METRIC_SHUTDOWN_COMPLETED: &str = "lifecycle_shutdown_completed_total";
pub(crate) const METRIC_OBLIGATION_DURATION: &str = "lifecycle_obligation_duration_seconds";
pub(crate) const METRIC_OBLIGATION_RESULT: &str = "lifecycle_obligation_result_total";

pub(crate) fn emit_shutdown_initiated(service_name: &str, trigger: &str) {
    metrics::counter!(
        METRIC_SHUTDOWN_INITIATED,
        "service_name" => service_name.to_string(),
        "trigger" => trigger.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_shutdown_completed(service_name: &str, outcome: &str) {
    metrics::counter!(
        METRIC_SHUTDOWN_COMPLETED,
        "service_name" => service_name.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_obligation_duration(
    service_name: &str,
    obligation: &str,
    result: &str,
    duration_secs: f64,
) {
    metrics::histogram!(
        METRIC_OBLIGATION_DURATION,
        "service_name" => service_name.to_string(),
        "obligation" => obligation.to_string(),
        "result" => result.to_string()
    )
    .record(duration_secs);
}

pub(crate) fn emit_obligation_result(service_name: &str, obligation: &str, result: &str) {
    metrics::counter!(
        METRIC_OBLIGATION_RESULT,
        "service_name" => service_name.to_string(),
        "obligation" => obligation.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}
