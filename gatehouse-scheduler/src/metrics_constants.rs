pub const RUN_STARTS: &str = "gatehouse_scheduler_run_starts";
pub const RUN_TIME: &str = "gatehouse_scheduler_total_run_ms";
pub const RUN_ENDS: &str = "gatehouse_scheduler_run_ends";
pub const RUN_PANICS: &str = "gatehouse_scheduler_run_panics";
pub const RUN_TIMEOUTS: &str = "gatehouse_scheduler_run_timeouts";
pub const RUN_LAST_SUCCESS: &str = "gatehouse_scheduler_last_success_timestamp";

pub const REAPED_COUNT: &str = "gatehouse_scheduler_reaped_tokens";
pub const REAPED_TIME: &str = "gatehouse_scheduler_reaped_tokens_cleanup_ms";

// The scheduler doubles as a dependency monitor, so it exports a
// per-dependency up/down gauge alongside its own run counters.
pub const DEPENDENCY_UP: &str = "gatehouse_scheduler_dependency_up";
