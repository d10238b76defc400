pub mod aggregate;
pub mod registry;

pub use aggregate::{aggregate, OverallStatus, ProbeResult, ProbeStatus};
pub use registry::{ComponentStatus, HealthHandle, HealthRegistry, HealthStatus, HealthStrategy};
