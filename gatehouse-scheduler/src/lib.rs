pub mod config;
pub mod http;
pub mod jobs;
pub mod metrics_constants;
