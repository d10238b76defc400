//! Boot-time environment for the scheduler binary. Job schedules and the
//! probe port live in the settings document; only the pieces needed to find
//! and serve that document come from the environment.

use std::net::IpAddr;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "0.0.0.0")]
    pub host: IpAddr,

    #[envconfig(default = "gatehouse.json")]
    pub settings_path: String,

    // Used for integration tests
    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}
