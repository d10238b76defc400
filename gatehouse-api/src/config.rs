use std::net::IpAddr;

use envconfig::Envconfig;

/// Boot-time environment for the API binary. Everything reloadable lives in
/// the settings document instead; the listen port comes from its `api`
/// section.
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
