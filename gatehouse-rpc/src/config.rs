use std::net::IpAddr;

use envconfig::Envconfig;

/// Boot-time environment for the RPC binary. The gRPC port comes from the
/// settings document's `rpc` section; the metrics sidecar port is fixed at
/// boot.
#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "0.0.0.0")]
    pub host: IpAddr,

    #[envconfig(default = "gatehouse.json")]
    pub settings_path: String,

    #[envconfig(default = "9091")]
    pub metrics_port: u16,
}
