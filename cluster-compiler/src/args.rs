use crate::core::{
    destination_rule::TcpKeepalive, CircuitBreakerDefaults, GoDuration, MeshDefaults,
};

/// Mesh-wide defaults, for flattening into a control plane's arguments.
#[derive(Clone, Debug, clap::Args)]
pub struct MeshArgs {
    /// Connect timeout of clusters that don't configure one.
    #[clap(long, default_value = "10s", env = "MESH_CONNECT_TIMEOUT")]
    pub connect_timeout: GoDuration,

    /// How long proxies wait for the first endpoints of a cluster. Zero
    /// disables the timeout.
    #[clap(long, default_value = "0s")]
    pub initial_fetch_timeout: GoDuration,

    #[clap(long, default_value = "5s")]
    pub dns_refresh_rate: GoDuration,

    #[clap(long, default_value_t = u32::MAX)]
    pub max_connections: u32,

    #[clap(long, default_value_t = u32::MAX)]
    pub max_pending_requests: u32,

    #[clap(long, default_value_t = u32::MAX)]
    pub max_requests: u32,

    #[clap(long, default_value_t = u32::MAX)]
    pub max_retries: u32,

    #[clap(long)]
    pub tcp_keepalive_probes: Option<u32>,

    #[clap(long)]
    pub tcp_keepalive_time: Option<GoDuration>,

    #[clap(long)]
    pub tcp_keepalive_interval: Option<GoDuration>,

    /// The namespace whose destination rules apply to the whole mesh.
    #[clap(long, default_value = "istio-system", env = "MESH_ROOT_NAMESPACE")]
    pub root_namespace: String,

    #[clap(long)]
    pub inbound_protocol_sniffing: bool,

    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub outbound_protocol_sniffing: bool,
}

// === impl MeshArgs ===

impl MeshArgs {
    pub fn to_mesh_defaults(&self) -> MeshDefaults {
        let tcp_keepalive = if self.tcp_keepalive_probes.is_some()
            || self.tcp_keepalive_time.is_some()
            || self.tcp_keepalive_interval.is_some()
        {
            Some(TcpKeepalive {
                probes: self.tcp_keepalive_probes,
                time: self.tcp_keepalive_time,
                interval: self.tcp_keepalive_interval,
            })
        } else {
            None
        };

        MeshDefaults {
            connect_timeout: self.connect_timeout.get(),
            initial_fetch_timeout: self.initial_fetch_timeout.get(),
            dns_refresh_rate: self.dns_refresh_rate.get(),
            circuit_breakers: CircuitBreakerDefaults {
                max_connections: self.max_connections,
                max_pending_requests: self.max_pending_requests,
                max_requests: self.max_requests,
                max_retries: self.max_retries,
            },
            tcp_keepalive,
            root_namespace: self.root_namespace.clone(),
            inbound_protocol_sniffing: self.inbound_protocol_sniffing,
            outbound_protocol_sniffing: self.outbound_protocol_sniffing,
        }
    }
}
