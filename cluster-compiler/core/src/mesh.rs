use crate::destination_rule::TcpKeepalive;
use std::time::Duration;

/// Mesh-wide defaults injected into the compiler. Read-only for the duration
/// of a push cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshDefaults {
    /// Connect timeout applied to every cluster unless a policy overrides it.
    pub connect_timeout: Duration,

    /// How long a proxy waits for the first discovery response of a cluster.
    /// Zero disables the timeout.
    pub initial_fetch_timeout: Duration,

    /// Refresh rate for DNS-resolved clusters.
    pub dns_refresh_rate: Duration,

    /// Circuit-breaker limits applied when no policy configures them.
    pub circuit_breakers: CircuitBreakerDefaults,

    /// Keepalive applied to upstream connections, overridden field by field
    /// by a policy's TCP keepalive.
    pub tcp_keepalive: Option<TcpKeepalive>,

    /// The namespace whose destination rules apply mesh-wide.
    pub root_namespace: String,

    pub inbound_protocol_sniffing: bool,
    pub outbound_protocol_sniffing: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CircuitBreakerDefaults {
    pub max_connections: u32,
    pub max_pending_requests: u32,
    pub max_requests: u32,
    pub max_retries: u32,
}

impl Default for MeshDefaults {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            initial_fetch_timeout: Duration::ZERO,
            dns_refresh_rate: Duration::from_secs(5),
            circuit_breakers: CircuitBreakerDefaults::default(),
            tcp_keepalive: None,
            root_namespace: "istio-system".to_string(),
            inbound_protocol_sniffing: false,
            outbound_protocol_sniffing: true,
        }
    }
}

impl Default for CircuitBreakerDefaults {
    fn default() -> Self {
        Self {
            max_connections: u32::MAX,
            max_pending_requests: u32::MAX,
            max_requests: u32::MAX,
            max_retries: u32::MAX,
        }
    }
}
