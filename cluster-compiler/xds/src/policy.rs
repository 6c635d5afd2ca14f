//! Translates resolved traffic policies onto cluster descriptors.

use crate::{
    cluster::{
        CircuitBreakers, Cluster, DiscoveryType, LbPolicy, OutlierDetection, RingHashLbConfig,
        TcpKeepalive, Thresholds, UpstreamProtocol,
    },
    naming::TrafficDirection,
};
use mesh_cluster_compiler_core::{
    destination_rule::{self as dr, ConnectionPoolSettings, LoadBalancerSettings, Merge, SimpleLb},
    CircuitBreakerDefaults, MeshDefaults, Port, Proxy, TrafficPolicy,
};

/// Applies a port-resolved policy to `cluster`.
///
/// Settings the policy leaves unset keep the values the default cluster
/// factory gave them.
pub fn apply_traffic_policy(cluster: &mut Cluster, policy: &TrafficPolicy, mesh: &MeshDefaults) {
    if let Some(pool) = &policy.connection_pool {
        apply_connection_pool(cluster, pool, mesh);
    }
    if let Some(od) = &policy.outlier_detection {
        apply_outlier_detection(cluster, od);
    }
    apply_load_balancer(cluster, policy.load_balancer.as_ref());
}

/// A threshold entry carrying every mesh-wide circuit-breaker limit.
pub fn default_thresholds(defaults: &CircuitBreakerDefaults) -> Thresholds {
    Thresholds {
        max_connections: Some(defaults.max_connections),
        max_pending_requests: Some(defaults.max_pending_requests),
        max_requests: Some(defaults.max_requests),
        max_retries: Some(defaults.max_retries),
    }
}

pub(crate) fn default_circuit_breakers(defaults: &CircuitBreakerDefaults) -> CircuitBreakers {
    CircuitBreakers {
        thresholds: vec![default_thresholds(defaults)],
    }
}

/// Selects the protocol used for upstream connections on `port`.
pub(crate) fn upstream_protocol(
    proxy: &Proxy,
    mesh: &MeshDefaults,
    port: &Port,
    direction: TrafficDirection,
) -> UpstreamProtocol {
    if port.protocol.is_http2() {
        return UpstreamProtocol::Http2;
    }
    let sniffing = match direction {
        TrafficDirection::Inbound => mesh.inbound_protocol_sniffing,
        TrafficDirection::Outbound => mesh.outbound_protocol_sniffing,
    };
    if port.protocol.is_unsupported() && proxy.is_sidecar() && sniffing {
        return UpstreamProtocol::UseDownstream;
    }
    UpstreamProtocol::Http1
}

pub(crate) fn tcp_keepalive(keepalive: &dr::TcpKeepalive) -> TcpKeepalive {
    TcpKeepalive {
        probes: keepalive.probes,
        time: keepalive.time.map(Into::into),
        interval: keepalive.interval.map(Into::into),
    }
}

fn apply_connection_pool(cluster: &mut Cluster, pool: &ConnectionPoolSettings, mesh: &MeshDefaults) {
    let mut thresholds = default_thresholds(&mesh.circuit_breakers);

    if let Some(http) = &pool.http {
        if let Some(max) = http.http2_max_requests {
            thresholds.max_requests = Some(max);
        }
        if let Some(max) = http.http1_max_pending_requests {
            thresholds.max_pending_requests = Some(max);
        }
        if let Some(max) = http.max_retries {
            thresholds.max_retries = Some(max);
        }
        if let Some(max) = http.max_requests_per_connection {
            cluster.max_requests_per_connection = Some(max);
        }
        if let Some(timeout) = http.idle_timeout {
            cluster.idle_timeout = Some(timeout.into());
        }
    }

    if let Some(tcp) = &pool.tcp {
        if let Some(max) = tcp.max_connections {
            thresholds.max_connections = Some(max);
        }
        if let Some(timeout) = tcp.connect_timeout {
            cluster.connect_timeout = Some(timeout.into());
        }
        if let Some(keepalive) = &tcp.tcp_keepalive {
            let mut merged = mesh.tcp_keepalive.clone().unwrap_or_default();
            merged.merge(keepalive);
            cluster.tcp_keepalive = Some(tcp_keepalive(&merged));
        }
    }

    cluster.circuit_breakers = Some(CircuitBreakers {
        thresholds: vec![thresholds],
    });
}

fn apply_outlier_detection(cluster: &mut Cluster, od: &dr::OutlierDetection) {
    let enforcing = |n: u32| if n > 0 { 100 } else { 0 };
    let mut out = OutlierDetection::default();
    if let Some(n) = od.consecutive_5xx_errors {
        out.consecutive_5xx = Some(n);
        out.enforcing_consecutive_5xx = Some(enforcing(n));
    }
    if let Some(n) = od.consecutive_gateway_errors {
        out.consecutive_gateway_failure = Some(n);
        out.enforcing_consecutive_gateway_failure = Some(enforcing(n));
    }
    out.interval = od.interval.map(Into::into);
    out.base_ejection_time = od.base_ejection_time.map(Into::into);
    out.max_ejection_percent = od.max_ejection_percent;
    cluster.outlier_detection = Some(out);

    if let Some(pct) = od.min_health_percent {
        cluster.healthy_panic_threshold = Some(f64::from(pct));
    }
}

fn apply_load_balancer(cluster: &mut Cluster, lb: Option<&LoadBalancerSettings>) {
    match lb {
        None | Some(LoadBalancerSettings::Simple(SimpleLb::RoundRobin)) => {
            cluster.lb_policy = LbPolicy::RoundRobin;
        }
        Some(LoadBalancerSettings::Simple(SimpleLb::LeastConn)) => {
            cluster.lb_policy = LbPolicy::LeastRequest;
        }
        Some(LoadBalancerSettings::Simple(SimpleLb::Random)) => {
            cluster.lb_policy = LbPolicy::Random;
        }
        Some(LoadBalancerSettings::Simple(SimpleLb::Passthrough)) => {
            cluster.discovery_type = DiscoveryType::OriginalDst;
            cluster.eds_cluster_config = None;
            cluster.load_assignment = None;
            cluster.dns = None;
        }
        Some(LoadBalancerSettings::ConsistentHash(hash)) => {
            cluster.lb_policy = LbPolicy::RingHash;
            cluster.ring_hash_lb_config = Some(RingHashLbConfig {
                minimum_ring_size: hash.minimum_ring_size,
            });
        }
    }

    // The original destination cluster ignores any configured balancer.
    if cluster.discovery_type == DiscoveryType::OriginalDst {
        cluster.lb_policy = LbPolicy::ClusterProvided;
        cluster.ring_hash_lb_config = None;
    }
}
