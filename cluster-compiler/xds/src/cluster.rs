//! Cluster descriptors handed to the delivery layer.
//!
//! These mirror the subset of the proxy's cluster API the compiler
//! populates. A descriptor is never modified after the builder returns it.

use mesh_cluster_compiler_core::{Locality, TlsMode};
use serde::Serialize;
use std::{net::IpAddr, time::Duration};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    pub discovery_type: DiscoveryType,

    /// Set only on EDS clusters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eds_cluster_config: Option<EdsClusterConfig>,

    /// Inline endpoints of STATIC and STRICT_DNS clusters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_assignment: Option<ClusterLoadAssignment>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<Duration>,

    pub lb_policy: LbPolicy,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ring_hash_lb_config: Option<RingHashLbConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breakers: Option<CircuitBreakers>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub outlier_detection: Option<OutlierDetection>,

    /// Percentage of healthy hosts below which the proxy ignores health.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthy_panic_threshold: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests_per_connection: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<Duration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_keepalive: Option<TcpKeepalive>,

    pub upstream_protocol: UpstreamProtocol,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsConfig>,

    /// Source address for upstream connections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_bind_address: Option<IpAddr>,

    #[serde(skip_serializing_if = "ClusterMetadata::is_empty")]
    pub metadata: ClusterMetadata,
}

/// How a proxy learns the members of a cluster.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryType {
    #[default]
    Static,
    StrictDns,
    Eds,
    OriginalDst,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LbPolicy {
    #[default]
    RoundRobin,
    LeastRequest,
    Random,
    RingHash,

    /// The connection's original destination selects the host.
    ClusterProvided,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdsClusterConfig {
    pub service_name: String,
    pub eds_config: ConfigSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigSource {
    /// The aggregated discovery stream the proxy already holds.
    Ads { initial_fetch_timeout: Duration },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLoadAssignment {
    pub cluster_name: String,
    pub endpoints: Vec<LocalityLbEndpoints>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalityLbEndpoints {
    pub locality: Locality,
    pub lb_endpoints: Vec<LbEndpoint>,
    pub load_balancing_weight: u32,
    pub priority: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LbEndpoint {
    pub address: String,
    pub port: u16,
    pub load_balancing_weight: u32,
    pub network: String,
    pub tls_mode: TlsMode,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CircuitBreakers {
    pub thresholds: Vec<Thresholds>,
}

/// Limits for the default routing priority.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub max_connections: Option<u32>,
    pub max_pending_requests: Option<u32>,
    pub max_requests: Option<u32>,
    pub max_retries: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierDetection {
    #[serde(rename = "consecutive5xx")]
    pub consecutive_5xx: Option<u32>,
    #[serde(rename = "enforcingConsecutive5xx")]
    pub enforcing_consecutive_5xx: Option<u32>,
    pub consecutive_gateway_failure: Option<u32>,
    pub enforcing_consecutive_gateway_failure: Option<u32>,
    pub interval: Option<Duration>,
    pub base_ejection_time: Option<Duration>,
    pub max_ejection_percent: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RingHashLbConfig {
    pub minimum_ring_size: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TcpKeepalive {
    pub probes: Option<u32>,
    pub time: Option<Duration>,
    pub interval: Option<Duration>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpstreamProtocol {
    #[default]
    Http1,
    Http2,

    /// Upstream connections use whatever protocol the downstream used.
    UseDownstream,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsConfig {
    pub lookup_family: DnsLookupFamily,
    pub refresh_rate: Duration,
    pub respect_dns_ttl: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DnsLookupFamily {
    V4Only,
}

/// Describes where a cluster's configuration came from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetadata {
    /// The destination rule that shaped the cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub mesh_external: bool,
}

// === impl Cluster ===

impl Cluster {
    pub fn new(name: impl ToString, discovery_type: DiscoveryType) -> Self {
        Self {
            name: name.to_string(),
            discovery_type,
            ..Default::default()
        }
    }

    /// The service name the cluster's EDS config points at, if any.
    pub fn eds_service_name(&self) -> Option<&str> {
        self.eds_cluster_config
            .as_ref()
            .map(|eds| eds.service_name.as_str())
    }
}

// === impl DiscoveryType ===

impl DiscoveryType {
    /// Returns true for discovery types that carry their endpoints inline.
    pub fn uses_load_assignment(self) -> bool {
        matches!(self, Self::Static | Self::StrictDns)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "STATIC",
            Self::StrictDns => "STRICT_DNS",
            Self::Eds => "EDS",
            Self::OriginalDst => "ORIGINAL_DST",
        }
    }
}

// === impl ClusterMetadata ===

impl ClusterMetadata {
    pub fn is_empty(&self) -> bool {
        self.config.is_none() && self.subset.is_none() && !self.mesh_external
    }
}
