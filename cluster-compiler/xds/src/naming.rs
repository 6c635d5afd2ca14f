//! Cluster identifiers.
//!
//! Proxies route by cluster name, so names are built the same way everywhere:
//!
//! - default: `outbound|8080|v1|reviews.default.svc.cluster.local`
//! - SNI-DNAT: `outbound_.8080_.v1_.reviews.default.svc.cluster.local`
//!
//! Delimiters are not escaped. Hostnames and subset names must not contain
//! them.

use std::{fmt, str::FromStr};

pub const INBOUND_PASSTHROUGH_CLUSTER_IPV4: &str = "InboundPassthroughClusterIpv4";
pub const INBOUND_PASSTHROUGH_CLUSTER_IPV6: &str = "InboundPassthroughClusterIpv6";
pub const PASSTHROUGH_CLUSTER: &str = "PassthroughCluster";
pub const BLACK_HOLE_CLUSTER: &str = "BlackHoleCluster";

const DEFAULT_DELIMITER: &str = "|";
const SNI_DNAT_DELIMITER: &str = "_.";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TrafficDirection {
    Inbound,
    Outbound,
}

/// Selects the naming scheme for a build.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClusterMode {
    #[default]
    Default,
    SniDnat,
}

/// The parts of a cluster name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterKey {
    pub direction: TrafficDirection,
    pub port: u16,
    pub subset: String,
    pub hostname: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid traffic direction: {0}")]
pub struct InvalidDirection(String);

/// Builds a default-mode cluster name.
pub fn cluster_name(direction: TrafficDirection, port: u16, subset: &str, hostname: &str) -> String {
    ClusterMode::Default.cluster_name(direction, port, subset, hostname)
}

/// Builds an SNI-DNAT cluster name.
pub fn sni_dnat_cluster_name(
    direction: TrafficDirection,
    port: u16,
    subset: &str,
    hostname: &str,
) -> String {
    ClusterMode::SniDnat.cluster_name(direction, port, subset, hostname)
}

/// Splits a cluster name built in either mode into its parts.
///
/// Returns `None` for names that don't follow the convention, like the
/// passthrough clusters.
pub fn parse_subset_key(name: &str) -> Option<ClusterKey> {
    let delimiter = if name.contains(DEFAULT_DELIMITER) {
        DEFAULT_DELIMITER
    } else {
        SNI_DNAT_DELIMITER
    };
    let mut parts = name.splitn(4, delimiter);
    let direction = parts.next()?.parse().ok()?;
    let port = parts.next()?.parse().ok()?;
    let subset = parts.next()?.to_string();
    let hostname = parts.next()?.to_string();
    Some(ClusterKey {
        direction,
        port,
        subset,
        hostname,
    })
}

// === impl ClusterMode ===

impl ClusterMode {
    pub fn cluster_name(
        self,
        direction: TrafficDirection,
        port: u16,
        subset: &str,
        hostname: &str,
    ) -> String {
        let d = self.delimiter();
        format!("{direction}{d}{port}{d}{subset}{d}{hostname}")
    }

    fn delimiter(self) -> &'static str {
        match self {
            Self::Default => DEFAULT_DELIMITER,
            Self::SniDnat => SNI_DNAT_DELIMITER,
        }
    }
}

// === impl TrafficDirection ===

impl fmt::Display for TrafficDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

impl FromStr for TrafficDirection {
    type Err = InvalidDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            s => Err(InvalidDirection(s.to_string())),
        }
    }
}
