//! Clusters that forward connections to their original destination.

use crate::{
    cluster::{Cluster, DiscoveryType, LbPolicy},
    naming::{
        BLACK_HOLE_CLUSTER, INBOUND_PASSTHROUGH_CLUSTER_IPV4, INBOUND_PASSTHROUGH_CLUSTER_IPV6,
        PASSTHROUGH_CLUSTER,
    },
    policy, Error,
};
use mesh_cluster_compiler_core::{MeshDefaults, Proxy};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Source address of inbound passthrough connections over IPv4.
pub const INBOUND_PASSTHROUGH_BIND_IPV4: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 6));

/// Source address of inbound passthrough connections over IPv6.
pub const INBOUND_PASSTHROUGH_BIND_IPV6: IpAddr =
    IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 6));

/// Builds one inbound passthrough cluster per IP family the proxy's
/// addresses cover, IPv4 first.
///
/// The proxy's IP families must have been discovered. Otherwise an error is
/// returned and nothing is built.
pub fn build_inbound_passthrough_clusters(
    proxy: &Proxy,
    mesh: &MeshDefaults,
) -> Result<Vec<Cluster>, Error> {
    let families = proxy
        .ip_families()
        .ok_or_else(|| Error::IpFamiliesNotDiscovered(proxy.id.clone()))?;

    let mut clusters = Vec::with_capacity(2);
    if families.supports_ipv4() {
        clusters.push(inbound_passthrough(
            INBOUND_PASSTHROUGH_CLUSTER_IPV4,
            INBOUND_PASSTHROUGH_BIND_IPV4,
            mesh,
        ));
    }
    if families.supports_ipv6() {
        clusters.push(inbound_passthrough(
            INBOUND_PASSTHROUGH_CLUSTER_IPV6,
            INBOUND_PASSTHROUGH_BIND_IPV6,
            mesh,
        ));
    }
    tracing::debug!(proxy = %proxy.id, clusters = clusters.len(), "Built inbound passthrough clusters");
    Ok(clusters)
}

/// Forwards outbound traffic for destinations the mesh doesn't know about.
pub fn build_outbound_passthrough_cluster(mesh: &MeshDefaults) -> Cluster {
    original_dst(PASSTHROUGH_CLUSTER, mesh)
}

/// A cluster without endpoints. Traffic routed to it is dropped.
pub fn build_black_hole_cluster(mesh: &MeshDefaults) -> Cluster {
    Cluster {
        connect_timeout: Some(mesh.connect_timeout),
        ..Cluster::new(BLACK_HOLE_CLUSTER, DiscoveryType::Static)
    }
}

fn inbound_passthrough(name: &str, bind: IpAddr, mesh: &MeshDefaults) -> Cluster {
    Cluster {
        upstream_bind_address: Some(bind),
        ..original_dst(name, mesh)
    }
}

fn original_dst(name: &str, mesh: &MeshDefaults) -> Cluster {
    Cluster {
        connect_timeout: Some(mesh.connect_timeout),
        lb_policy: LbPolicy::ClusterProvided,
        circuit_breakers: Some(policy::default_circuit_breakers(&mesh.circuit_breakers)),
        ..Cluster::new(name, DiscoveryType::OriginalDst)
    }
}
