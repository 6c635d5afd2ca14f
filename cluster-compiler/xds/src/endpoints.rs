use crate::cluster::{LbEndpoint, LocalityLbEndpoints};
use mesh_cluster_compiler_core::{
    labels::Collection, Locality, NetworkView, PushContext, Service,
};
use std::collections::BTreeMap;

/// Groups the endpoints of `service` on `port` by locality.
///
/// Only endpoints selected by `labels` and reachable on one of the networks
/// in `view` are included. Localities are ordered; endpoints keep discovery
/// order within their locality.
pub fn build_locality_lb_endpoints(
    push: &PushContext,
    service: &Service,
    port: u16,
    labels: &Collection,
    view: &NetworkView,
) -> Vec<LocalityLbEndpoints> {
    let mut by_locality = BTreeMap::<Locality, Vec<LbEndpoint>>::new();
    for inst in push.instances_by_port(service, port, labels) {
        let ep = &inst.endpoint;
        if !view.contains(&ep.network) {
            tracing::trace!(
                host = %service.hostname,
                address = %ep.address,
                network = %ep.network,
                "Skipping endpoint outside of the network view"
            );
            continue;
        }
        by_locality
            .entry(ep.locality.clone())
            .or_default()
            .push(LbEndpoint {
                address: ep.address.clone(),
                port: ep.port,
                load_balancing_weight: ep.effective_weight(),
                network: ep.network.clone(),
                tls_mode: ep.tls_mode,
            });
    }

    by_locality
        .into_iter()
        .map(|(locality, lb_endpoints)| LocalityLbEndpoints {
            load_balancing_weight: lb_endpoints
                .iter()
                .map(|ep| ep.load_balancing_weight)
                .fold(0u32, u32::saturating_add),
            locality,
            lb_endpoints,
            priority: 0,
        })
        .collect()
}
