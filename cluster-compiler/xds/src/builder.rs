use crate::{
    cluster::{
        Cluster, ClusterLoadAssignment, DiscoveryType, DnsConfig, DnsLookupFamily, LbEndpoint,
        LbPolicy, LocalityLbEndpoints,
    },
    eds::maybe_apply_eds_config,
    endpoints::build_locality_lb_endpoints,
    naming::{ClusterMode, TrafficDirection},
    passthrough, policy, Error,
};
use ahash::AHashSet as HashSet;
use mesh_cluster_compiler_core::{
    labels::Collection, IpFamilies, Locality, NetworkView, Port, Protocol, Proxy, PushContext,
    Resolution, RouterMode, Service, SidecarScope, TlsMode, TrafficPolicy,
};

/// Builds the clusters of one proxy from one push context.
///
/// The proxy must have discovered its IP families and had its sidecar scope
/// set. The builder holds both the proxy and the push context immutably.
#[derive(Copy, Clone, Debug)]
pub struct ClusterBuilder<'a> {
    proxy: &'a Proxy,
    push: &'a PushContext,
}

// === impl ClusterBuilder ===

impl<'a> ClusterBuilder<'a> {
    pub fn new(proxy: &'a Proxy, push: &'a PushContext) -> Self {
        Self { proxy, push }
    }

    /// Builds every cluster the proxy needs.
    ///
    /// Sidecars get outbound and inbound clusters. Routers get outbound
    /// clusters and, in SNI-DNAT mode, a second set named for SNI routing.
    pub fn build_clusters(&self) -> Result<Vec<Cluster>, Error> {
        let mesh = self.push.mesh();
        let mut clusters = self.build_outbound_clusters(ClusterMode::Default)?;
        if self.proxy.is_sidecar() {
            clusters.extend(self.build_inbound_clusters()?);
            clusters.push(passthrough::build_black_hole_cluster(mesh));
            clusters.push(passthrough::build_outbound_passthrough_cluster(mesh));
        } else {
            if self.proxy.router_mode == RouterMode::SniDnat {
                clusters.extend(self.build_outbound_clusters(ClusterMode::SniDnat)?);
            }
            clusters.push(passthrough::build_black_hole_cluster(mesh));
        }
        tracing::debug!(
            proxy = %self.proxy.id,
            version = %self.push.version(),
            clusters = clusters.len(),
            "Built clusters"
        );
        Ok(clusters)
    }

    /// Builds a cluster, followed by its subset clusters, for each port of
    /// each service visible to the proxy.
    ///
    /// SNI-DNAT clusters are only built for mesh-internal services.
    pub fn build_outbound_clusters(&self, mode: ClusterMode) -> Result<Vec<Cluster>, Error> {
        let scope = self.sidecar_scope()?;
        let view = self.proxy.network_view();
        let mut clusters = Vec::new();

        for service in scope.services() {
            if mode == ClusterMode::SniDnat && service.mesh_external {
                continue;
            }
            for port in &service.ports {
                if port.protocol == Protocol::Udp {
                    continue;
                }
                let discovery_type = discovery_type(service.resolution);
                let name = mode.cluster_name(
                    TrafficDirection::Outbound,
                    port.port.get(),
                    "",
                    &service.hostname,
                );
                let endpoints = if discovery_type.uses_load_assignment() {
                    build_locality_lb_endpoints(
                        self.push,
                        service,
                        port.port.get(),
                        &Collection::default(),
                        &view,
                    )
                } else {
                    Vec::new()
                };
                let Some(mut cluster) = self.build_default_cluster(
                    &name,
                    discovery_type,
                    endpoints,
                    TrafficDirection::Outbound,
                    port,
                    service.mesh_external,
                ) else {
                    continue;
                };
                let subsets = self.apply_destination_rule(&mut cluster, mode, service, port, &view);
                clusters.push(cluster);
                clusters.extend(subsets);
            }
        }

        Ok(clusters)
    }

    /// Builds a static cluster targeting the local workload for each port
    /// the proxy's service instances listen on, followed by the inbound
    /// passthrough clusters.
    pub fn build_inbound_clusters(&self) -> Result<Vec<Cluster>, Error> {
        let families = self.ip_families()?;
        let localhost = if families.ipv6_only() { "::1" } else { "127.0.0.1" };

        let mut seen = HashSet::new();
        let mut clusters = Vec::new();
        for inst in self.push.proxy_service_instances(self.proxy) {
            let port = inst.endpoint.port;
            if !seen.insert(port) {
                continue;
            }
            let name = ClusterMode::Default.cluster_name(
                TrafficDirection::Inbound,
                port,
                &inst.service_port.name,
                &inst.hostname,
            );
            let endpoints = vec![LocalityLbEndpoints {
                locality: Locality::default(),
                lb_endpoints: vec![LbEndpoint {
                    address: localhost.to_string(),
                    port,
                    load_balancing_weight: 1,
                    network: self.proxy.network.clone(),
                    tls_mode: TlsMode::Disabled,
                }],
                load_balancing_weight: 1,
                priority: 0,
            }];
            if let Some(cluster) = self.build_default_cluster(
                &name,
                DiscoveryType::Static,
                endpoints,
                TrafficDirection::Inbound,
                &inst.service_port,
                false,
            ) {
                clusters.push(cluster);
            }
        }

        clusters.extend(self.build_inbound_passthrough_clusters()?);
        Ok(clusters)
    }

    /// Builds a cluster with the mesh's default connect timeout and
    /// circuit-breaker thresholds.
    ///
    /// Returns `None` for static and DNS clusters without endpoints: there is
    /// nothing to emit for them.
    pub fn build_default_cluster(
        &self,
        name: &str,
        discovery_type: DiscoveryType,
        endpoints: Vec<LocalityLbEndpoints>,
        direction: TrafficDirection,
        port: &Port,
        is_external: bool,
    ) -> Option<Cluster> {
        let mesh = self.push.mesh();
        let mut cluster = Cluster::new(name, discovery_type);

        match discovery_type {
            DiscoveryType::StrictDns => {
                cluster.dns = Some(DnsConfig {
                    lookup_family: DnsLookupFamily::V4Only,
                    refresh_rate: mesh.dns_refresh_rate,
                    respect_dns_ttl: true,
                });
            }
            DiscoveryType::OriginalDst => {
                cluster.lb_policy = LbPolicy::ClusterProvided;
            }
            DiscoveryType::Static | DiscoveryType::Eds => {}
        }

        if discovery_type.uses_load_assignment() {
            if endpoints.is_empty() {
                tracing::debug!(cluster = %name, ?discovery_type, "Skipping cluster without endpoints");
                return None;
            }
            cluster.load_assignment = Some(ClusterLoadAssignment {
                cluster_name: name.to_string(),
                endpoints,
            });
        }

        cluster.connect_timeout = Some(mesh.connect_timeout);
        cluster.circuit_breakers = Some(policy::default_circuit_breakers(&mesh.circuit_breakers));
        cluster.tcp_keepalive = mesh.tcp_keepalive.as_ref().map(policy::tcp_keepalive);
        cluster.upstream_protocol = policy::upstream_protocol(self.proxy, mesh, port, direction);
        cluster.metadata.mesh_external = is_external;
        Some(cluster)
    }

    /// Applies the service's destination rule to `cluster` and builds a
    /// cluster for each of the rule's subsets, in rule order.
    ///
    /// Without a rule, `cluster` keeps its defaults and no subset clusters
    /// are built. EDS config is applied to `cluster` either way.
    pub fn apply_destination_rule(
        &self,
        cluster: &mut Cluster,
        mode: ClusterMode,
        service: &Service,
        port: &Port,
        view: &NetworkView,
    ) -> Vec<Cluster> {
        let mesh = self.push.mesh();
        let port_number = port.port.get();

        let Some(config) = self.push.destination_rule(self.proxy, service) else {
            policy::apply_traffic_policy(cluster, &TrafficPolicy::default(), mesh);
            maybe_apply_eds_config(cluster, mesh.initial_fetch_timeout);
            return Vec::new();
        };
        let rule = &config.spec;
        let config_path = config.config_path();

        let base = TrafficPolicy::layered(rule.traffic_policy.as_ref(), None, port_number);
        policy::apply_traffic_policy(cluster, &base, mesh);
        maybe_apply_eds_config(cluster, mesh.initial_fetch_timeout);
        cluster.metadata.config = Some(config_path.clone());

        let mut subsets = Vec::with_capacity(rule.subsets.len());
        for subset in &rule.subsets {
            let name = mode.cluster_name(
                TrafficDirection::Outbound,
                port_number,
                &subset.name,
                &service.hostname,
            );

            // Subsets of EDS clusters are filtered by the proxy as endpoints
            // arrive; static and DNS subsets carry their endpoints inline. A
            // subset without labels selects every endpoint in `view`.
            let endpoints = if !cluster.discovery_type.uses_load_assignment() {
                Vec::new()
            } else {
                build_locality_lb_endpoints(
                    self.push,
                    service,
                    port_number,
                    &Collection::from(subset.labels.clone()),
                    view,
                )
            };

            let Some(mut subset_cluster) = self.build_default_cluster(
                &name,
                cluster.discovery_type,
                endpoints,
                TrafficDirection::Outbound,
                port,
                service.mesh_external,
            ) else {
                continue;
            };

            let layered = TrafficPolicy::layered(
                rule.traffic_policy.as_ref(),
                subset.traffic_policy.as_ref(),
                port_number,
            );
            policy::apply_traffic_policy(&mut subset_cluster, &layered, mesh);
            maybe_apply_eds_config(&mut subset_cluster, mesh.initial_fetch_timeout);
            subset_cluster.metadata.config = Some(config_path.clone());
            subset_cluster.metadata.subset = Some(subset.name.clone());

            tracing::trace!(
                cluster = %subset_cluster.name,
                rule.namespace = %config.namespace,
                rule.name = %config.name,
                "Built subset cluster"
            );
            subsets.push(subset_cluster);
        }

        subsets
    }

    pub fn build_inbound_passthrough_clusters(&self) -> Result<Vec<Cluster>, Error> {
        passthrough::build_inbound_passthrough_clusters(self.proxy, self.push.mesh())
    }

    fn sidecar_scope(&self) -> Result<&'a SidecarScope, Error> {
        let scope = self
            .proxy
            .sidecar_scope()
            .ok_or_else(|| Error::SidecarScopeNotSet(self.proxy.id.clone()))?;
        if scope.version() != self.push.version() {
            return Err(Error::StaleSidecarScope {
                proxy: self.proxy.id.clone(),
                scope: scope.version().to_string(),
                push: self.push.version().to_string(),
            });
        }
        Ok(scope)
    }

    fn ip_families(&self) -> Result<IpFamilies, Error> {
        self.proxy
            .ip_families()
            .ok_or_else(|| Error::IpFamiliesNotDiscovered(self.proxy.id.clone()))
    }
}

/// Maps a service's resolution to the discovery type of its clusters.
pub fn discovery_type(resolution: Resolution) -> DiscoveryType {
    match resolution {
        Resolution::ClientSideLb => DiscoveryType::Eds,
        Resolution::Dns => DiscoveryType::StrictDns,
        Resolution::Passthrough | Resolution::None => DiscoveryType::OriginalDst,
    }
}
