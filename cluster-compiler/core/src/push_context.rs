use crate::{
    destination_rule::DestinationRuleConfig,
    host_match::HostMatch,
    instance::ServiceInstance,
    labels::Collection,
    mesh::MeshDefaults,
    proxy::Proxy,
    service::Service,
    sidecar::Sidecar,
};
use ahash::AHashMap as HashMap;
use anyhow::{Context, Result};
use std::{collections::BTreeMap, sync::Arc};

/// Models service discovery.
#[async_trait::async_trait]
pub trait ServiceDiscovery {
    async fn services(&self) -> Result<Vec<Service>>;

    async fn instances(&self, service: &Service) -> Result<Vec<ServiceInstance>>;
}

/// Models the store of networking configuration.
#[async_trait::async_trait]
pub trait ConfigStore {
    async fn destination_rules(&self) -> Result<Vec<DestinationRuleConfig>>;

    async fn sidecars(&self) -> Result<Vec<Sidecar>>;
}

/// An immutable snapshot of discovery and configuration state for one push
/// cycle.
///
/// A snapshot is built once and shared, via `Arc`, by every cluster build of
/// the cycle. Nothing mutates it after construction.
#[derive(Debug)]
pub struct PushContext {
    version: String,
    mesh: MeshDefaults,

    /// Sorted by hostname.
    services: Vec<Arc<Service>>,

    /// Instances by service hostname.
    instances: HashMap<String, Vec<ServiceInstance>>,

    /// Destination rules grouped by their host. Within a group, rules are
    /// ordered by namespace and name.
    destination_rules: Vec<(HostMatch, Vec<Arc<DestinationRuleConfig>>)>,

    /// Sidecars by namespace.
    sidecars: HashMap<String, Sidecar>,
}

// === impl PushContext ===

impl PushContext {
    /// Snapshots the state of `discovery` and `store`.
    pub async fn init<D, C>(
        version: impl ToString,
        mesh: MeshDefaults,
        discovery: &D,
        store: &C,
    ) -> Result<Arc<Self>>
    where
        D: ServiceDiscovery + Sync + ?Sized,
        C: ConfigStore + Sync + ?Sized,
    {
        let services = discovery
            .services()
            .await
            .context("failed to list services")?;
        let mut instances = Vec::new();
        for svc in &services {
            let found = discovery
                .instances(svc)
                .await
                .with_context(|| format!("failed to list instances of {}", svc.hostname))?;
            instances.extend(found);
        }
        let destination_rules = store
            .destination_rules()
            .await
            .context("failed to list destination rules")?;
        let sidecars = store.sidecars().await.context("failed to list sidecars")?;

        Ok(Arc::new(Self::new(
            version,
            mesh,
            services,
            instances,
            destination_rules,
            sidecars,
        )))
    }

    pub fn new(
        version: impl ToString,
        mesh: MeshDefaults,
        services: impl IntoIterator<Item = Service>,
        instances: impl IntoIterator<Item = ServiceInstance>,
        destination_rules: impl IntoIterator<Item = DestinationRuleConfig>,
        sidecars: impl IntoIterator<Item = Sidecar>,
    ) -> Self {
        let mut services = services.into_iter().map(Arc::new).collect::<Vec<_>>();
        services.sort_by(|a, b| a.hostname.cmp(&b.hostname));

        let mut by_host = HashMap::<String, Vec<ServiceInstance>>::default();
        for inst in instances {
            by_host.entry(inst.hostname.clone()).or_default().push(inst);
        }

        let mut rules = BTreeMap::<String, Vec<Arc<DestinationRuleConfig>>>::new();
        for dr in destination_rules {
            rules
                .entry(dr.spec.host.to_ascii_lowercase())
                .or_default()
                .push(Arc::new(dr));
        }
        let destination_rules = rules
            .into_iter()
            .map(|(host, mut rules)| {
                rules.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
                let host = match host.parse::<HostMatch>() {
                    Ok(h) => h,
                    Err(never) => match never {},
                };
                (host, rules)
            })
            .collect();

        let sidecars = sidecars
            .into_iter()
            .map(|s| (s.namespace.clone(), s))
            .collect();

        Self {
            version: version.to_string(),
            mesh,
            services,
            instances: by_host,
            destination_rules,
            sidecars,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn mesh(&self) -> &MeshDefaults {
        &self.mesh
    }

    /// All services, ordered by hostname.
    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    pub fn sidecar(&self, namespace: &str) -> Option<&Sidecar> {
        self.sidecars.get(namespace)
    }

    /// Returns the instances of `service` on `port` whose labels are selected
    /// by `labels`.
    pub fn instances_by_port<'a>(
        &'a self,
        service: &Service,
        port: u16,
        labels: &'a Collection,
    ) -> impl Iterator<Item = &'a ServiceInstance> + 'a {
        self.instances
            .get(&service.hostname)
            .into_iter()
            .flatten()
            .filter(move |inst| {
                inst.service_port.port.get() == port && labels.matches(&inst.endpoint.labels)
            })
    }

    /// Returns the instances that run on one of the proxy's addresses, in
    /// service order.
    pub fn proxy_service_instances(&self, proxy: &Proxy) -> Vec<&ServiceInstance> {
        self.services
            .iter()
            .filter_map(|svc| self.instances.get(&svc.hostname))
            .flatten()
            .filter(|inst| proxy.ip_addresses.contains(&inst.endpoint.address))
            .collect()
    }

    /// Returns the destination rule that applies to `service` for `proxy`.
    ///
    /// The proxy's sidecar scope is consulted first.
    pub fn destination_rule<'a>(
        &'a self,
        proxy: &'a Proxy,
        service: &Service,
    ) -> Option<&'a DestinationRuleConfig> {
        if let Some(rule) = proxy
            .sidecar_scope()
            .filter(|scope| scope.version() == self.version)
            .and_then(|scope| scope.destination_rule(&service.hostname))
        {
            return Some(&**rule);
        }
        self.lookup_destination_rule(&proxy.namespace, service)
            .map(|rule| &**rule)
    }

    /// Finds the rule for the most specific host matching the service. Among
    /// rules for that host, prefers the proxy's namespace, then the service's
    /// namespace, then the mesh root namespace.
    pub(crate) fn lookup_destination_rule(
        &self,
        proxy_namespace: &str,
        service: &Service,
    ) -> Option<&Arc<DestinationRuleConfig>> {
        let (_, rules) = self
            .destination_rules
            .iter()
            .filter(|(host, _)| host.matches(&service.hostname))
            .max_by_key(|(host, _)| host.specificity())?;

        let in_namespace = |ns: &str| rules.iter().find(|r| r.namespace == ns);
        let rule = in_namespace(proxy_namespace)
            .or_else(|| in_namespace(service.namespace()))
            .or_else(|| in_namespace(&self.mesh.root_namespace))
            .or_else(|| rules.first());
        if let Some(rule) = rule {
            tracing::trace!(
                host = %service.hostname,
                rule.namespace = %rule.namespace,
                rule.name = %rule.name,
                "Resolved destination rule"
            );
        }
        rule
    }
}

#[cfg(test)]
mod tests;
