use crate::{
    destination_rule::DestinationRuleConfig, host_match::HostMatch, proxy::Proxy,
    push_context::PushContext, service::Service,
};
use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, str::FromStr, sync::Arc};

/// Limits the services visible to the proxies of one namespace.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sidecar {
    pub name: String,
    pub namespace: String,

    /// Hosts in `namespace/dnsName` form. The namespace may be `*` (any) or
    /// `.` (the sidecar's own); the name may be `*`, a `*.`-prefixed suffix
    /// or an exact hostname.
    #[serde(default)]
    pub egress_hosts: Vec<String>,
}

/// A proxy's precomputed view of a push context: the services it may reach
/// and the destination rule that applies to each of them.
#[derive(Debug, Default)]
pub struct SidecarScope {
    namespace: String,

    /// The version of the push context the scope was computed from.
    version: String,
    services: Vec<Arc<Service>>,
    destination_rules: HashMap<String, Arc<DestinationRuleConfig>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct EgressHost {
    namespace: NamespaceMatch,
    host: HostMatch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum NamespaceMatch {
    Any,
    Local,
    Named(String),
}

// === impl SidecarScope ===

impl SidecarScope {
    pub(crate) fn for_proxy(proxy: &Proxy, push: &PushContext) -> Self {
        let egress = push.sidecar(&proxy.namespace).map(|sidecar| {
            sidecar
                .egress_hosts
                .iter()
                .map(|h| match h.parse::<EgressHost>() {
                    Ok(h) => h,
                    Err(never) => match never {},
                })
                .collect::<Vec<_>>()
        });

        let services = push
            .services()
            .iter()
            .filter(|svc| match egress.as_ref() {
                None => true,
                Some(hosts) => hosts.iter().any(|h| h.selects(&proxy.namespace, svc)),
            })
            .cloned()
            .collect::<Vec<_>>();

        let destination_rules = services
            .iter()
            .filter_map(|svc| {
                let rule = push.lookup_destination_rule(&proxy.namespace, svc)?;
                Some((svc.hostname.clone(), rule.clone()))
            })
            .collect::<HashMap<_, _>>();

        tracing::debug!(
            proxy = %proxy.id,
            namespace = %proxy.namespace,
            services = services.len(),
            destination_rules = destination_rules.len(),
            "Computed sidecar scope"
        );

        Self {
            namespace: proxy.namespace.clone(),
            version: push.version().to_string(),
            services,
            destination_rules,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Services visible to the proxy, ordered by hostname.
    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    pub fn destination_rule(&self, hostname: &str) -> Option<&Arc<DestinationRuleConfig>> {
        self.destination_rules.get(hostname)
    }
}

// === impl EgressHost ===

impl EgressHost {
    fn selects(&self, proxy_namespace: &str, svc: &Service) -> bool {
        let ns_matches = match &self.namespace {
            NamespaceMatch::Any => true,
            NamespaceMatch::Local => svc.namespace() == proxy_namespace,
            NamespaceMatch::Named(ns) => svc.namespace() == ns,
        };
        ns_matches && self.host.matches(&svc.hostname)
    }
}

impl FromStr for EgressHost {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ns, host) = s.split_once('/').unwrap_or(("*", s));
        let namespace = match ns {
            "*" => NamespaceMatch::Any,
            "." => NamespaceMatch::Local,
            ns => NamespaceMatch::Named(ns.to_string()),
        };
        let host = host.parse()?;
        Ok(Self { namespace, host })
    }
}
