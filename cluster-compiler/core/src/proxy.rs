use crate::{push_context::PushContext, sidecar::SidecarScope};
use ahash::AHashSet as HashSet;
use std::{net::IpAddr, sync::Arc};

/// The network of endpoints that don't declare one.
pub const UNNAMED_NETWORK: &str = "";

/// A proxy that clusters are built for.
///
/// The IP families and sidecar scope are derived from the proxy and the
/// current push context. Both must be set before any cluster is built; the
/// cluster builder only ever borrows the proxy immutably.
#[derive(Clone, Debug)]
pub struct Proxy {
    pub id: String,
    pub kind: ProxyKind,
    pub router_mode: RouterMode,
    pub namespace: String,

    /// Addresses the proxy's workload is bound to.
    pub ip_addresses: Vec<String>,

    /// The network the proxy runs in.
    pub network: String,

    /// Networks whose endpoints the proxy asked to see.
    pub requested_network_view: Vec<String>,

    ip_families: Option<IpFamilies>,
    sidecar_scope: Option<Arc<SidecarScope>>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    #[default]
    Sidecar,
    Router,
}

/// Selects which outbound clusters a router proxy needs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RouterMode {
    #[default]
    Standard,

    /// The router forwards mesh-internal traffic by SNI and needs clusters
    /// named with the SNI-DNAT scheme.
    SniDnat,
}

/// The IP families a proxy's addresses cover.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IpFamilies {
    ipv4: bool,
    ipv6: bool,
}

/// The set of networks whose endpoints a proxy may receive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkView(HashSet<String>);

// === impl Proxy ===

impl Proxy {
    pub fn new(kind: ProxyKind, id: impl ToString, namespace: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            kind,
            router_mode: RouterMode::default(),
            namespace: namespace.to_string(),
            ip_addresses: Vec::new(),
            network: UNNAMED_NETWORK.to_string(),
            requested_network_view: Vec::new(),
            ip_families: None,
            sidecar_scope: None,
        }
    }

    pub fn sidecar(id: impl ToString, namespace: impl ToString) -> Self {
        Self::new(ProxyKind::Sidecar, id, namespace)
    }

    pub fn router(id: impl ToString, namespace: impl ToString) -> Self {
        Self::new(ProxyKind::Router, id, namespace)
    }

    /// Determines the IP families the proxy's addresses cover. Addresses that
    /// aren't IP addresses are ignored.
    pub fn discover_ip_families(&mut self) {
        let mut families = IpFamilies::default();
        for addr in &self.ip_addresses {
            match addr.parse::<IpAddr>() {
                Ok(IpAddr::V4(_)) => families.ipv4 = true,
                Ok(IpAddr::V6(_)) => families.ipv6 = true,
                Err(error) => {
                    tracing::warn!(proxy = %self.id, %addr, %error, "Ignoring invalid proxy address");
                }
            }
        }
        tracing::debug!(proxy = %self.id, ?families, "Discovered IP families");
        self.ip_families = Some(families);
    }

    /// Returns the discovered IP families, or `None` if
    /// [`Proxy::discover_ip_families`] has not been called.
    pub fn ip_families(&self) -> Option<IpFamilies> {
        self.ip_families
    }

    /// Computes the proxy's view of `push`.
    pub fn set_sidecar_scope(&mut self, push: &PushContext) {
        let scope = SidecarScope::for_proxy(self, push);
        self.sidecar_scope = Some(Arc::new(scope));
    }

    pub fn sidecar_scope(&self) -> Option<&SidecarScope> {
        self.sidecar_scope.as_deref()
    }

    /// The requested network view or, if the proxy requested none, the
    /// unnamed network.
    pub fn network_view(&self) -> NetworkView {
        if self.requested_network_view.is_empty() {
            return NetworkView::from_iter([UNNAMED_NETWORK]);
        }
        self.requested_network_view.iter().cloned().collect()
    }

    pub fn is_sidecar(&self) -> bool {
        self.kind == ProxyKind::Sidecar
    }
}

// === impl IpFamilies ===

impl IpFamilies {
    pub fn supports_ipv4(&self) -> bool {
        self.ipv4
    }

    pub fn supports_ipv6(&self) -> bool {
        self.ipv6
    }

    pub fn ipv6_only(&self) -> bool {
        self.ipv6 && !self.ipv4
    }
}

// === impl NetworkView ===

impl NetworkView {
    pub fn contains(&self, network: &str) -> bool {
        self.0.contains(network)
    }
}

impl std::iter::FromIterator<String> for NetworkView {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> std::iter::FromIterator<&'a str> for NetworkView {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        iter.into_iter().map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_ip_families() {
        for (ips, ipv4, ipv6) in [
            (vec!["6.6.6.6", "::1"], true, true),
            (vec!["6.6.6.6"], true, false),
            (vec!["::1"], false, true),
            (vec!["not-an-ip"], false, false),
            (vec![], false, false),
        ] {
            let mut proxy = Proxy::sidecar("p", "ns");
            proxy.ip_addresses = ips.iter().map(|s| s.to_string()).collect();
            assert_eq!(proxy.ip_families(), None);

            proxy.discover_ip_families();
            let families = proxy.ip_families().expect("families must be discovered");
            assert_eq!(families.supports_ipv4(), ipv4, "{ips:?}");
            assert_eq!(families.supports_ipv6(), ipv6, "{ips:?}");
        }
    }

    #[test]
    fn network_view_defaults_to_unnamed_network() {
        let mut proxy = Proxy::sidecar("p", "ns");
        let view = proxy.network_view();
        assert!(view.contains(UNNAMED_NETWORK));
        assert!(!view.contains("network-1"));

        proxy.requested_network_view = vec!["network-1".to_string()];
        let view = proxy.network_view();
        assert!(view.contains("network-1"));
        assert!(!view.contains(UNNAMED_NETWORK));
    }
}
