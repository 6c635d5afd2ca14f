use super::*;
use crate::{
    destination_rule::DestinationRule,
    instance::Endpoint,
    labels::Labels,
    service::{Port, Protocol, Resolution, ServiceAttributes},
};
use maplit::btreemap;

#[derive(Default)]
struct FakeDiscovery {
    services: Vec<Service>,
    instances: Vec<ServiceInstance>,
}

#[derive(Default)]
struct FakeStore {
    destination_rules: Vec<DestinationRuleConfig>,
    sidecars: Vec<Sidecar>,
}

#[async_trait::async_trait]
impl ServiceDiscovery for FakeDiscovery {
    async fn services(&self) -> Result<Vec<Service>> {
        Ok(self.services.clone())
    }

    async fn instances(&self, service: &Service) -> Result<Vec<ServiceInstance>> {
        Ok(self
            .instances
            .iter()
            .filter(|i| i.hostname == service.hostname)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl ConfigStore for FakeStore {
    async fn destination_rules(&self) -> Result<Vec<DestinationRuleConfig>> {
        Ok(self.destination_rules.clone())
    }

    async fn sidecars(&self) -> Result<Vec<Sidecar>> {
        Ok(self.sidecars.clone())
    }
}

struct FailingDiscovery;

#[async_trait::async_trait]
impl ServiceDiscovery for FailingDiscovery {
    async fn services(&self) -> Result<Vec<Service>> {
        anyhow::bail!("registry unavailable")
    }

    async fn instances(&self, _: &Service) -> Result<Vec<ServiceInstance>> {
        Ok(vec![])
    }
}

fn mk_service(hostname: &str, ns: &str) -> Service {
    Service {
        hostname: hostname.to_string(),
        addresses: vec![],
        ports: vec![
            Port::new("http", 8080.try_into().unwrap(), Protocol::Http),
            Port::new("grpc", 9090.try_into().unwrap(), Protocol::Grpc),
        ],
        resolution: Resolution::ClientSideLb,
        mesh_external: false,
        attributes: ServiceAttributes {
            name: hostname.split('.').next().unwrap().to_string(),
            namespace: ns.to_string(),
            labels: Labels::default(),
        },
    }
}

fn mk_instance(svc: &Service, port: usize, addr: &str, labels: Labels) -> ServiceInstance {
    ServiceInstance {
        hostname: svc.hostname.clone(),
        service_port: svc.ports[port].clone(),
        endpoint: Endpoint {
            address: addr.to_string(),
            port: 10000 + svc.ports[port].port.get(),
            labels,
            locality: "region1/zone1/subzone1".parse().unwrap(),
            network: String::new(),
            tls_mode: Default::default(),
            weight: 0,
        },
    }
}

fn mk_rule(ns: &str, name: &str, host: &str) -> DestinationRuleConfig {
    DestinationRuleConfig {
        name: name.to_string(),
        namespace: ns.to_string(),
        spec: DestinationRule {
            host: host.to_string(),
            ..Default::default()
        },
    }
}

fn mk_proxy(ns: &str, ips: &[&str]) -> Proxy {
    let mut proxy = Proxy::sidecar("test-proxy", ns);
    proxy.ip_addresses = ips.iter().map(|s| s.to_string()).collect();
    proxy
}

#[tokio::test]
async fn init_snapshots_collaborators() {
    let foo = mk_service("foo.ns-0.svc.cluster.local", "ns-0");
    let bar = mk_service("bar.ns-0.svc.cluster.local", "ns-0");
    let discovery = FakeDiscovery {
        instances: vec![
            mk_instance(&foo, 0, "10.0.0.1", Labels::default()),
            mk_instance(&bar, 1, "10.0.0.2", Labels::default()),
        ],
        services: vec![foo.clone(), bar.clone()],
    };
    let store = FakeStore {
        destination_rules: vec![mk_rule("ns-0", "foo", &foo.hostname)],
        sidecars: vec![],
    };

    let push = PushContext::init("v1", MeshDefaults::default(), &discovery, &store)
        .await
        .expect("push context must initialize");

    assert_eq!(push.version(), "v1");
    let hosts = push
        .services()
        .iter()
        .map(|s| s.hostname.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        hosts,
        vec!["bar.ns-0.svc.cluster.local", "foo.ns-0.svc.cluster.local"],
        "services must be ordered by hostname"
    );

    let all = Collection::default();
    assert_eq!(push.instances_by_port(&foo, 8080, &all).count(), 1);
    assert_eq!(push.instances_by_port(&foo, 9090, &all).count(), 0);
    assert_eq!(push.instances_by_port(&bar, 9090, &all).count(), 1);

    let proxy = mk_proxy("ns-0", &[]);
    assert!(push.destination_rule(&proxy, &foo).is_some());
    assert!(push.destination_rule(&proxy, &bar).is_none());
}

#[tokio::test]
async fn init_fails_when_discovery_fails() {
    let err = PushContext::init(
        "v1",
        MeshDefaults::default(),
        &FailingDiscovery,
        &FakeStore::default(),
    )
    .await
    .expect_err("discovery failure must propagate");
    assert!(format!("{err:#}").contains("registry unavailable"));
}

#[test]
fn instances_filtered_by_labels() {
    let foo = mk_service("foo.ns-0.svc.cluster.local", "ns-0");
    let v1 = Labels::from(btreemap! { "version".to_string() => "v1".to_string() });
    let v2 = Labels::from(btreemap! { "version".to_string() => "v2".to_string() });
    let push = PushContext::new(
        "v1",
        MeshDefaults::default(),
        vec![foo.clone()],
        vec![
            mk_instance(&foo, 0, "10.0.0.1", v1.clone()),
            mk_instance(&foo, 0, "10.0.0.2", v2.clone()),
            mk_instance(&foo, 0, "10.0.0.3", v2.clone()),
        ],
        vec![],
        vec![],
    );

    let only_v2 = Collection::from(v2);
    let addrs = push
        .instances_by_port(&foo, 8080, &only_v2)
        .map(|i| i.endpoint.address.as_str())
        .collect::<Vec<_>>();
    assert_eq!(addrs, vec!["10.0.0.2", "10.0.0.3"]);

    let both = [v1, Labels::from(btreemap! { "version".to_string() => "v2".to_string() })]
        .into_iter()
        .collect::<Collection>();
    assert_eq!(push.instances_by_port(&foo, 8080, &both).count(), 3);
}

#[test]
fn proxy_service_instances_match_addresses() {
    let foo = mk_service("foo.ns-0.svc.cluster.local", "ns-0");
    let push = PushContext::new(
        "v1",
        MeshDefaults::default(),
        vec![foo.clone()],
        vec![
            mk_instance(&foo, 0, "10.0.0.1", Labels::default()),
            mk_instance(&foo, 1, "10.0.0.1", Labels::default()),
            mk_instance(&foo, 0, "10.0.0.2", Labels::default()),
        ],
        vec![],
        vec![],
    );

    let proxy = mk_proxy("ns-0", &["10.0.0.1"]);
    let ports = push
        .proxy_service_instances(&proxy)
        .into_iter()
        .map(|i| i.service_port.port.get())
        .collect::<Vec<_>>();
    assert_eq!(ports, vec![8080, 9090]);
}

#[test]
fn destination_rule_namespace_precedence() {
    let foo = mk_service("foo.svc-ns.svc.cluster.local", "svc-ns");
    let push = PushContext::new(
        "v1",
        MeshDefaults::default(),
        vec![foo.clone()],
        vec![],
        vec![
            mk_rule("istio-system", "root", &foo.hostname),
            mk_rule("svc-ns", "service", &foo.hostname),
            mk_rule("client-ns", "client", &foo.hostname),
        ],
        vec![],
    );

    let client = mk_proxy("client-ns", &[]);
    assert_eq!(push.destination_rule(&client, &foo).unwrap().name, "client");

    let other = mk_proxy("other-ns", &[]);
    assert_eq!(push.destination_rule(&other, &foo).unwrap().name, "service");

    let push = PushContext::new(
        "v1",
        MeshDefaults::default(),
        vec![foo.clone()],
        vec![],
        vec![
            mk_rule("unrelated", "unrelated", &foo.hostname),
            mk_rule("istio-system", "root", &foo.hostname),
        ],
        vec![],
    );
    assert_eq!(push.destination_rule(&other, &foo).unwrap().name, "root");
}

#[test]
fn destination_rule_prefers_most_specific_host() {
    let foo = mk_service("foo.ns-0.svc.cluster.local", "ns-0");
    let bar = mk_service("bar.ns-0.svc.cluster.local", "ns-0");
    let baz = mk_service("baz.example.com", "ns-0");
    let push = PushContext::new(
        "v1",
        MeshDefaults::default(),
        vec![foo.clone(), bar.clone(), baz.clone()],
        vec![],
        vec![
            mk_rule("ns-0", "wide", "*.cluster.local"),
            mk_rule("ns-0", "narrow", "*.ns-0.svc.cluster.local"),
            mk_rule("ns-0", "exact", &foo.hostname),
        ],
        vec![],
    );

    let proxy = mk_proxy("ns-0", &[]);
    assert_eq!(push.destination_rule(&proxy, &foo).unwrap().name, "exact");
    assert_eq!(push.destination_rule(&proxy, &bar).unwrap().name, "narrow");
    assert!(push.destination_rule(&proxy, &baz).is_none());
}

#[test]
fn sidecar_scope_filters_services() {
    let local = mk_service("local.ns-0.svc.cluster.local", "ns-0");
    let remote = mk_service("remote.ns-1.svc.cluster.local", "ns-1");
    let shared = mk_service("db.shared.svc.cluster.local", "shared");
    let push = PushContext::new(
        "v1",
        MeshDefaults::default(),
        vec![local.clone(), remote.clone(), shared.clone()],
        vec![],
        vec![
            mk_rule("ns-0", "local", &local.hostname),
            mk_rule("ns-1", "remote", &remote.hostname),
        ],
        vec![Sidecar {
            name: "default".to_string(),
            namespace: "ns-0".to_string(),
            egress_hosts: vec!["./*".to_string(), "shared/db.shared.svc.cluster.local".to_string()],
        }],
    );

    let mut scoped = mk_proxy("ns-0", &[]);
    scoped.set_sidecar_scope(&push);
    let scope = scoped.sidecar_scope().expect("scope must be set");
    assert_eq!(scope.namespace(), "ns-0");
    let visible = scope
        .services()
        .iter()
        .map(|s| s.hostname.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        visible,
        vec!["db.shared.svc.cluster.local", "local.ns-0.svc.cluster.local"]
    );
    assert_eq!(
        scope.destination_rule(&local.hostname).unwrap().name,
        "local"
    );
    assert!(scope.destination_rule(&remote.hostname).is_none());

    // Namespaces without a sidecar see every service.
    let mut unscoped = mk_proxy("ns-1", &[]);
    unscoped.set_sidecar_scope(&push);
    assert_eq!(unscoped.sidecar_scope().unwrap().services().len(), 3);
}

#[test]
fn destination_rule_ignores_scopes_from_earlier_pushes() {
    let foo = mk_service("foo.ns-0.svc.cluster.local", "ns-0");
    let push = |version: &str, rule: &str| {
        PushContext::new(
            version,
            MeshDefaults::default(),
            vec![foo.clone()],
            vec![],
            vec![mk_rule("ns-0", rule, &foo.hostname)],
            vec![],
        )
    };
    let v1 = push("v1", "old");
    let v2 = push("v2", "new");

    let mut proxy = mk_proxy("ns-0", &[]);
    proxy.set_sidecar_scope(&v1);
    assert_eq!(proxy.sidecar_scope().unwrap().version(), "v1");
    assert_eq!(v1.destination_rule(&proxy, &foo).unwrap().name, "old");
    assert_eq!(v2.destination_rule(&proxy, &foo).unwrap().name, "new");
}
