//! The service model consumed by the cluster compiler.
//!
//! A [`PushContext`] snapshots services, their instances, destination rules
//! and sidecar configuration once per push cycle. Proxies derive their
//! [`SidecarScope`] and IP families from it before any cluster is built.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod destination_rule;
pub mod duration;
mod host_match;
pub mod instance;
pub mod labels;
mod mesh;
pub mod proxy;
pub mod push_context;
pub mod service;
mod sidecar;

pub use self::{
    destination_rule::{DestinationRule, DestinationRuleConfig, Subset, TrafficPolicy},
    duration::GoDuration,
    host_match::HostMatch,
    instance::{Endpoint, Locality, ServiceInstance, TlsMode},
    labels::Labels,
    mesh::{CircuitBreakerDefaults, MeshDefaults},
    proxy::{IpFamilies, NetworkView, Proxy, ProxyKind, RouterMode},
    push_context::{ConfigStore, PushContext, ServiceDiscovery},
    service::{Port, Protocol, Resolution, Service, ServiceAttributes},
    sidecar::{Sidecar, SidecarScope},
};
